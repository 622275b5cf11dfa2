//! Services layer - Business logic
//!
//! Each service owns the rules for one area of the platform and talks to
//! the database through repository trait objects. Services return
//! [`ServiceResult`]; the API layer turns [`ServiceError`] into HTTP
//! responses.

pub mod admin;
pub mod chat;
pub mod comment;
pub mod delivery;
pub mod error;
pub mod event;
pub mod feature_flag;
pub mod friend;
pub mod group;
pub mod housing;
pub mod like;
pub mod moderation;
pub mod notification;
pub mod password;
pub mod post;
pub mod rate_limiter;
pub mod search;
pub mod subscription;
pub mod upload;
pub mod user;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{ServiceError, ServiceResult};
pub use password::{hash_password, verify_password};
pub use rate_limiter::LoginRateLimiter;
