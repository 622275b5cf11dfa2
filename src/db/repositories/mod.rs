//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one aggregate and hides the
//! SQLite/MySQL split behind a trait object.

pub mod attachment;
pub mod chat;
pub mod comment;
pub mod event;
pub mod feature_flag;
pub mod friendship;
pub mod group;
pub mod housing;
pub mod like;
pub mod notification;
pub mod post;
pub mod report;
pub mod session;
pub mod subscription;
pub mod taxonomy;
pub mod user;

pub use attachment::{AttachmentRepository, SqlxAttachmentRepository};
pub use chat::{ChatRepository, SqlxChatRepository};
pub use comment::{CommentRepository, CommentRepositoryImpl};
pub use event::{EventRepository, SqlxEventRepository};
pub use feature_flag::{FeatureFlagRepository, SqlxFeatureFlagRepository};
pub use friendship::{FriendshipRepository, SqlxFriendshipRepository};
pub use group::{GroupRepository, SqlxGroupRepository};
pub use housing::{HousingRepository, SqlxHousingRepository};
pub use like::{LikeRepository, SqlxLikeRepository};
pub use notification::{NotificationRepository, SqlxNotificationRepository};
pub use post::{PostFilter, PostRepository, SqlxPostRepository};
pub use report::{ReportRepository, SqlxReportRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use subscription::{SqlxSubscriptionRepository, SubscriptionRepository};
pub use taxonomy::{
    ActivityRepository, ReportTypeRepository, SqlxActivityRepository, SqlxReportTypeRepository,
};
pub use user::{SqlxUserRepository, UserRepository};
