//! User model
//!
//! A registered dancer. Email and password hash are private; other members
//! see the [`PublicProfile`] projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    /// Username (unique, 3-30 chars)
    pub username: String,
    /// Email address (unique)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Display name
    pub name: Option<String>,
    pub bio: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    #[sqlx(try_from = "String")]
    pub tango_role: TangoRole,
    pub years_dancing: Option<i64>,
    pub profile_image: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: UserRole,
    #[sqlx(try_from = "String")]
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Build an unsaved user. The password must already be hashed.
    pub fn new(username: String, email: String, password_hash: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username,
            email,
            password_hash,
            name: None,
            bio: None,
            city: None,
            country: None,
            tango_role: TangoRole::None,
            years_dancing: None,
            profile_image: None,
            role,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Admins and moderators
    pub fn is_staff(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Moderator)
    }

    /// Owners may modify their own content, staff may moderate anything.
    pub fn can_moderate(&self, owner_id: i64) -> bool {
        self.id == owner_id || self.is_staff()
    }

    pub fn is_banned(&self) -> bool {
        self.status == UserStatus::Banned
    }

    /// Gravatar URL used when no profile image was uploaded
    pub fn avatar_url(&self) -> String {
        match &self.profile_image {
            Some(url) if !url.is_empty() => url.clone(),
            _ => {
                let digest = md5::compute(self.email.trim().to_lowercase().as_bytes());
                format!("https://www.gravatar.com/avatar/{:x}?d=identicon", digest)
            }
        }
    }

    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id,
            username: self.username.clone(),
            name: self.name.clone(),
            bio: self.bio.clone(),
            city: self.city.clone(),
            country: self.country.clone(),
            tango_role: self.tango_role,
            years_dancing: self.years_dancing,
            avatar_url: self.avatar_url(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

string_enum! {
    /// Site role
    pub enum UserRole {
        Admin => "admin",
        Moderator => "moderator",
        User => "user",
    }
}

impl Default for UserRole {
    fn default() -> Self {
        Self::User
    }
}

string_enum! {
    pub enum UserStatus {
        Active => "active",
        Banned => "banned",
    }
}

string_enum! {
    /// The role a dancer usually takes in the embrace
    pub enum TangoRole {
        Leader => "leader",
        Follower => "follower",
        Both => "both",
        None => "none",
    }
}

/// What other members can see of a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: i64,
    pub username: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub tango_role: TangoRole,
    pub years_dancing: Option<i64>,
    pub avatar_url: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

/// Registration request
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Profile fields a user may change; `None` keeps the current value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub tango_role: Option<TangoRole>,
    pub years_dancing: Option<i64>,
    pub profile_image: Option<String>,
}
