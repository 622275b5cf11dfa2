//! Polymorphic likes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Like {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub target_type: LikeTarget,
    pub target_id: i64,
    pub created_at: DateTime<Utc>,
}

string_enum! {
    /// What a like points at
    pub enum LikeTarget {
        Post => "post",
        Comment => "comment",
        Event => "event",
    }
}

/// Result of toggling a like
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LikeToggle {
    pub liked: bool,
    pub count: i64,
}
