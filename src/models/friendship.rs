//! Friendship model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A friend request and, once accepted, the friendship itself
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Friendship {
    pub id: i64,
    pub requester_id: i64,
    pub addressee_id: i64,
    #[sqlx(try_from = "String")]
    pub status: FriendshipStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Friendship {
    /// The user on the other side of the relation from `user_id`
    pub fn other(&self, user_id: i64) -> i64 {
        if self.requester_id == user_id {
            self.addressee_id
        } else {
            self.requester_id
        }
    }
}

string_enum! {
    pub enum FriendshipStatus {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
    }
}
