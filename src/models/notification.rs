//! Notification model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    /// Recipient
    pub user_id: i64,
    /// Who triggered it, if anyone
    pub actor_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub kind: NotificationKind,
    pub target_type: Option<String>,
    pub target_id: Option<i64>,
    pub message: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

string_enum! {
    pub enum NotificationKind {
        FriendRequest => "friend_request",
        FriendAccepted => "friend_accepted",
        PostLiked => "post_liked",
        PostCommented => "post_commented",
        EventRsvp => "event_rsvp",
        HousingRequest => "housing_request",
        HousingResponse => "housing_response",
        ChatMessage => "chat_message",
        System => "system",
    }
}

impl NotificationKind {
    /// Kinds important enough to also go out by email
    pub fn sends_email(&self) -> bool {
        matches!(
            self,
            NotificationKind::FriendRequest
                | NotificationKind::HousingRequest
                | NotificationKind::HousingResponse
                | NotificationKind::System
        )
    }
}

/// A notification waiting to be stored and dispatched
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i64,
    pub actor_id: Option<i64>,
    pub kind: NotificationKind,
    pub target_type: Option<String>,
    pub target_id: Option<i64>,
    pub message: String,
}

impl NewNotification {
    pub fn new(user_id: i64, kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            user_id,
            actor_id: None,
            kind,
            target_type: None,
            target_id: None,
            message: message.into(),
        }
    }

    pub fn actor(mut self, actor_id: i64) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn target(mut self, target_type: &str, target_id: i64) -> Self {
        self.target_type = Some(target_type.to_string());
        self.target_id = Some(target_id);
        self
    }
}
