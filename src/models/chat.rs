//! Chat rooms and messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatRoom {
    pub id: i64,
    pub name: Option<String>,
    pub is_group: bool,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatRoomMember {
    pub room_id: i64,
    pub user_id: i64,
    pub last_read_message_id: Option<i64>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub room_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A message as returned to clients; deleted messages keep their slot
/// in the history but lose their content.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessageView {
    pub id: i64,
    pub room_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for ChatMessageView {
    fn from(msg: ChatMessage) -> Self {
        let deleted = msg.deleted_at.is_some();
        Self {
            id: msg.id,
            room_id: msg.room_id,
            sender_id: msg.sender_id,
            content: if deleted { String::new() } else { msg.content },
            deleted,
            created_at: msg.created_at,
        }
    }
}

/// Room entry in a user's inbox
#[derive(Debug, Clone, Serialize)]
pub struct ChatRoomSummary {
    #[serde(flatten)]
    pub room: ChatRoom,
    pub member_ids: Vec<i64>,
    pub last_message: Option<ChatMessageView>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoomInput {
    pub member_ids: Vec<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deleted_message_is_blanked() {
        let now = Utc::now();
        let msg = ChatMessage {
            id: 1,
            room_id: 1,
            sender_id: 1,
            content: "secret".into(),
            created_at: now,
            updated_at: now,
            deleted_at: Some(now),
        };

        let view = ChatMessageView::from(msg);
        assert!(view.deleted);
        assert!(view.content.is_empty());
    }
}
