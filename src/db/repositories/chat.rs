//! Chat room and message repository

use crate::db::{with_driver, DynDatabasePool, LastInsertId};
use crate::models::{ChatMessage, ChatRoom};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const ROOM_COLUMNS: &str = "id, name, is_group, created_by, created_at, updated_at, deleted_at";
const MESSAGE_COLUMNS: &str = "id, room_id, sender_id, content, created_at, updated_at, deleted_at";

#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Create a room with its initial members (the creator included)
    async fn create_room(
        &self,
        created_by: i64,
        name: Option<&str>,
        is_group: bool,
        member_ids: &[i64],
    ) -> Result<ChatRoom>;

    async fn get_room(&self, id: i64) -> Result<Option<ChatRoom>>;

    /// The existing one-to-one room between two users
    async fn find_direct_room(&self, a: i64, b: i64) -> Result<Option<ChatRoom>>;

    async fn is_member(&self, room_id: i64, user_id: i64) -> Result<bool>;

    async fn member_ids(&self, room_id: i64) -> Result<Vec<i64>>;

    async fn add_member(&self, room_id: i64, user_id: i64) -> Result<()>;

    async fn remove_member(&self, room_id: i64, user_id: i64) -> Result<()>;

    /// Rooms a user belongs to, most recently active first
    async fn list_rooms_for_user(&self, user_id: i64) -> Result<Vec<ChatRoom>>;

    /// Store a message and bump the room's activity timestamp
    async fn insert_message(&self, room_id: i64, sender_id: i64, content: &str) -> Result<ChatMessage>;

    async fn get_message(&self, id: i64) -> Result<Option<ChatMessage>>;

    /// Page of history, newest first. Deleted messages are included so
    /// clients can render placeholders.
    async fn list_messages(&self, room_id: i64, before_id: Option<i64>, limit: i64) -> Result<Vec<ChatMessage>>;

    async fn latest_message(&self, room_id: i64) -> Result<Option<ChatMessage>>;

    async fn soft_delete_message(&self, id: i64) -> Result<()>;

    async fn mark_read(&self, room_id: i64, user_id: i64, message_id: i64) -> Result<()>;

    /// Live messages from other members newer than the user's read marker
    async fn unread_count(&self, room_id: i64, user_id: i64) -> Result<i64>;
}

pub struct SqlxChatRepository {
    pool: DynDatabasePool,
}

impl SqlxChatRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ChatRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ChatRepository for SqlxChatRepository {
    async fn create_room(
        &self,
        created_by: i64,
        name: Option<&str>,
        is_group: bool,
        member_ids: &[i64],
    ) -> Result<ChatRoom> {
        let now = Utc::now();
        let mut members = vec![created_by];
        for id in member_ids {
            if !members.contains(id) {
                members.push(*id);
            }
        }

        // room and members land together or not at all
        let id = with_driver!(self.pool, conn => {
            let mut tx = conn.begin().await.context("Failed to start transaction")?;
            let id = sqlx::query(
                "INSERT INTO chat_rooms (name, is_group, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(name)
            .bind(is_group)
            .bind(created_by)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to create chat room")?
            .last_id();
            for member in &members {
                sqlx::query("INSERT INTO chat_room_members (room_id, user_id, joined_at) VALUES (?, ?, ?)")
                    .bind(id)
                    .bind(*member)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to add chat room member")?;
            }
            tx.commit().await.context("Failed to commit chat room")?;
            id
        });

        Ok(ChatRoom {
            id,
            name: name.map(str::to_string),
            is_group,
            created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    async fn get_room(&self, id: i64) -> Result<Option<ChatRoom>> {
        let sql = format!(
            "SELECT {} FROM chat_rooms WHERE id = ? AND deleted_at IS NULL",
            ROOM_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, ChatRoom>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get chat room")
        })
    }

    async fn find_direct_room(&self, a: i64, b: i64) -> Result<Option<ChatRoom>> {
        let sql = format!(
            "SELECT {} FROM chat_rooms r WHERE r.deleted_at IS NULL AND r.is_group = ? \
             AND EXISTS (SELECT 1 FROM chat_room_members m WHERE m.room_id = r.id AND m.user_id = ?) \
             AND EXISTS (SELECT 1 FROM chat_room_members m WHERE m.room_id = r.id AND m.user_id = ?) \
             ORDER BY r.id ASC LIMIT 1",
            ROOM_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, ChatRoom>(&sql)
                .bind(false)
                .bind(a)
                .bind(b)
                .fetch_optional(conn)
                .await
                .context("Failed to find direct room")
        })
    }

    async fn is_member(&self, room_id: i64, user_id: i64) -> Result<bool> {
        let count = with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM chat_room_members WHERE room_id = ? AND user_id = ?",
            )
            .bind(room_id)
            .bind(user_id)
            .fetch_one(conn)
            .await
            .context("Failed to check room membership")?
        });
        Ok(count > 0)
    }

    async fn member_ids(&self, room_id: i64) -> Result<Vec<i64>> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT user_id FROM chat_room_members WHERE room_id = ? ORDER BY joined_at ASC, user_id ASC",
            )
            .bind(room_id)
            .fetch_all(conn)
            .await
            .context("Failed to list room members")
        })
    }

    async fn add_member(&self, room_id: i64, user_id: i64) -> Result<()> {
        if self.is_member(room_id, user_id).await? {
            return Ok(());
        }
        with_driver!(self.pool, conn => {
            sqlx::query("INSERT INTO chat_room_members (room_id, user_id, joined_at) VALUES (?, ?, ?)")
                .bind(room_id)
                .bind(user_id)
                .bind(Utc::now())
                .execute(conn)
                .await
                .context("Failed to add room member")?;
        });
        Ok(())
    }

    async fn remove_member(&self, room_id: i64, user_id: i64) -> Result<()> {
        with_driver!(self.pool, conn => {
            sqlx::query("DELETE FROM chat_room_members WHERE room_id = ? AND user_id = ?")
                .bind(room_id)
                .bind(user_id)
                .execute(conn)
                .await
                .context("Failed to remove room member")?;
        });
        Ok(())
    }

    async fn list_rooms_for_user(&self, user_id: i64) -> Result<Vec<ChatRoom>> {
        let sql = format!(
            "SELECT {} FROM chat_rooms r WHERE r.deleted_at IS NULL \
             AND EXISTS (SELECT 1 FROM chat_room_members m WHERE m.room_id = r.id AND m.user_id = ?) \
             ORDER BY r.updated_at DESC, r.id DESC",
            ROOM_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, ChatRoom>(&sql)
                .bind(user_id)
                .fetch_all(conn)
                .await
                .context("Failed to list chat rooms")
        })
    }

    async fn insert_message(&self, room_id: i64, sender_id: i64, content: &str) -> Result<ChatMessage> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            let id = sqlx::query(
                "INSERT INTO chat_messages (room_id, sender_id, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(room_id)
            .bind(sender_id)
            .bind(content)
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to insert message")?
            .last_id();
            sqlx::query("UPDATE chat_rooms SET updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(room_id)
                .execute(conn)
                .await
                .context("Failed to touch chat room")?;
            id
        });

        Ok(ChatMessage {
            id,
            room_id,
            sender_id,
            content: content.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    async fn get_message(&self, id: i64) -> Result<Option<ChatMessage>> {
        let sql = format!("SELECT {} FROM chat_messages WHERE id = ?", MESSAGE_COLUMNS);
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, ChatMessage>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get message")
        })
    }

    async fn list_messages(&self, room_id: i64, before_id: Option<i64>, limit: i64) -> Result<Vec<ChatMessage>> {
        let sql = format!(
            "SELECT {} FROM chat_messages WHERE room_id = ? AND id < ? ORDER BY id DESC LIMIT ?",
            MESSAGE_COLUMNS
        );
        let before = before_id.unwrap_or(i64::MAX);
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, ChatMessage>(&sql)
                .bind(room_id)
                .bind(before)
                .bind(limit)
                .fetch_all(conn)
                .await
                .context("Failed to list messages")
        })
    }

    async fn latest_message(&self, room_id: i64) -> Result<Option<ChatMessage>> {
        Ok(self.list_messages(room_id, None, 1).await?.into_iter().next())
    }

    async fn soft_delete_message(&self, id: i64) -> Result<()> {
        let now = Utc::now();
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE chat_messages SET deleted_at = ?, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete message")?;
        });
        Ok(())
    }

    async fn mark_read(&self, room_id: i64, user_id: i64, message_id: i64) -> Result<()> {
        with_driver!(self.pool, conn => {
            sqlx::query(
                "UPDATE chat_room_members SET last_read_message_id = ? \
                 WHERE room_id = ? AND user_id = ? AND (last_read_message_id IS NULL OR last_read_message_id < ?)",
            )
            .bind(message_id)
            .bind(room_id)
            .bind(user_id)
            .bind(message_id)
            .execute(conn)
            .await
            .context("Failed to mark room read")?;
        });
        Ok(())
    }

    async fn unread_count(&self, room_id: i64, user_id: i64) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*) FROM chat_messages
                WHERE room_id = ? AND sender_id <> ? AND deleted_at IS NULL
                  AND id > COALESCE((SELECT last_read_message_id FROM chat_room_members
                                     WHERE room_id = ? AND user_id = ?), 0)
                "#,
            )
            .bind(room_id)
            .bind(user_id)
            .bind(room_id)
            .bind(user_id)
            .fetch_one(conn)
            .await
            .context("Failed to count unread messages")
        })
    }
}
