//! Direct and group chat
//!
//! Every operation on a room requires membership. Message history is paged
//! by id, newest first, and deleted messages stay in place with their
//! content blanked.

use std::sync::Arc;

use crate::db::repositories::{ChatRepository, UserRepository};
use crate::models::{
    ChatMessageView, ChatRoom, ChatRoomSummary, CreateRoomInput, NewNotification,
    NotificationKind, User,
};
use crate::services::error::{found, require_text, ServiceError, ServiceResult};
use crate::services::notification::NotificationService;

const MAX_MESSAGE_CHARS: usize = 5_000;
const MAX_ROOM_NAME_CHARS: usize = 100;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 100;

pub struct ChatService {
    repo: Arc<dyn ChatRepository>,
    user_repo: Arc<dyn UserRepository>,
    notifications: Arc<NotificationService>,
}

impl ChatService {
    pub fn new(
        repo: Arc<dyn ChatRepository>,
        user_repo: Arc<dyn UserRepository>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            repo,
            user_repo,
            notifications,
        }
    }

    /// Open a room with the given users.
    ///
    /// A one-to-one room without a name is reused when the pair already
    /// has one.
    pub async fn create_room(&self, user: &User, input: CreateRoomInput) -> ServiceResult<ChatRoom> {
        let mut others: Vec<i64> = input
            .member_ids
            .into_iter()
            .filter(|id| *id != user.id)
            .collect();
        others.sort_unstable();
        others.dedup();
        if others.is_empty() {
            return Err(ServiceError::validation("A room needs at least one other member"));
        }
        if self.user_repo.get_many(&others).await?.len() != others.len() {
            return Err(ServiceError::not_found("User"));
        }

        let name = match input.name {
            Some(name) if !name.trim().is_empty() => Some(require_text("Room name", &name, MAX_ROOM_NAME_CHARS)?),
            _ => None,
        };
        let is_group = others.len() > 1 || name.is_some();

        if !is_group {
            if let Some(room) = self.repo.find_direct_room(user.id, others[0]).await? {
                return Ok(room);
            }
        }

        let room = self
            .repo
            .create_room(user.id, name.as_deref(), is_group, &others)
            .await?;
        tracing::debug!(room_id = room.id, members = others.len() + 1, "Chat room created");
        Ok(room)
    }

    /// The user's inbox, most recently active room first
    pub async fn list_rooms(&self, user: &User) -> ServiceResult<Vec<ChatRoomSummary>> {
        let rooms = self.repo.list_rooms_for_user(user.id).await?;
        let mut summaries = Vec::with_capacity(rooms.len());
        for room in rooms {
            let member_ids = self.repo.member_ids(room.id).await?;
            let last_message = self.repo.latest_message(room.id).await?.map(ChatMessageView::from);
            let unread_count = self.repo.unread_count(room.id, user.id).await?;
            summaries.push(ChatRoomSummary {
                room,
                member_ids,
                last_message,
                unread_count,
            });
        }
        Ok(summaries)
    }

    pub async fn send_message(&self, user: &User, room_id: i64, content: &str) -> ServiceResult<ChatMessageView> {
        let room = self.member_room(user, room_id).await?;
        let content = require_text("Message", content, MAX_MESSAGE_CHARS)?;
        let message = self.repo.insert_message(room.id, user.id, &content).await?;

        for member in self.repo.member_ids(room.id).await? {
            if member == user.id {
                continue;
            }
            self.notifications
                .send(
                    NewNotification::new(
                        member,
                        NotificationKind::ChatMessage,
                        format!("New message from {}", user.username),
                    )
                    .actor(user.id)
                    .target("chat_room", room.id),
                )
                .await;
        }
        Ok(message.into())
    }

    pub async fn list_messages(
        &self,
        user: &User,
        room_id: i64,
        before_id: Option<i64>,
        limit: Option<i64>,
    ) -> ServiceResult<Vec<ChatMessageView>> {
        self.member_room(user, room_id).await?;
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
        let messages = self.repo.list_messages(room_id, before_id, limit).await?;
        Ok(messages.into_iter().map(ChatMessageView::from).collect())
    }

    pub async fn delete_message(&self, user: &User, message_id: i64) -> ServiceResult<()> {
        let message = found(self.repo.get_message(message_id).await?, "Message")?;
        if message.deleted_at.is_some() {
            return Err(ServiceError::not_found("Message"));
        }
        if message.sender_id != user.id {
            return Err(ServiceError::forbidden("Only the sender can delete a message"));
        }
        self.repo.soft_delete_message(message_id).await?;
        Ok(())
    }

    /// Move the user's read marker to the newest message in the room
    pub async fn mark_read(&self, user: &User, room_id: i64) -> ServiceResult<()> {
        self.member_room(user, room_id).await?;
        if let Some(latest) = self.repo.latest_message(room_id).await? {
            self.repo.mark_read(room_id, user.id, latest.id).await?;
        }
        Ok(())
    }

    /// Add someone to a group room
    pub async fn add_member(&self, user: &User, room_id: i64, new_member: i64) -> ServiceResult<()> {
        let room = self.member_room(user, room_id).await?;
        if !room.is_group {
            return Err(ServiceError::validation("Direct rooms cannot take new members"));
        }
        found(self.user_repo.get_by_id(new_member).await?, "User")?;
        if self.repo.is_member(room_id, new_member).await? {
            return Err(ServiceError::conflict("Already a member of this room"));
        }
        self.repo.add_member(room_id, new_member).await?;
        Ok(())
    }

    pub async fn leave_room(&self, user: &User, room_id: i64) -> ServiceResult<()> {
        self.member_room(user, room_id).await?;
        self.repo.remove_member(room_id, user.id).await?;
        Ok(())
    }

    async fn member_room(&self, user: &User, room_id: i64) -> ServiceResult<ChatRoom> {
        let room = found(self.repo.get_room(room_id).await?, "Chat room")?;
        if !self.repo.is_member(room_id, user.id).await? {
            return Err(ServiceError::forbidden("You are not a member of this room"));
        }
        Ok(room)
    }
}
