//! Notification service
//!
//! Every notification is stored first; outbound push/email delivery then
//! runs in a background task so callers never wait on the network.

use std::sync::Arc;

use crate::db::repositories::{NotificationRepository, UserRepository};
use crate::models::{ListParams, NewNotification, Notification, PagedResult};
use crate::services::delivery::Delivery;
use crate::services::error::{ServiceError, ServiceResult};

pub struct NotificationService {
    repo: Arc<dyn NotificationRepository>,
    user_repo: Arc<dyn UserRepository>,
    delivery: Arc<Delivery>,
}

impl NotificationService {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        user_repo: Arc<dyn UserRepository>,
        delivery: Arc<Delivery>,
    ) -> Self {
        Self {
            repo,
            user_repo,
            delivery,
        }
    }

    /// Persist and dispatch. Returns `None` when the actor is the recipient.
    pub async fn notify(&self, new: NewNotification) -> ServiceResult<Option<Notification>> {
        if new.actor_id == Some(new.user_id) {
            return Ok(None);
        }

        let notification = self.repo.insert(&new).await?;
        tracing::debug!(
            user_id = notification.user_id,
            kind = %notification.kind,
            "Notification stored"
        );

        if self.delivery.is_enabled() {
            if let Some(recipient) = self.user_repo.get_by_id(notification.user_id).await? {
                let delivery = self.delivery.clone();
                let sent = notification.clone();
                tokio::spawn(async move {
                    delivery.deliver(&recipient, &sent).await;
                });
            }
        }

        Ok(Some(notification))
    }

    /// Like [`notify`](Self::notify) but a failure is only logged, for side
    /// effects of an operation that already succeeded.
    pub async fn send(&self, new: NewNotification) {
        let kind = new.kind;
        if let Err(e) = self.notify(new).await {
            tracing::warn!(%kind, "Failed to store notification: {}", e);
        }
    }

    pub async fn list(
        &self,
        user_id: i64,
        unread_only: bool,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<Notification>> {
        let (items, total) = self.repo.list(user_id, unread_only, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn unread_count(&self, user_id: i64) -> ServiceResult<i64> {
        Ok(self.repo.unread_count(user_id).await?)
    }

    pub async fn mark_read(&self, user_id: i64, id: i64) -> ServiceResult<()> {
        if !self.repo.mark_read(id, user_id).await? {
            return Err(ServiceError::not_found("Notification"));
        }
        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: i64) -> ServiceResult<u64> {
        Ok(self.repo.mark_all_read(user_id).await?)
    }
}
