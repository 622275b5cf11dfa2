//! Notification repository

use crate::db::{with_driver, DynDatabasePool, LastInsertId};
use crate::models::{ListParams, NewNotification, Notification};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, actor_id, kind, target_type, target_id, message, read_at, created_at";

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: &NewNotification) -> Result<Notification>;

    async fn list(&self, user_id: i64, unread_only: bool, params: &ListParams) -> Result<(Vec<Notification>, i64)>;

    async fn unread_count(&self, user_id: i64) -> Result<i64>;

    /// Mark one notification read; false when it does not belong to the user
    async fn mark_read(&self, id: i64, user_id: i64) -> Result<bool>;

    async fn mark_all_read(&self, user_id: i64) -> Result<u64>;
}

pub struct SqlxNotificationRepository {
    pool: DynDatabasePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NotificationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn insert(&self, n: &NewNotification) -> Result<Notification> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                INSERT INTO notifications (user_id, actor_id, kind, target_type, target_id, message, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(n.user_id)
            .bind(n.actor_id)
            .bind(n.kind.as_str())
            .bind(&n.target_type)
            .bind(n.target_id)
            .bind(&n.message)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to insert notification")?
            .last_id()
        });

        Ok(Notification {
            id,
            user_id: n.user_id,
            actor_id: n.actor_id,
            kind: n.kind,
            target_type: n.target_type.clone(),
            target_id: n.target_id,
            message: n.message.clone(),
            read_at: None,
            created_at: now,
        })
    }

    async fn list(&self, user_id: i64, unread_only: bool, params: &ListParams) -> Result<(Vec<Notification>, i64)> {
        let where_sql = if unread_only {
            "user_id = ? AND read_at IS NULL"
        } else {
            "user_id = ?"
        };
        let sql = format!(
            "SELECT {} FROM notifications WHERE {} ORDER BY id DESC LIMIT ? OFFSET ?",
            NOTIFICATION_COLUMNS, where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM notifications WHERE {}", where_sql);

        with_driver!(self.pool, conn => {
            let items = sqlx::query_as::<_, Notification>(&sql)
                .bind(user_id)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list notifications")?;
            let total = sqlx::query_scalar::<_, i64>(&count_sql)
                .bind(user_id)
                .fetch_one(conn)
                .await
                .context("Failed to count notifications")?;
            Ok((items, total))
        })
    }

    async fn unread_count(&self, user_id: i64) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read_at IS NULL",
            )
            .bind(user_id)
            .fetch_one(conn)
            .await
            .context("Failed to count unread notifications")
        })
    }

    async fn mark_read(&self, id: i64, user_id: i64) -> Result<bool> {
        let found = with_driver!(self.pool, conn => {
            let found = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM notifications WHERE id = ? AND user_id = ?",
            )
            .bind(id)
            .bind(user_id)
            .fetch_one(conn)
            .await
            .context("Failed to look up notification")?;
            if found > 0 {
                sqlx::query("UPDATE notifications SET read_at = ? WHERE id = ? AND read_at IS NULL")
                    .bind(Utc::now())
                    .bind(id)
                    .execute(conn)
                    .await
                    .context("Failed to mark notification read")?;
            }
            found
        });
        Ok(found > 0)
    }

    async fn mark_all_read(&self, user_id: i64) -> Result<u64> {
        with_driver!(self.pool, conn => {
            let result = sqlx::query("UPDATE notifications SET read_at = ? WHERE user_id = ? AND read_at IS NULL")
                .bind(Utc::now())
                .bind(user_id)
                .execute(conn)
                .await
                .context("Failed to mark notifications read")?;
            Ok(result.rows_affected())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_test_pool;
    use crate::models::NotificationKind;

    #[tokio::test]
    async fn test_read_markers() {
        let pool = migrated_test_pool().await;
        let sqlite = pool.as_sqlite().unwrap();
        let user_id = sqlx::query("INSERT INTO users (username, email, password_hash) VALUES ('rita', 'rita@example.com', 'h')")
            .execute(sqlite)
            .await
            .unwrap()
            .last_insert_rowid();
        let other_id = sqlx::query("INSERT INTO users (username, email, password_hash) VALUES ('tito', 'tito@example.com', 'h')")
            .execute(sqlite)
            .await
            .unwrap()
            .last_insert_rowid();
        let repo = SqlxNotificationRepository::new(pool);

        let first = repo
            .insert(&NewNotification::new(user_id, NotificationKind::FriendRequest, "tito wants to be friends").actor(other_id))
            .await
            .unwrap();
        repo.insert(&NewNotification::new(user_id, NotificationKind::PostLiked, "tito liked your post").target("post", 3))
            .await
            .unwrap();
        assert_eq!(repo.unread_count(user_id).await.unwrap(), 2);

        assert!(!repo.mark_read(first.id, other_id).await.unwrap());
        assert!(repo.mark_read(first.id, user_id).await.unwrap());
        let (unread, total) = repo.list(user_id, true, &ListParams::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(unread[0].target_id, Some(3));

        assert_eq!(repo.mark_all_read(user_id).await.unwrap(), 1);
        assert_eq!(repo.unread_count(user_id).await.unwrap(), 0);
        let (all, _) = repo.list(user_id, false, &ListParams::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
