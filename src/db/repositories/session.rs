//! Session repository

use crate::db::{with_driver, DynDatabasePool};
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Look up a session by its token
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete every session of a user, optionally keeping one token alive
    async fn delete_by_user(&self, user_id: i64, keep: Option<&str>) -> Result<u64>;

    /// Delete expired sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<u64>;
}

pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        with_driver!(self.pool, conn => {
            sqlx::query("INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
                .bind(&session.id)
                .bind(session.user_id)
                .bind(session.expires_at)
                .bind(session.created_at)
                .execute(conn)
                .await
                .context("Failed to create session")?;
        });
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Session>(
                "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(conn)
            .await
            .context("Failed to get session")
        })
    }

    async fn delete(&self, id: &str) -> Result<()> {
        with_driver!(self.pool, conn => {
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete session")?;
        });
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64, keep: Option<&str>) -> Result<u64> {
        let keep = keep.unwrap_or("");
        with_driver!(self.pool, conn => {
            Ok(sqlx::query("DELETE FROM sessions WHERE user_id = ? AND id <> ?")
                .bind(user_id)
                .bind(keep)
                .execute(conn)
                .await
                .context("Failed to delete user sessions")?
                .rows_affected())
        })
    }

    async fn delete_expired(&self) -> Result<u64> {
        with_driver!(self.pool, conn => {
            Ok(sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
                .bind(Utc::now())
                .execute(conn)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_test_pool;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::models::{User, UserRole};
    use chrono::Duration;

    async fn setup() -> (SqlxSessionRepository, i64) {
        let pool = migrated_test_pool().await;
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new("sam".into(), "sam@example.com".into(), "h".into(), UserRole::User))
            .await
            .unwrap();
        (SqlxSessionRepository::new(pool), user.id)
    }

    fn session(id: &str, user_id: i64, ttl: Duration) -> Session {
        let now = Utc::now();
        Session {
            id: id.to_string(),
            user_id,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let (repo, user_id) = setup().await;
        repo.create(&session("tok", user_id, Duration::days(1))).await.unwrap();

        let found = repo.get_by_id("tok").await.unwrap().unwrap();
        assert_eq!(found.user_id, user_id);
        assert!(!found.is_expired());

        repo.delete("tok").await.unwrap();
        assert!(repo.get_by_id("tok").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_only() {
        let (repo, user_id) = setup().await;
        repo.create(&session("old", user_id, Duration::hours(-1))).await.unwrap();
        repo.create(&session("new", user_id, Duration::hours(1))).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_by_user_keeps_current() {
        let (repo, user_id) = setup().await;
        for id in ["a", "b", "c"] {
            repo.create(&session(id, user_id, Duration::days(1))).await.unwrap();
        }

        assert_eq!(repo.delete_by_user(user_id, Some("b")).await.unwrap(), 2);
        assert!(repo.get_by_id("b").await.unwrap().is_some());
        assert_eq!(repo.delete_by_user(user_id, None).await.unwrap(), 1);
    }
}
