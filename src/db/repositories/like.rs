//! Polymorphic like repository

use crate::db::{is_unique_violation, with_driver, DynDatabasePool};
use crate::models::LikeTarget;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait LikeRepository: Send + Sync {
    async fn exists(&self, user_id: i64, target: LikeTarget, target_id: i64) -> Result<bool>;

    /// Insert a like; returns false if it already existed
    async fn insert(&self, user_id: i64, target: LikeTarget, target_id: i64) -> Result<bool>;

    /// Remove a like; returns false if there was none
    async fn remove(&self, user_id: i64, target: LikeTarget, target_id: i64) -> Result<bool>;

    async fn count(&self, target: LikeTarget, target_id: i64) -> Result<i64>;
}

pub struct SqlxLikeRepository {
    pool: DynDatabasePool,
}

impl SqlxLikeRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LikeRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LikeRepository for SqlxLikeRepository {
    async fn exists(&self, user_id: i64, target: LikeTarget, target_id: i64) -> Result<bool> {
        let count = with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM likes WHERE user_id = ? AND target_type = ? AND target_id = ?",
            )
            .bind(user_id)
            .bind(target.as_str())
            .bind(target_id)
            .fetch_one(conn)
            .await
            .context("Failed to check like")?
        });
        Ok(count > 0)
    }

    async fn insert(&self, user_id: i64, target: LikeTarget, target_id: i64) -> Result<bool> {
        let inserted = with_driver!(self.pool, conn => {
            sqlx::query("INSERT INTO likes (user_id, target_type, target_id, created_at) VALUES (?, ?, ?, ?)")
                .bind(user_id)
                .bind(target.as_str())
                .bind(target_id)
                .bind(Utc::now())
                .execute(conn)
                .await
                .map(|_| ())
                .context("Failed to insert like")
        });
        match inserted {
            Ok(()) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn remove(&self, user_id: i64, target: LikeTarget, target_id: i64) -> Result<bool> {
        let affected = with_driver!(self.pool, conn => {
            sqlx::query("DELETE FROM likes WHERE user_id = ? AND target_type = ? AND target_id = ?")
                .bind(user_id)
                .bind(target.as_str())
                .bind(target_id)
                .execute(conn)
                .await
                .context("Failed to remove like")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn count(&self, target: LikeTarget, target_id: i64) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM likes WHERE target_type = ? AND target_id = ?",
            )
            .bind(target.as_str())
            .bind(target_id)
            .fetch_one(conn)
            .await
            .context("Failed to count likes")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_test_pool;

    #[tokio::test]
    async fn test_insert_and_remove_like() {
        let pool = migrated_test_pool().await;
        let user_id = sqlx::query("INSERT INTO users (username, email, password_hash) VALUES ('leo', 'leo@example.com', 'h')")
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap()
            .last_insert_rowid();
        let repo = SqlxLikeRepository::new(pool);

        assert!(repo.insert(user_id, LikeTarget::Event, 7).await.unwrap());
        assert!(!repo.insert(user_id, LikeTarget::Event, 7).await.unwrap());
        assert_eq!(repo.count(LikeTarget::Event, 7).await.unwrap(), 1);
        assert_eq!(repo.count(LikeTarget::Post, 7).await.unwrap(), 0);

        assert!(repo.remove(user_id, LikeTarget::Event, 7).await.unwrap());
        assert!(!repo.remove(user_id, LikeTarget::Event, 7).await.unwrap());
        assert!(!repo.exists(user_id, LikeTarget::Event, 7).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_likes_count_once() {
        let pool = migrated_test_pool().await;
        let user_id = sqlx::query("INSERT INTO users (username, email, password_hash) VALUES ('mora', 'mora@example.com', 'h')")
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap()
            .last_insert_rowid();
        let repo = SqlxLikeRepository::boxed(pool);

        let attempts = (0..4).map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.insert(user_id, LikeTarget::Post, 3).await })
        });
        let results = futures::future::join_all(attempts).await;
        let inserted = results
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .filter(|inserted| *inserted)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(repo.count(LikeTarget::Post, 3).await.unwrap(), 1);
    }
}
