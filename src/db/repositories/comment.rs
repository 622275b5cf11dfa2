//! Comment repository

use crate::db::{with_driver, DynDatabasePool, LastInsertId};
use crate::models::Comment;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const COMMENT_COLUMNS: &str =
    "id, post_id, user_id, parent_id, content, created_at, updated_at, deleted_at";

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, comment: &Comment) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// All live comments of a post, oldest first
    async fn list_by_post(&self, post_id: i64) -> Result<Vec<Comment>>;

    async fn soft_delete(&self, id: i64) -> Result<()>;

    async fn count_by_post(&self, post_id: i64) -> Result<i64>;
}

pub struct CommentRepositoryImpl {
    pool: DynDatabasePool,
}

impl CommentRepositoryImpl {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for CommentRepositoryImpl {
    async fn create(&self, comment: &Comment) -> Result<Comment> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                "INSERT INTO comments (post_id, user_id, parent_id, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(comment.post_id)
            .bind(comment.user_id)
            .bind(comment.parent_id)
            .bind(&comment.content)
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create comment")?
            .last_id()
        });

        Ok(Comment {
            id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            ..comment.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!(
            "SELECT {} FROM comments WHERE id = ? AND deleted_at IS NULL",
            COMMENT_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Comment>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get comment")
        })
    }

    async fn list_by_post(&self, post_id: i64) -> Result<Vec<Comment>> {
        let sql = format!(
            "SELECT {} FROM comments WHERE post_id = ? AND deleted_at IS NULL ORDER BY id ASC",
            COMMENT_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Comment>(&sql)
                .bind(post_id)
                .fetch_all(conn)
                .await
                .context("Failed to list comments")
        })
    }

    async fn soft_delete(&self, id: i64) -> Result<()> {
        let now = Utc::now();
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE comments SET deleted_at = ?, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete comment")?;
        });
        Ok(())
    }

    async fn count_by_post(&self, post_id: i64) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM comments WHERE post_id = ? AND deleted_at IS NULL",
            )
            .bind(post_id)
            .fetch_one(conn)
            .await
            .context("Failed to count comments")
        })
    }
}
