//! Post repository
//!
//! Visibility is enforced in SQL: a viewer sees public posts, their own
//! posts, and `friends` posts of accepted friends.

use crate::db::{with_driver, DynDatabasePool, LastInsertId};
use crate::models::{ListParams, Post};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::user::like_pattern;

const POST_COLUMNS: &str = "id, user_id, group_id, event_id, activity_id, content, location, \
     visibility, like_count, comment_count, created_at, updated_at, deleted_at";

/// Binds the viewer id three times; anonymous viewers use 0.
const VISIBLE_TO_VIEWER: &str = "(visibility = 'public' OR user_id = ? OR (visibility = 'friends' AND EXISTS (\
     SELECT 1 FROM friendships f WHERE f.status = 'accepted' AND f.deleted_at IS NULL AND (\
     (f.requester_id = ? AND f.addressee_id = posts.user_id) OR \
     (f.addressee_id = ? AND f.requester_id = posts.user_id)))))";

/// Optional narrowing of a post listing (`?user_id=&group_id=&event_id=`)
#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
pub struct PostFilter {
    pub user_id: Option<i64>,
    pub group_id: Option<i64>,
    pub event_id: Option<i64>,
}

impl PostFilter {
    fn sql(&self) -> String {
        let mut clauses = vec!["deleted_at IS NULL".to_string(), VISIBLE_TO_VIEWER.to_string()];
        if self.user_id.is_some() {
            clauses.push("user_id = ?".into());
        }
        if self.group_id.is_some() {
            clauses.push("group_id = ?".into());
        }
        if self.event_id.is_some() {
            clauses.push("event_id = ?".into());
        }
        clauses.join(" AND ")
    }

    fn values(&self) -> Vec<i64> {
        [self.user_id, self.group_id, self.event_id]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &Post) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    async fn update(&self, post: &Post) -> Result<Post>;

    async fn soft_delete(&self, id: i64) -> Result<()>;

    /// Posts `viewer_id` may see, newest first
    async fn list_visible(
        &self,
        viewer_id: Option<i64>,
        filter: PostFilter,
        params: &ListParams,
    ) -> Result<(Vec<Post>, i64)>;

    async fn search_visible(
        &self,
        viewer_id: Option<i64>,
        query: &str,
        params: &ListParams,
    ) -> Result<(Vec<Post>, i64)>;

    async fn adjust_like_count(&self, id: i64, delta: i64) -> Result<()>;

    async fn adjust_comment_count(&self, id: i64, delta: i64) -> Result<()>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }

    async fn adjust(&self, column: &str, id: i64, delta: i64) -> Result<()> {
        // Never let a counter go negative
        let sql = format!(
            "UPDATE posts SET {col} = CASE WHEN {col} + ? < 0 THEN 0 ELSE {col} + ? END WHERE id = ?",
            col = column
        );
        with_driver!(self.pool, conn => {
            sqlx::query(&sql)
                .bind(delta)
                .bind(delta)
                .bind(id)
                .execute(conn)
                .await
                .with_context(|| format!("Failed to adjust {}", column))?;
        });
        Ok(())
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post) -> Result<Post> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                INSERT INTO posts (user_id, group_id, event_id, activity_id, content, location,
                    visibility, like_count, comment_count, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
                "#,
            )
            .bind(post.user_id)
            .bind(post.group_id)
            .bind(post.event_id)
            .bind(post.activity_id)
            .bind(&post.content)
            .bind(&post.location)
            .bind(post.visibility.as_str())
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create post")?
            .last_id()
        });

        Ok(Post {
            id,
            like_count: 0,
            comment_count: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            ..post.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let sql = format!(
            "SELECT {} FROM posts WHERE id = ? AND deleted_at IS NULL",
            POST_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Post>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get post")
        })
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                UPDATE posts SET content = ?, location = ?, visibility = ?, activity_id = ?, updated_at = ?
                WHERE id = ? AND deleted_at IS NULL
                "#,
            )
            .bind(&post.content)
            .bind(&post.location)
            .bind(post.visibility.as_str())
            .bind(post.activity_id)
            .bind(Utc::now())
            .bind(post.id)
            .execute(conn)
            .await
            .context("Failed to update post")?;
        });
        self.get_by_id(post.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
    }

    async fn soft_delete(&self, id: i64) -> Result<()> {
        let now = Utc::now();
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE posts SET deleted_at = ?, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete post")?;
        });
        Ok(())
    }

    async fn list_visible(
        &self,
        viewer_id: Option<i64>,
        filter: PostFilter,
        params: &ListParams,
    ) -> Result<(Vec<Post>, i64)> {
        let viewer = viewer_id.unwrap_or(0);
        let where_sql = filter.sql();
        let sql = format!(
            "SELECT {} FROM posts WHERE {} ORDER BY id DESC LIMIT ? OFFSET ?",
            POST_COLUMNS, where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM posts WHERE {}", where_sql);
        let values = filter.values();

        with_driver!(self.pool, conn => {
            let mut query = sqlx::query_as::<_, Post>(&sql).bind(viewer).bind(viewer).bind(viewer);
            let mut count = sqlx::query_scalar::<_, i64>(&count_sql).bind(viewer).bind(viewer).bind(viewer);
            for v in &values {
                query = query.bind(*v);
                count = count.bind(*v);
            }
            let posts = query
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list posts")?;
            let total = count.fetch_one(conn).await.context("Failed to count posts")?;
            Ok((posts, total))
        })
    }

    async fn search_visible(
        &self,
        viewer_id: Option<i64>,
        query: &str,
        params: &ListParams,
    ) -> Result<(Vec<Post>, i64)> {
        let viewer = viewer_id.unwrap_or(0);
        let pattern = like_pattern(query);
        let where_sql = format!(
            "deleted_at IS NULL AND {} AND (LOWER(content) LIKE ? ESCAPE '!' OR LOWER(COALESCE(location, '')) LIKE ? ESCAPE '!')",
            VISIBLE_TO_VIEWER
        );
        let sql = format!(
            "SELECT {} FROM posts WHERE {} ORDER BY id DESC LIMIT ? OFFSET ?",
            POST_COLUMNS, where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM posts WHERE {}", where_sql);

        with_driver!(self.pool, conn => {
            let posts = sqlx::query_as::<_, Post>(&sql)
                .bind(viewer)
                .bind(viewer)
                .bind(viewer)
                .bind(&pattern)
                .bind(&pattern)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to search posts")?;
            let total = sqlx::query_scalar::<_, i64>(&count_sql)
                .bind(viewer)
                .bind(viewer)
                .bind(viewer)
                .bind(&pattern)
                .bind(&pattern)
                .fetch_one(conn)
                .await
                .context("Failed to count post search results")?;
            Ok((posts, total))
        })
    }

    async fn adjust_like_count(&self, id: i64, delta: i64) -> Result<()> {
        self.adjust("like_count", id, delta).await
    }

    async fn adjust_comment_count(&self, id: i64, delta: i64) -> Result<()> {
        self.adjust("comment_count", id, delta).await
    }

    async fn count(&self) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE deleted_at IS NULL")
                .fetch_one(conn)
                .await
                .context("Failed to count posts")
        })
    }
}
