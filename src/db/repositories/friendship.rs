//! Friendship repository

use crate::db::{with_driver, DynDatabasePool, LastInsertId};
use crate::models::{Friendship, FriendshipStatus, ListParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const FRIENDSHIP_COLUMNS: &str =
    "id, requester_id, addressee_id, status, created_at, updated_at, deleted_at";

#[async_trait]
pub trait FriendshipRepository: Send + Sync {
    async fn create(&self, requester_id: i64, addressee_id: i64) -> Result<Friendship>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Friendship>>;

    /// The live relation between two users in either direction, if any.
    /// Rejected requests are not considered live.
    async fn find_between(&self, a: i64, b: i64) -> Result<Option<Friendship>>;

    async fn set_status(&self, id: i64, status: FriendshipStatus) -> Result<()>;

    async fn soft_delete(&self, id: i64) -> Result<()>;

    /// Accepted friendships of a user
    async fn list_accepted(&self, user_id: i64, params: &ListParams) -> Result<(Vec<Friendship>, i64)>;

    /// Pending requests addressed to a user
    async fn list_incoming(&self, user_id: i64) -> Result<Vec<Friendship>>;

    /// Pending requests sent by a user
    async fn list_outgoing(&self, user_id: i64) -> Result<Vec<Friendship>>;
}

pub struct SqlxFriendshipRepository {
    pool: DynDatabasePool,
}

impl SqlxFriendshipRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn FriendshipRepository> {
        Arc::new(Self::new(pool))
    }

    async fn list_pending(&self, column: &str, user_id: i64) -> Result<Vec<Friendship>> {
        let sql = format!(
            "SELECT {} FROM friendships WHERE {} = ? AND status = 'pending' AND deleted_at IS NULL ORDER BY id DESC",
            FRIENDSHIP_COLUMNS, column
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Friendship>(&sql)
                .bind(user_id)
                .fetch_all(conn)
                .await
                .context("Failed to list friend requests")
        })
    }
}

#[async_trait]
impl FriendshipRepository for SqlxFriendshipRepository {
    async fn create(&self, requester_id: i64, addressee_id: i64) -> Result<Friendship> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                "INSERT INTO friendships (requester_id, addressee_id, status, created_at, updated_at) VALUES (?, ?, 'pending', ?, ?)",
            )
            .bind(requester_id)
            .bind(addressee_id)
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create friend request")?
            .last_id()
        });

        Ok(Friendship {
            id,
            requester_id,
            addressee_id,
            status: FriendshipStatus::Pending,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Friendship>> {
        let sql = format!(
            "SELECT {} FROM friendships WHERE id = ? AND deleted_at IS NULL",
            FRIENDSHIP_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Friendship>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get friendship")
        })
    }

    async fn find_between(&self, a: i64, b: i64) -> Result<Option<Friendship>> {
        let sql = format!(
            "SELECT {} FROM friendships WHERE deleted_at IS NULL AND status <> 'rejected' \
             AND ((requester_id = ? AND addressee_id = ?) OR (requester_id = ? AND addressee_id = ?)) \
             ORDER BY id DESC LIMIT 1",
            FRIENDSHIP_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Friendship>(&sql)
                .bind(a)
                .bind(b)
                .bind(b)
                .bind(a)
                .fetch_optional(conn)
                .await
                .context("Failed to find friendship")
        })
    }

    async fn set_status(&self, id: i64, status: FriendshipStatus) -> Result<()> {
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE friendships SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(Utc::now())
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to update friendship")?;
        });
        Ok(())
    }

    async fn soft_delete(&self, id: i64) -> Result<()> {
        let now = Utc::now();
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE friendships SET deleted_at = ?, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete friendship")?;
        });
        Ok(())
    }

    async fn list_accepted(&self, user_id: i64, params: &ListParams) -> Result<(Vec<Friendship>, i64)> {
        let where_sql = "deleted_at IS NULL AND status = 'accepted' AND (requester_id = ? OR addressee_id = ?)";
        let sql = format!(
            "SELECT {} FROM friendships WHERE {} ORDER BY updated_at DESC, id DESC LIMIT ? OFFSET ?",
            FRIENDSHIP_COLUMNS, where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM friendships WHERE {}", where_sql);
        with_driver!(self.pool, conn => {
            let rows = sqlx::query_as::<_, Friendship>(&sql)
                .bind(user_id)
                .bind(user_id)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list friends")?;
            let total = sqlx::query_scalar::<_, i64>(&count_sql)
                .bind(user_id)
                .bind(user_id)
                .fetch_one(conn)
                .await
                .context("Failed to count friends")?;
            Ok((rows, total))
        })
    }

    async fn list_incoming(&self, user_id: i64) -> Result<Vec<Friendship>> {
        self.list_pending("addressee_id", user_id).await
    }

    async fn list_outgoing(&self, user_id: i64) -> Result<Vec<Friendship>> {
        self.list_pending("requester_id", user_id).await
    }
}
