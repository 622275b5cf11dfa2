//! User repository
//!
//! - `UserRepository` trait defining user data access
//! - `SqlxUserRepository` implementing it for SQLite and MySQL
//!
//! Soft-deleted users are invisible to every lookup.

use crate::db::{with_driver, DynDatabasePool, LastInsertId};
use crate::models::{ListParams, User, UserRole, UserStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, username, email, password_hash, name, bio, city, country, \
     tango_role, years_dancing, profile_image, role, status, created_at, updated_at, deleted_at";

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Fetch several users at once (missing ids are skipped)
    async fn get_many(&self, ids: &[i64]) -> Result<Vec<User>>;

    /// Persist profile fields (name, bio, location, tango details, image)
    async fn update_profile(&self, user: &User) -> Result<User>;

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()>;

    async fn set_status(&self, id: i64, status: UserStatus) -> Result<()>;

    async fn set_role(&self, id: i64, role: UserRole) -> Result<()>;

    async fn soft_delete(&self, id: i64) -> Result<()>;

    /// Count users, including soft-deleted ones when `include_deleted`
    async fn count(&self, include_deleted: bool) -> Result<i64>;

    async fn count_by_status(&self, status: UserStatus) -> Result<i64>;

    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)>;

    /// Case-insensitive match on username, name or city
    async fn search(&self, query: &str, params: &ListParams) -> Result<(Vec<User>, i64)>;
}

pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE {} = ? AND deleted_at IS NULL",
            USER_COLUMNS, column
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, User>(&sql)
                .bind(value)
                .fetch_optional(conn)
                .await
                .with_context(|| format!("Failed to get user by {}", column))
        })
    }
}

/// `?, ?, ?` for an `IN (...)` clause
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// `%term%` with LIKE wildcards escaped; pair with `ESCAPE '!'`
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('!', "!!")
        .replace('%', "!%")
        .replace('_', "!_");
    format!("%{}%", escaped)
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                INSERT INTO users (username, email, password_hash, name, bio, city, country,
                    tango_role, years_dancing, profile_image, role, status, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.name)
            .bind(&user.bio)
            .bind(&user.city)
            .bind(&user.country)
            .bind(user.tango_role.as_str())
            .bind(user.years_dancing)
            .bind(&user.profile_image)
            .bind(user.role.as_str())
            .bind(user.status.as_str())
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create user")?
            .last_id()
        });

        Ok(User {
            id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE id = ? AND deleted_at IS NULL",
            USER_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get user by ID")
        })
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_one("username", username).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_one("email", email).await
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM users WHERE id IN ({}) AND deleted_at IS NULL",
            USER_COLUMNS,
            placeholders(ids.len())
        );
        with_driver!(self.pool, conn => {
            let mut query = sqlx::query_as::<_, User>(&sql);
            for id in ids {
                query = query.bind(*id);
            }
            query.fetch_all(conn).await.context("Failed to load users")
        })
    }

    async fn update_profile(&self, user: &User) -> Result<User> {
        with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                UPDATE users
                SET name = ?, bio = ?, city = ?, country = ?, tango_role = ?,
                    years_dancing = ?, profile_image = ?, updated_at = ?
                WHERE id = ? AND deleted_at IS NULL
                "#,
            )
            .bind(&user.name)
            .bind(&user.bio)
            .bind(&user.city)
            .bind(&user.country)
            .bind(user.tango_role.as_str())
            .bind(user.years_dancing)
            .bind(&user.profile_image)
            .bind(Utc::now())
            .bind(user.id)
            .execute(conn)
            .await
            .context("Failed to update user")?;
        });

        self.get_by_id(user.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after update"))
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
                .bind(password_hash)
                .bind(Utc::now())
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to update password")?;
        });
        Ok(())
    }

    async fn set_status(&self, id: i64, status: UserStatus) -> Result<()> {
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(Utc::now())
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to update user status")?;
        });
        Ok(())
    }

    async fn set_role(&self, id: i64, role: UserRole) -> Result<()> {
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
                .bind(role.as_str())
                .bind(Utc::now())
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to update user role")?;
        });
        Ok(())
    }

    async fn soft_delete(&self, id: i64) -> Result<()> {
        let now = Utc::now();
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE users SET deleted_at = ?, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete user")?;
        });
        Ok(())
    }

    async fn count(&self, include_deleted: bool) -> Result<i64> {
        let sql = if include_deleted {
            "SELECT COUNT(*) FROM users"
        } else {
            "SELECT COUNT(*) FROM users WHERE deleted_at IS NULL"
        };
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(sql)
                .fetch_one(conn)
                .await
                .context("Failed to count users")
        })
    }

    async fn count_by_status(&self, status: UserStatus) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM users WHERE status = ? AND deleted_at IS NULL",
            )
            .bind(status.as_str())
            .fetch_one(conn)
            .await
            .context("Failed to count users by status")
        })
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)> {
        let sql = format!(
            "SELECT {} FROM users WHERE deleted_at IS NULL ORDER BY id DESC LIMIT ? OFFSET ?",
            USER_COLUMNS
        );
        let users = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, User>(&sql)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list users")?
        });
        let total = self.count(false).await?;
        Ok((users, total))
    }

    async fn search(&self, query: &str, params: &ListParams) -> Result<(Vec<User>, i64)> {
        let pattern = like_pattern(query);
        let filter = "deleted_at IS NULL AND status = 'active' AND (LOWER(username) LIKE ? ESCAPE '!' \
             OR LOWER(COALESCE(name, '')) LIKE ? ESCAPE '!' OR LOWER(COALESCE(city, '')) LIKE ? ESCAPE '!')";
        let sql = format!(
            "SELECT {} FROM users WHERE {} ORDER BY username LIMIT ? OFFSET ?",
            USER_COLUMNS, filter
        );
        let count_sql = format!("SELECT COUNT(*) FROM users WHERE {}", filter);

        with_driver!(self.pool, conn => {
            let users = sqlx::query_as::<_, User>(&sql)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to search users")?;
            let total = sqlx::query_scalar::<_, i64>(&count_sql)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .fetch_one(conn)
                .await
                .context("Failed to count user search results")?;
            Ok((users, total))
        })
    }
}
