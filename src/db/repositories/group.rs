//! Group and membership repository

use crate::db::{with_driver, DynDatabasePool, LastInsertId};
use crate::models::{Group, GroupMember, GroupMemberRole, ListParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::user::like_pattern;

const GROUP_COLUMNS: &str = "id, name, slug, description, group_type, city, country, created_by, \
     member_count, created_at, updated_at, deleted_at";

#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn create(&self, group: &Group) -> Result<Group>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Group>>;

    /// Slug lookup includes soft-deleted groups (slugs stay reserved)
    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    async fn update(&self, group: &Group) -> Result<Group>;

    async fn soft_delete(&self, id: i64) -> Result<()>;

    async fn list(&self, params: &ListParams) -> Result<(Vec<Group>, i64)>;

    async fn search(&self, query: &str, params: &ListParams) -> Result<(Vec<Group>, i64)>;

    async fn count(&self) -> Result<i64>;

    /// Live groups created by a user
    async fn count_created_by(&self, user_id: i64) -> Result<i64>;

    async fn get_member(&self, group_id: i64, user_id: i64) -> Result<Option<GroupMember>>;

    /// Add a member and bump `member_count`
    async fn add_member(&self, group_id: i64, user_id: i64, role: GroupMemberRole) -> Result<GroupMember>;

    /// Remove a member and decrement `member_count`
    async fn remove_member(&self, group_id: i64, user_id: i64) -> Result<()>;

    async fn list_members(&self, group_id: i64, params: &ListParams) -> Result<(Vec<GroupMember>, i64)>;

    async fn count_admins(&self, group_id: i64) -> Result<i64>;
}

pub struct SqlxGroupRepository {
    pool: DynDatabasePool,
}

impl SqlxGroupRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn GroupRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl GroupRepository for SqlxGroupRepository {
    async fn create(&self, group: &Group) -> Result<Group> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                INSERT INTO tango_groups (name, slug, description, group_type, city, country,
                    created_by, member_count, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
                "#,
            )
            .bind(&group.name)
            .bind(&group.slug)
            .bind(&group.description)
            .bind(group.group_type.as_str())
            .bind(&group.city)
            .bind(&group.country)
            .bind(group.created_by)
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create group")?
            .last_id()
        });

        Ok(Group {
            id,
            member_count: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            ..group.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Group>> {
        let sql = format!(
            "SELECT {} FROM tango_groups WHERE id = ? AND deleted_at IS NULL",
            GROUP_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Group>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get group")
        })
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let count = with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tango_groups WHERE slug = ?")
                .bind(slug)
                .fetch_one(conn)
                .await
                .context("Failed to check group slug")?
        });
        Ok(count > 0)
    }

    async fn update(&self, group: &Group) -> Result<Group> {
        with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                UPDATE tango_groups SET name = ?, description = ?, group_type = ?, city = ?, country = ?, updated_at = ?
                WHERE id = ? AND deleted_at IS NULL
                "#,
            )
            .bind(&group.name)
            .bind(&group.description)
            .bind(group.group_type.as_str())
            .bind(&group.city)
            .bind(&group.country)
            .bind(Utc::now())
            .bind(group.id)
            .execute(conn)
            .await
            .context("Failed to update group")?;
        });
        self.get_by_id(group.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Group not found after update"))
    }

    async fn soft_delete(&self, id: i64) -> Result<()> {
        let now = Utc::now();
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE tango_groups SET deleted_at = ?, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete group")?;
        });
        Ok(())
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<Group>, i64)> {
        let sql = format!(
            "SELECT {} FROM tango_groups WHERE deleted_at IS NULL ORDER BY member_count DESC, id ASC LIMIT ? OFFSET ?",
            GROUP_COLUMNS
        );
        let groups = with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Group>(&sql)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list groups")?
        });
        Ok((groups, self.count().await?))
    }

    async fn search(&self, query: &str, params: &ListParams) -> Result<(Vec<Group>, i64)> {
        let pattern = like_pattern(query);
        let where_sql = "deleted_at IS NULL AND (LOWER(name) LIKE ? ESCAPE '!' \
             OR LOWER(description) LIKE ? ESCAPE '!' OR LOWER(COALESCE(city, '')) LIKE ? ESCAPE '!')";
        let sql = format!(
            "SELECT {} FROM tango_groups WHERE {} ORDER BY member_count DESC, id ASC LIMIT ? OFFSET ?",
            GROUP_COLUMNS, where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM tango_groups WHERE {}", where_sql);

        with_driver!(self.pool, conn => {
            let groups = sqlx::query_as::<_, Group>(&sql)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to search groups")?;
            let total = sqlx::query_scalar::<_, i64>(&count_sql)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .fetch_one(conn)
                .await
                .context("Failed to count group search results")?;
            Ok((groups, total))
        })
    }

    async fn count(&self) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tango_groups WHERE deleted_at IS NULL")
                .fetch_one(conn)
                .await
                .context("Failed to count groups")
        })
    }

    async fn count_created_by(&self, user_id: i64) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM tango_groups WHERE created_by = ? AND deleted_at IS NULL",
            )
            .bind(user_id)
            .fetch_one(conn)
            .await
            .context("Failed to count groups by creator")
        })
    }

    async fn get_member(&self, group_id: i64, user_id: i64) -> Result<Option<GroupMember>> {
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, GroupMember>(
                "SELECT id, group_id, user_id, role, joined_at FROM group_members WHERE group_id = ? AND user_id = ?",
            )
            .bind(group_id)
            .bind(user_id)
            .fetch_optional(conn)
            .await
            .context("Failed to get group member")
        })
    }

    async fn add_member(&self, group_id: i64, user_id: i64, role: GroupMemberRole) -> Result<GroupMember> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            let id = sqlx::query("INSERT INTO group_members (group_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)")
                .bind(group_id)
                .bind(user_id)
                .bind(role.as_str())
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to add group member")?
                .last_id();
            sqlx::query("UPDATE tango_groups SET member_count = member_count + 1 WHERE id = ?")
                .bind(group_id)
                .execute(conn)
                .await
                .context("Failed to update member count")?;
            id
        });

        Ok(GroupMember {
            id,
            group_id,
            user_id,
            role,
            joined_at: now,
        })
    }

    async fn remove_member(&self, group_id: i64, user_id: i64) -> Result<()> {
        with_driver!(self.pool, conn => {
            let removed = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
                .bind(group_id)
                .bind(user_id)
                .execute(conn)
                .await
                .context("Failed to remove group member")?
                .rows_affected();
            if removed > 0 {
                sqlx::query(
                    "UPDATE tango_groups SET member_count = CASE WHEN member_count > 0 THEN member_count - 1 ELSE 0 END WHERE id = ?",
                )
                .bind(group_id)
                .execute(conn)
                .await
                .context("Failed to update member count")?;
            }
        });
        Ok(())
    }

    async fn list_members(&self, group_id: i64, params: &ListParams) -> Result<(Vec<GroupMember>, i64)> {
        with_driver!(self.pool, conn => {
            let members = sqlx::query_as::<_, GroupMember>(
                "SELECT id, group_id, user_id, role, joined_at FROM group_members WHERE group_id = ? ORDER BY id ASC LIMIT ? OFFSET ?",
            )
            .bind(group_id)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(conn)
            .await
            .context("Failed to list group members")?;
            let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM group_members WHERE group_id = ?")
                .bind(group_id)
                .fetch_one(conn)
                .await
                .context("Failed to count group members")?;
            Ok((members, total))
        })
    }

    async fn count_admins(&self, group_id: i64) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM group_members WHERE group_id = ? AND role = 'admin'",
            )
            .bind(group_id)
            .fetch_one(conn)
            .await
            .context("Failed to count group admins")
        })
    }
}
