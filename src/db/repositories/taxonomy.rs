//! Activity and report type taxonomies
//!
//! Both are small self-referencing trees loaded whole and assembled in memory.

use crate::db::{with_driver, DynDatabasePool, LastInsertId};
use crate::models::{Activity, ReportType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Activity>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Activity>>;

    async fn create(&self, name: &str, parent_id: Option<i64>, icon: Option<&str>) -> Result<Activity>;
}

#[async_trait]
pub trait ReportTypeRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<ReportType>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<ReportType>>;

    async fn create(&self, name: &str, parent_id: Option<i64>) -> Result<ReportType>;
}

pub struct SqlxActivityRepository {
    pool: DynDatabasePool,
}

impl SqlxActivityRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ActivityRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ActivityRepository for SqlxActivityRepository {
    async fn list(&self) -> Result<Vec<Activity>> {
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Activity>(
                "SELECT id, parent_id, name, icon, created_at, updated_at FROM activities ORDER BY name ASC",
            )
            .fetch_all(conn)
            .await
            .context("Failed to list activities")
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Activity>> {
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Activity>(
                "SELECT id, parent_id, name, icon, created_at, updated_at FROM activities WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(conn)
            .await
            .context("Failed to get activity")
        })
    }

    async fn create(&self, name: &str, parent_id: Option<i64>, icon: Option<&str>) -> Result<Activity> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            sqlx::query("INSERT INTO activities (parent_id, name, icon, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
                .bind(parent_id)
                .bind(name)
                .bind(icon)
                .bind(now)
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to create activity")?
                .last_id()
        });
        Ok(Activity {
            id,
            parent_id,
            name: name.to_string(),
            icon: icon.map(str::to_string),
            created_at: now,
            updated_at: now,
        })
    }
}

pub struct SqlxReportTypeRepository {
    pool: DynDatabasePool,
}

impl SqlxReportTypeRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ReportTypeRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ReportTypeRepository for SqlxReportTypeRepository {
    async fn list(&self) -> Result<Vec<ReportType>> {
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, ReportType>(
                "SELECT id, parent_id, name, created_at, updated_at FROM report_types ORDER BY id ASC",
            )
            .fetch_all(conn)
            .await
            .context("Failed to list report types")
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ReportType>> {
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, ReportType>(
                "SELECT id, parent_id, name, created_at, updated_at FROM report_types WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(conn)
            .await
            .context("Failed to get report type")
        })
    }

    async fn create(&self, name: &str, parent_id: Option<i64>) -> Result<ReportType> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            sqlx::query("INSERT INTO report_types (parent_id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
                .bind(parent_id)
                .bind(name)
                .bind(now)
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to create report type")?
                .last_id()
        });
        Ok(ReportType {
            id,
            parent_id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        })
    }
}
