//! Moderation report repository

use crate::db::{with_driver, DynDatabasePool, LastInsertId};
use crate::models::{ListParams, Report, ReportStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const REPORT_COLUMNS: &str = "id, reporter_id, report_type_id, target_type, target_id, description, \
     status, resolved_by, created_at, updated_at";

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn create(&self, report: &Report) -> Result<Report>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Report>>;

    /// Moderation queue, optionally narrowed to one status
    async fn list(&self, status: Option<ReportStatus>, params: &ListParams) -> Result<(Vec<Report>, i64)>;

    async fn set_status(&self, id: i64, status: ReportStatus, resolved_by: Option<i64>) -> Result<()>;

    async fn count_open(&self) -> Result<i64>;
}

pub struct SqlxReportRepository {
    pool: DynDatabasePool,
}

impl SqlxReportRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ReportRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ReportRepository for SqlxReportRepository {
    async fn create(&self, report: &Report) -> Result<Report> {
        let now = Utc::now();
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                INSERT INTO reports (reporter_id, report_type_id, target_type, target_id, description,
                    status, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(report.reporter_id)
            .bind(report.report_type_id)
            .bind(report.target_type.as_str())
            .bind(report.target_id)
            .bind(&report.description)
            .bind(report.status.as_str())
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create report")?
            .last_id()
        });

        Ok(Report {
            id,
            resolved_by: None,
            created_at: now,
            updated_at: now,
            ..report.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Report>> {
        let sql = format!("SELECT {} FROM reports WHERE id = ?", REPORT_COLUMNS);
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Report>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get report")
        })
    }

    async fn list(&self, status: Option<ReportStatus>, params: &ListParams) -> Result<(Vec<Report>, i64)> {
        let where_sql = if status.is_some() { "status = ?" } else { "1 = 1" };
        let sql = format!(
            "SELECT {} FROM reports WHERE {} ORDER BY id DESC LIMIT ? OFFSET ?",
            REPORT_COLUMNS, where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM reports WHERE {}", where_sql);

        with_driver!(self.pool, conn => {
            let mut query = sqlx::query_as::<_, Report>(&sql);
            let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
            if let Some(status) = status {
                query = query.bind(status.as_str());
                count = count.bind(status.as_str());
            }
            let reports = query
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list reports")?;
            let total = count.fetch_one(conn).await.context("Failed to count reports")?;
            Ok((reports, total))
        })
    }

    async fn set_status(&self, id: i64, status: ReportStatus, resolved_by: Option<i64>) -> Result<()> {
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE reports SET status = ?, resolved_by = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(resolved_by)
                .bind(Utc::now())
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to update report")?;
        });
        Ok(())
    }

    async fn count_open(&self) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reports WHERE status = 'open'")
                .fetch_one(conn)
                .await
                .context("Failed to count open reports")
        })
    }
}
