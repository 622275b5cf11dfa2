//! Attachment repository

use crate::db::{with_driver, DynDatabasePool, LastInsertId};
use crate::models::{Attachment, AttachmentTarget, CreateAttachmentInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const ATTACHMENT_COLUMNS: &str = "id, user_id, target_type, target_id, file_name, url, mime_type, \
     size, checksum, created_at, deleted_at";

#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    async fn create(&self, input: &CreateAttachmentInput) -> Result<Attachment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Attachment>>;

    /// Point an existing upload at an entity
    async fn attach(&self, id: i64, target: AttachmentTarget, target_id: i64) -> Result<()>;

    async fn list_by_target(&self, target: AttachmentTarget, target_id: i64) -> Result<Vec<Attachment>>;

    async fn soft_delete(&self, id: i64) -> Result<()>;

    /// Total bytes of live uploads
    async fn total_size(&self) -> Result<i64>;
}

pub struct SqlxAttachmentRepository {
    pool: DynDatabasePool,
}

impl SqlxAttachmentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AttachmentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AttachmentRepository for SqlxAttachmentRepository {
    async fn create(&self, input: &CreateAttachmentInput) -> Result<Attachment> {
        let now = Utc::now();
        let target_type = input.target.map(|(t, _)| t.as_str().to_string());
        let target_id = input.target.map(|(_, id)| id);
        let id = with_driver!(self.pool, conn => {
            sqlx::query(
                r#"
                INSERT INTO attachments (user_id, target_type, target_id, file_name, url, mime_type,
                    size, checksum, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(input.user_id)
            .bind(&target_type)
            .bind(target_id)
            .bind(&input.file_name)
            .bind(&input.url)
            .bind(&input.mime_type)
            .bind(input.size)
            .bind(&input.checksum)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create attachment")?
            .last_id()
        });

        Ok(Attachment {
            id,
            user_id: input.user_id,
            target_type,
            target_id,
            file_name: input.file_name.clone(),
            url: input.url.clone(),
            mime_type: input.mime_type.clone(),
            size: input.size,
            checksum: input.checksum.clone(),
            created_at: now,
            deleted_at: None,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Attachment>> {
        let sql = format!(
            "SELECT {} FROM attachments WHERE id = ? AND deleted_at IS NULL",
            ATTACHMENT_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Attachment>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get attachment")
        })
    }

    async fn attach(&self, id: i64, target: AttachmentTarget, target_id: i64) -> Result<()> {
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE attachments SET target_type = ?, target_id = ? WHERE id = ?")
                .bind(target.as_str())
                .bind(target_id)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to attach upload")?;
        });
        Ok(())
    }

    async fn list_by_target(&self, target: AttachmentTarget, target_id: i64) -> Result<Vec<Attachment>> {
        let sql = format!(
            "SELECT {} FROM attachments WHERE target_type = ? AND target_id = ? AND deleted_at IS NULL ORDER BY id ASC",
            ATTACHMENT_COLUMNS
        );
        with_driver!(self.pool, conn => {
            sqlx::query_as::<_, Attachment>(&sql)
                .bind(target.as_str())
                .bind(target_id)
                .fetch_all(conn)
                .await
                .context("Failed to list attachments")
        })
    }

    async fn soft_delete(&self, id: i64) -> Result<()> {
        with_driver!(self.pool, conn => {
            sqlx::query("UPDATE attachments SET deleted_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete attachment")?;
        });
        Ok(())
    }

    async fn total_size(&self) -> Result<i64> {
        with_driver!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT CAST(COALESCE(SUM(size), 0) AS SIGNED) FROM attachments WHERE deleted_at IS NULL",
            )
            .fetch_one(conn)
            .await
            .context("Failed to sum attachment sizes")
        })
    }
}
