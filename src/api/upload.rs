//! Upload API endpoints
//!
//! - POST /api/v1/uploads - single multipart file (`file` field)
//! - POST /api/v1/uploads/chunks - one part of a chunked upload
//! - GET /api/v1/uploads/chunks/{upload_id} - parts received so far
//! - POST /api/v1/uploads/chunks/{upload_id}/complete - reassemble
//! - GET /api/v1/attachments?target_type=&target_id= - files of a target
//! - PUT /api/v1/attachments/{id}/target, DELETE /api/v1/attachments/{id}
//!
//! File bodies are streamed straight to disk; nothing buffers a whole file.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use futures::TryStreamExt;
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Attachment, AttachmentTarget, ChunkStatus};
use crate::services::upload::ChunkMeta;

/// Room for multipart boundaries and the small text fields
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Optional polymorphic owner of an upload
#[derive(Debug, Default, Deserialize)]
pub struct TargetQuery {
    pub target_type: Option<AttachmentTarget>,
    pub target_id: Option<i64>,
}

impl TargetQuery {
    fn target(&self) -> Result<Option<(AttachmentTarget, i64)>, ApiError> {
        match (self.target_type, self.target_id) {
            (Some(t), Some(id)) => Ok(Some((t, id))),
            (None, None) => Ok(None),
            _ => Err(ApiError::validation_error(
                "target_type and target_id must be given together",
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AttachRequest {
    pub target_type: AttachmentTarget,
    pub target_id: i64,
}

/// Build the upload router; body limits follow the upload configuration
pub fn router(state: &AppState) -> Router<AppState> {
    let config = state.upload_service.config();
    let file_limit = (config.max_file_size + MULTIPART_OVERHEAD) as usize;
    let chunk_limit = (config.max_chunk_size + MULTIPART_OVERHEAD) as usize;

    Router::new()
        .route(
            "/uploads",
            post(upload_file).layer(DefaultBodyLimit::max(file_limit)),
        )
        .route(
            "/uploads/chunks",
            post(upload_chunk).layer(DefaultBodyLimit::max(chunk_limit)),
        )
        .route("/uploads/chunks/{upload_id}", get(chunk_status))
        .route("/uploads/chunks/{upload_id}/complete", post(complete_chunks))
        .route("/attachments", get(list_attachments))
        .route("/attachments/{id}/target", put(attach))
        .route("/attachments/{id}", delete(delete_attachment))
}

/// POST /api/v1/uploads - Upload a single image or video
async fn upload_file(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<TargetQuery>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let target = query.target()?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let stats = state.request_stats.clone();
        let body = field.inspect_ok(move |bytes| stats.record_upload(bytes.len() as u64));

        let attachment = state
            .upload_service
            .store(&user, &file_name, &content_type, body, target)
            .await?;
        return Ok((StatusCode::CREATED, Json(attachment)));
    }

    Err(ApiError::validation_error("No file provided"))
}

/// POST /api/v1/uploads/chunks - Store one part
///
/// Text fields `upload_id`, `chunk_index`, `total_chunks` and `file_name`
/// must precede the `file` field.
async fn upload_chunk(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Json<ChunkStatus>, ApiError> {
    let mut form = ChunkForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let meta = form.meta()?;
            let mime = field.content_type().map(str::to_string);
            let stats = state.request_stats.clone();
            let body = field.inspect_ok(move |bytes| stats.record_upload(bytes.len() as u64));
            let status = state
                .upload_service
                .write_chunk(&user, &meta, mime.as_deref(), body)
                .await?;
            return Ok(Json(status));
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read field {}: {}", name, e)))?;
        form.set(&name, value)?;
    }

    Err(ApiError::validation_error("No file provided"))
}

/// GET /api/v1/uploads/chunks/{upload_id}
async fn chunk_status(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(upload_id): Path<String>,
) -> Result<Json<ChunkStatus>, ApiError> {
    Ok(Json(state.upload_service.status(&user, &upload_id).await?))
}

/// POST /api/v1/uploads/chunks/{upload_id}/complete
async fn complete_chunks(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(upload_id): Path<String>,
    Query(query): Query<TargetQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let attachment = state
        .upload_service
        .complete(&user, &upload_id, query.target()?)
        .await?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

/// GET /api/v1/attachments?target_type=&target_id=
async fn list_attachments(
    State(state): State<AppState>,
    Query(query): Query<TargetQuery>,
) -> Result<Json<Vec<Attachment>>, ApiError> {
    let (target, target_id) = query
        .target()?
        .ok_or_else(|| ApiError::validation_error("target_type and target_id are required"))?;
    Ok(Json(state.upload_service.list_for(target, target_id).await?))
}

/// PUT /api/v1/attachments/{id}/target
async fn attach(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<AttachRequest>,
) -> Result<Json<Attachment>, ApiError> {
    Ok(Json(
        state
            .upload_service
            .attach(&user, id, body.target_type, body.target_id)
            .await?,
    ))
}

/// DELETE /api/v1/attachments/{id}
async fn delete_attachment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.upload_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Text fields of a chunk request collected before the file part
#[derive(Debug, Default)]
struct ChunkForm {
    upload_id: Option<String>,
    chunk_index: Option<u32>,
    total_chunks: Option<u32>,
    file_name: Option<String>,
}

impl ChunkForm {
    fn set(&mut self, name: &str, value: String) -> Result<(), ApiError> {
        let number = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| ApiError::validation_error(format!("{} must be a non-negative integer", name)))
        };
        match name {
            "upload_id" => self.upload_id = Some(value.trim().to_string()),
            "chunk_index" => self.chunk_index = Some(number(&value)?),
            "total_chunks" => self.total_chunks = Some(number(&value)?),
            "file_name" => self.file_name = Some(value),
            _ => {}
        }
        Ok(())
    }

    fn meta(&self) -> Result<ChunkMeta, ApiError> {
        let missing = |field: &str| {
            ApiError::validation_error(format!("{} must be sent before the file field", field))
        };
        Ok(ChunkMeta {
            upload_id: self.upload_id.clone().ok_or_else(|| missing("upload_id"))?,
            chunk_index: self.chunk_index.ok_or_else(|| missing("chunk_index"))?,
            total_chunks: self.total_chunks.ok_or_else(|| missing("total_chunks"))?,
            file_name: self.file_name.clone().ok_or_else(|| missing("file_name"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_form_requires_every_field() {
        let mut form = ChunkForm::default();
        form.set("upload_id", "0b6c4c6e-8d5e-4a57-9a1e-2f7d1f0e9c11".into()).unwrap();
        form.set("chunk_index", "0".into()).unwrap();
        form.set("total_chunks", "3".into()).unwrap();
        assert!(form.meta().is_err());

        form.set("file_name", "milonga.mp4".into()).unwrap();
        let meta = form.meta().unwrap();
        assert_eq!(meta.chunk_index, 0);
        assert_eq!(meta.total_chunks, 3);
    }

    #[test]
    fn test_chunk_form_rejects_bad_numbers() {
        let mut form = ChunkForm::default();
        assert!(form.set("chunk_index", "-1".into()).is_err());
        assert!(form.set("total_chunks", "many".into()).is_err());
        // unknown fields are ignored
        assert!(form.set("checksum", "abc".into()).is_ok());
    }

    #[test]
    fn test_target_query_pairs() {
        let none = TargetQuery::default();
        assert!(none.target().unwrap().is_none());

        let half = TargetQuery {
            target_type: Some(AttachmentTarget::Post),
            target_id: None,
        };
        assert!(half.target().is_err());

        let full = TargetQuery {
            target_type: Some(AttachmentTarget::Post),
            target_id: Some(4),
        };
        assert_eq!(full.target().unwrap(), Some((AttachmentTarget::Post, 4)));
    }
}
