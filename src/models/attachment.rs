//! Uploaded media attached (polymorphically) to posts, events, messages...

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attachment {
    pub id: i64,
    /// Uploader
    pub user_id: i64,
    pub target_type: Option<String>,
    pub target_id: Option<i64>,
    pub file_name: String,
    /// Public URL under `/uploads`
    pub url: String,
    pub mime_type: String,
    pub size: i64,
    /// SHA-256, hex encoded
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

string_enum! {
    /// Entities media can be attached to
    pub enum AttachmentTarget {
        Post => "post",
        Event => "event",
        Group => "group",
        Housing => "housing",
        Message => "message",
        User => "user",
    }
}

#[derive(Debug, Clone)]
pub struct CreateAttachmentInput {
    pub user_id: i64,
    pub target: Option<(AttachmentTarget, i64)>,
    pub file_name: String,
    pub url: String,
    pub mime_type: String,
    pub size: i64,
    pub checksum: String,
}

/// Progress of a chunked upload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkStatus {
    pub upload_id: String,
    /// Indices of the parts already on disk, ascending
    pub received: Vec<u32>,
    pub total_chunks: Option<u32>,
    pub complete: bool,
}
