//! Media uploads
//!
//! Single-request uploads are streamed straight to `upload.path`. Large
//! videos arrive as numbered parts under `chunk_path/<upload_id>/`, which
//! `complete` stitches together with a fixed-size buffer. Both paths hash
//! the bytes as they are written, so a file is never held in memory.

use data_encoding::HEXLOWER;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::db::repositories::AttachmentRepository;
use crate::models::{Attachment, AttachmentTarget, ChunkStatus, CreateAttachmentInput, User};
use crate::services::error::{found, ServiceError, ServiceResult};

const MANIFEST_FILE: &str = "manifest.json";
const PART_SUFFIX: &str = ".part";
const COPY_BUFFER_SIZE: usize = 64 * 1024;
const MAX_TOTAL_CHUNKS: u32 = 10_000;
const MAX_FILE_NAME_CHARS: usize = 200;

/// Form fields that accompany each part of a chunked upload
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkMeta {
    pub upload_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub file_name: String,
}

/// Written next to the parts by the first chunk that arrives
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    user_id: i64,
    file_name: String,
    mime_type: String,
    total_chunks: u32,
}

pub struct UploadService {
    repo: Arc<dyn AttachmentRepository>,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(repo: Arc<dyn AttachmentRepository>, config: UploadConfig) -> Self {
        Self { repo, config }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Stream one file to disk and record it
    pub async fn store<S, B, E>(
        &self,
        user: &User,
        file_name: &str,
        mime_type: &str,
        body: S,
        target: Option<(AttachmentTarget, i64)>,
    ) -> ServiceResult<Attachment>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        self.check_type(mime_type)?;
        let file_name = clean_file_name(file_name);
        fs::create_dir_all(&self.config.path).await?;

        let stored_name = format!("{}.{}", Uuid::new_v4(), self.config.get_extension(mime_type));
        let dest = self.config.path.join(&stored_name);
        let (size, checksum) = write_stream(body, &dest, self.config.max_file_size).await?;
        if size == 0 {
            let _ = fs::remove_file(&dest).await;
            return Err(ServiceError::validation("Uploaded file is empty"));
        }

        self.record(user, file_name, stored_name, mime_type, size, checksum, target).await
    }

    /// Store one part of a chunked upload
    pub async fn write_chunk<S, B, E>(
        &self,
        user: &User,
        meta: &ChunkMeta,
        mime_type: Option<&str>,
        body: S,
    ) -> ServiceResult<ChunkStatus>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let upload_id = parse_upload_id(&meta.upload_id)?;
        if meta.total_chunks == 0 || meta.total_chunks > MAX_TOTAL_CHUNKS {
            return Err(ServiceError::validation(format!(
                "total_chunks must be between 1 and {}",
                MAX_TOTAL_CHUNKS
            )));
        }
        if meta.chunk_index >= meta.total_chunks {
            return Err(ServiceError::validation("chunk_index is out of range"));
        }

        let dir = self.chunk_dir(&upload_id);
        fs::create_dir_all(&dir).await?;

        match read_manifest(&dir).await? {
            Some(manifest) => {
                if manifest.user_id != user.id {
                    return Err(ServiceError::forbidden("This upload belongs to someone else"));
                }
                if manifest.total_chunks != meta.total_chunks {
                    return Err(ServiceError::validation("total_chunks changed mid-upload"));
                }
            }
            None => {
                let file_name = clean_file_name(&meta.file_name);
                let mime_type = mime_type
                    .filter(|m| *m != "application/octet-stream")
                    .map(str::to_string)
                    .unwrap_or_else(|| mime_from_name(&file_name).to_string());
                self.check_type(&mime_type)?;
                let manifest = Manifest {
                    user_id: user.id,
                    file_name,
                    mime_type,
                    total_chunks: meta.total_chunks,
                };
                let json = serde_json::to_vec(&manifest).map_err(anyhow::Error::from)?;
                fs::write(dir.join(MANIFEST_FILE), json).await?;
            }
        }

        // parts land under a temporary name so a half-written part never counts
        let part = dir.join(format!("{}{}", meta.chunk_index, PART_SUFFIX));
        let tmp = dir.join(format!("{}{}.tmp", meta.chunk_index, PART_SUFFIX));
        write_stream(body, &tmp, self.config.max_chunk_size).await?;
        fs::rename(&tmp, &part).await?;

        tracing::debug!(
            upload_id = %upload_id,
            chunk = meta.chunk_index,
            total = meta.total_chunks,
            "Stored upload chunk"
        );
        self.status(user, &meta.upload_id).await
    }

    /// Which parts of a chunked upload have arrived
    pub async fn status(&self, user: &User, upload_id: &str) -> ServiceResult<ChunkStatus> {
        let upload_id = parse_upload_id(upload_id)?;
        let dir = self.chunk_dir(&upload_id);
        let manifest = found(read_manifest(&dir).await?, "Upload")?;
        if manifest.user_id != user.id {
            return Err(ServiceError::forbidden("This upload belongs to someone else"));
        }

        let received = received_parts(&dir).await?;
        let complete = received.len() as u32 == manifest.total_chunks;
        Ok(ChunkStatus {
            upload_id: upload_id.to_string(),
            received,
            total_chunks: Some(manifest.total_chunks),
            complete,
        })
    }

    /// Reassemble a finished chunked upload into a single attachment
    pub async fn complete(
        &self,
        user: &User,
        upload_id: &str,
        target: Option<(AttachmentTarget, i64)>,
    ) -> ServiceResult<Attachment> {
        let id = parse_upload_id(upload_id)?;
        let dir = self.chunk_dir(&id);
        let manifest = found(read_manifest(&dir).await?, "Upload")?;
        if manifest.user_id != user.id {
            return Err(ServiceError::forbidden("This upload belongs to someone else"));
        }

        let received = received_parts(&dir).await?;
        let missing: Vec<u32> = (0..manifest.total_chunks)
            .filter(|i| received.binary_search(i).is_err())
            .collect();
        if !missing.is_empty() {
            return Err(ServiceError::InvalidUpload(format!("Missing chunks: {:?}", missing)));
        }

        fs::create_dir_all(&self.config.path).await?;
        let stored_name = format!(
            "{}.{}",
            Uuid::new_v4(),
            self.config.get_extension(&manifest.mime_type)
        );
        let dest = self.config.path.join(&stored_name);

        let assembled = assemble(&dir, manifest.total_chunks, &dest, self.config.max_video_size).await;
        let (size, checksum) = match assembled {
            Ok(done) => done,
            Err(e) => {
                let _ = fs::remove_file(&dest).await;
                return Err(e);
            }
        };
        if let Err(e) = fs::remove_dir_all(&dir).await {
            tracing::warn!(upload_id = %id, "Failed to remove upload parts: {}", e);
        }
        tracing::info!(upload_id = %id, size, "Chunked upload assembled");

        self.record(
            user,
            manifest.file_name,
            stored_name,
            &manifest.mime_type,
            size,
            checksum,
            target,
        )
        .await
    }

    /// Delete part directories untouched for longer than `stale_upload_hours`
    pub async fn purge_stale(&self) -> ServiceResult<usize> {
        let max_age = Duration::from_secs(self.config.stale_upload_hours * 3600);
        let mut entries = match fs::read_dir(&self.config.chunk_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut purged = 0;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age > max_age {
                fs::remove_dir_all(entry.path()).await?;
                purged += 1;
            }
        }
        if purged > 0 {
            tracing::info!(purged, "Purged stale chunked uploads");
        }
        Ok(purged)
    }

    /// Link an existing upload to an entity
    pub async fn attach(
        &self,
        user: &User,
        attachment_id: i64,
        target: AttachmentTarget,
        target_id: i64,
    ) -> ServiceResult<Attachment> {
        let attachment = found(self.repo.get_by_id(attachment_id).await?, "Attachment")?;
        if !user.can_moderate(attachment.user_id) {
            return Err(ServiceError::forbidden("You cannot attach this file"));
        }
        self.repo.attach(attachment_id, target, target_id).await?;
        found(self.repo.get_by_id(attachment_id).await?, "Attachment")
    }

    pub async fn list_for(&self, target: AttachmentTarget, target_id: i64) -> ServiceResult<Vec<Attachment>> {
        Ok(self.repo.list_by_target(target, target_id).await?)
    }

    pub async fn delete(&self, user: &User, attachment_id: i64) -> ServiceResult<()> {
        let attachment = found(self.repo.get_by_id(attachment_id).await?, "Attachment")?;
        if !user.can_moderate(attachment.user_id) {
            return Err(ServiceError::forbidden("You cannot delete this file"));
        }
        self.repo.soft_delete(attachment_id).await?;
        Ok(())
    }

    /// Bytes stored across live attachments
    pub async fn total_size(&self) -> ServiceResult<i64> {
        Ok(self.repo.total_size().await?)
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        user: &User,
        file_name: String,
        stored_name: String,
        mime_type: &str,
        size: u64,
        checksum: String,
        target: Option<(AttachmentTarget, i64)>,
    ) -> ServiceResult<Attachment> {
        let input = CreateAttachmentInput {
            user_id: user.id,
            target,
            file_name,
            url: format!("/uploads/{}", stored_name),
            mime_type: mime_type.to_string(),
            size: size as i64,
            checksum,
        };
        let attachment = self.repo.create(&input).await?;
        tracing::info!(
            attachment_id = attachment.id,
            user_id = user.id,
            size,
            mime = %attachment.mime_type,
            "Upload stored"
        );
        Ok(attachment)
    }

    fn check_type(&self, mime_type: &str) -> ServiceResult<()> {
        if self.config.is_type_allowed(mime_type) {
            Ok(())
        } else {
            Err(ServiceError::InvalidUpload(format!(
                "File type {} is not allowed",
                mime_type
            )))
        }
    }

    fn chunk_dir(&self, upload_id: &Uuid) -> PathBuf {
        self.config.chunk_path.join(upload_id.to_string())
    }
}

/// Write a byte stream to `dest`, hashing as it goes. The file is removed
/// when the stream fails, a write fails or the body grows past `limit`.
async fn write_stream<S, B, E>(body: S, dest: &Path, limit: u64) -> ServiceResult<(u64, String)>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let result = copy_stream(body, dest, limit).await;
    if result.is_err() {
        if let Err(e) = fs::remove_file(dest).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %dest.display(), "Failed to remove partial upload: {}", e);
            }
        }
    }
    result
}

async fn copy_stream<S, B, E>(body: S, dest: &Path, limit: u64) -> ServiceResult<(u64, String)>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut body = std::pin::pin!(body);
    let mut file = fs::File::create(dest).await?;
    let mut hasher = Sha256::new();
    let mut written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk =
            chunk.map_err(|e| ServiceError::validation(format!("Failed to read upload: {}", e)))?;
        let bytes = chunk.as_ref();
        written += bytes.len() as u64;
        if written > limit {
            return Err(ServiceError::PayloadTooLarge(format!(
                "Maximum size is {} bytes",
                limit
            )));
        }
        hasher.update(bytes);
        file.write_all(bytes).await?;
    }
    file.flush().await?;

    Ok((written, HEXLOWER.encode(&hasher.finalize())))
}

/// Concatenate `0.part .. n.part` into `dest` through a fixed buffer
async fn assemble(dir: &Path, total_chunks: u32, dest: &Path, limit: u64) -> ServiceResult<(u64, String)> {
    let mut out = fs::File::create(dest).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut written: u64 = 0;

    for index in 0..total_chunks {
        let mut part = fs::File::open(dir.join(format!("{}{}", index, PART_SUFFIX))).await?;
        loop {
            let n = part.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            written += n as u64;
            if written > limit {
                return Err(ServiceError::PayloadTooLarge(format!(
                    "Maximum video size is {} bytes",
                    limit
                )));
            }
            hasher.update(&buffer[..n]);
            out.write_all(&buffer[..n]).await?;
        }
    }
    out.flush().await?;

    Ok((written, HEXLOWER.encode(&hasher.finalize())))
}

async fn read_manifest(dir: &Path) -> ServiceResult<Option<Manifest>> {
    match fs::read(dir.join(MANIFEST_FILE)).await {
        Ok(bytes) => {
            let manifest = serde_json::from_slice(&bytes).map_err(anyhow::Error::from)?;
            Ok(Some(manifest))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Indices of complete parts in `dir`, ascending
async fn received_parts(dir: &Path) -> ServiceResult<Vec<u32>> {
    let mut received = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some(index) = name
            .to_str()
            .and_then(|n| n.strip_suffix(PART_SUFFIX))
            .and_then(|n| n.parse::<u32>().ok())
        {
            received.push(index);
        }
    }
    received.sort_unstable();
    Ok(received)
}

/// Upload ids are client-generated UUIDs; anything else could escape `chunk_path`
fn parse_upload_id(raw: &str) -> ServiceResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| ServiceError::validation("upload_id must be a UUID"))
}

/// Keep only the final path component and cap its length
fn clean_file_name(name: &str) -> String {
    let base = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();
    let base: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILE_NAME_CHARS)
        .collect();
    if base.is_empty() {
        "upload".to_string()
    } else {
        base
    }
}

fn mime_from_name(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_test_pool;
    use crate::db::repositories::SqlxAttachmentRepository;
    use crate::services::test_support::insert_user;
    use futures::stream;
    use std::convert::Infallible;
    use tempfile::TempDir;

    async fn upload_service(limit: u64) -> (UploadService, TempDir, crate::db::DynDatabasePool) {
        let pool = migrated_test_pool().await;
        let dir = TempDir::new().unwrap();
        let config = UploadConfig {
            path: dir.path().join("files"),
            chunk_path: dir.path().join("chunks"),
            max_file_size: limit,
            max_chunk_size: limit,
            max_video_size: limit * 2,
            ..Default::default()
        };
        let service = UploadService::new(SqlxAttachmentRepository::boxed(pool.clone()), config);
        (service, dir, pool)
    }

    fn body(parts: &[&'static str]) -> impl Stream<Item = Result<&'static [u8], Infallible>> {
        let parts: Vec<Result<&'static [u8], Infallible>> = parts.iter().map(|p| Ok(p.as_bytes())).collect();
        stream::iter(parts)
    }

    fn sha256_hex(data: &[u8]) -> String {
        HEXLOWER.encode(&Sha256::digest(data))
    }

    fn meta(upload_id: &str, index: u32, total: u32) -> ChunkMeta {
        ChunkMeta {
            upload_id: upload_id.to_string(),
            chunk_index: index,
            total_chunks: total,
            file_name: "tanda.mp4".to_string(),
        }
    }

    #[tokio::test]
    async fn test_store_streams_and_hashes() {
        let (service, _dir, pool) = upload_service(1024).await;
        let ana = insert_user(&pool, "ana").await;

        let attachment = service
            .store(&ana, "../../etc/photo.jpg", "image/jpeg", body(&["abc", "def"]), None)
            .await
            .unwrap();
        assert_eq!(attachment.file_name, "photo.jpg");
        assert_eq!(attachment.size, 6);
        assert_eq!(attachment.checksum, sha256_hex(b"abcdef"));
        assert!(attachment.url.starts_with("/uploads/") && attachment.url.ends_with(".jpg"));

        let stored = service.config().path.join(attachment.url.trim_start_matches("/uploads/"));
        assert_eq!(fs::read(stored).await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_store_rejects_type_and_size() {
        let (service, _dir, pool) = upload_service(4).await;
        let ana = insert_user(&pool, "ana").await;

        let wrong = service.store(&ana, "x.exe", "application/x-msdownload", body(&["MZ"]), None).await;
        assert!(matches!(wrong, Err(ServiceError::InvalidUpload(_))));

        let big = service.store(&ana, "x.png", "image/png", body(&["abc", "de"]), None).await;
        assert!(matches!(big, Err(ServiceError::PayloadTooLarge(_))));
        // the partial file was removed
        let mut left = fs::read_dir(&service.config().path).await.unwrap();
        assert!(left.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_chunked_upload_out_of_order() {
        let (service, _dir, pool) = upload_service(1024).await;
        let ana = insert_user(&pool, "ana").await;
        let id = Uuid::new_v4().to_string();

        let status = service.write_chunk(&ana, &meta(&id, 2, 3), None, body(&["ghi"])).await.unwrap();
        assert_eq!(status.received, vec![2]);
        assert!(!status.complete);

        service.write_chunk(&ana, &meta(&id, 0, 3), None, body(&["abc"])).await.unwrap();
        let early = service.complete(&ana, &id, None).await;
        assert!(matches!(early, Err(ServiceError::InvalidUpload(_))));

        let status = service.write_chunk(&ana, &meta(&id, 1, 3), None, body(&["def"])).await.unwrap();
        assert!(status.complete);

        let attachment = service
            .complete(&ana, &id, Some((AttachmentTarget::Post, 9)))
            .await
            .unwrap();
        assert_eq!(attachment.mime_type, "video/mp4");
        assert_eq!(attachment.size, 9);
        assert_eq!(attachment.checksum, sha256_hex(b"abcdefghi"));
        assert_eq!(attachment.target_id, Some(9));

        // parts are gone once assembled
        assert!(matches!(service.status(&ana, &id).await, Err(ServiceError::NotFound(_))));
        assert_eq!(service.list_for(AttachmentTarget::Post, 9).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_chunk_guards() {
        let (service, _dir, pool) = upload_service(4).await;
        let ana = insert_user(&pool, "ana").await;
        let beto = insert_user(&pool, "beto").await;
        let id = Uuid::new_v4().to_string();

        let traversal = service.write_chunk(&ana, &meta("../../x", 0, 1), None, body(&["a"])).await;
        assert!(matches!(traversal, Err(ServiceError::Validation(_))));

        let out_of_range = service.write_chunk(&ana, &meta(&id, 3, 3), None, body(&["a"])).await;
        assert!(matches!(out_of_range, Err(ServiceError::Validation(_))));

        let too_big = service.write_chunk(&ana, &meta(&id, 0, 2), None, body(&["abcde"])).await;
        assert!(matches!(too_big, Err(ServiceError::PayloadTooLarge(_))));

        let foreign = service.write_chunk(&beto, &meta(&id, 1, 2), None, body(&["a"])).await;
        assert!(matches!(foreign, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_failed_chunk_leaves_no_temp_file() {
        let (service, _dir, pool) = upload_service(1024).await;
        let ana = insert_user(&pool, "ana").await;
        let id = Uuid::new_v4().to_string();

        let broken = stream::iter(vec![Ok(&b"abc"[..]), Err("connection reset")]);
        let result = service.write_chunk(&ana, &meta(&id, 0, 2), None, broken).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));

        let dir = service.config().chunk_path.join(&id);
        let mut entries = fs::read_dir(&dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().into_owned();
            assert!(!name.ends_with(".tmp"), "left behind {}", name);
        }
        assert!(service.status(&ana, &id).await.unwrap().received.is_empty());
    }

    #[tokio::test]
    async fn test_write_stream_removes_file_on_error() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("0.part.tmp");

        let broken = stream::iter(vec![Ok(&b"abc"[..]), Err("eof")]);
        assert!(write_stream(broken, &dest, 1024).await.is_err());
        assert!(!dest.exists());

        let (size, _) = write_stream(body(&["abc"]), &dest, 1024).await.unwrap();
        assert_eq!(size, 3);
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn test_assembled_size_is_capped() {
        let (service, _dir, pool) = upload_service(4).await;
        let ana = insert_user(&pool, "ana").await;
        let id = Uuid::new_v4().to_string();

        for index in 0..3 {
            service.write_chunk(&ana, &meta(&id, index, 3), None, body(&["abcd"])).await.unwrap();
        }
        // 12 bytes against an 8 byte video limit
        let result = service.complete(&ana, &id, None).await;
        assert!(matches!(result, Err(ServiceError::PayloadTooLarge(_))));
    }

    #[tokio::test]
    async fn test_purge_only_stale_dirs() {
        let (mut service, _dir, pool) = upload_service(1024).await;
        let ana = insert_user(&pool, "ana").await;
        let id = Uuid::new_v4().to_string();
        service.write_chunk(&ana, &meta(&id, 0, 2), None, body(&["abc"])).await.unwrap();

        assert_eq!(service.purge_stale().await.unwrap(), 0);
        service.config.stale_upload_hours = 0;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(service.purge_stale().await.unwrap(), 1);
        assert!(matches!(service.status(&ana, &id).await, Err(ServiceError::NotFound(_))));
    }

    #[test]
    fn test_clean_file_name() {
        assert_eq!(clean_file_name("C:\\Users\\ana\\clip.mov"), "clip.mov");
        assert_eq!(clean_file_name("   "), "upload");
        assert_eq!(mime_from_name("CLIP.MOV"), "video/quicktime");
    }
}
