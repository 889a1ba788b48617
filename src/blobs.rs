//! Opaque photo storage keyed by generated filename.
//!
//! Blobs live outside the relational model. Writes on a creation path are
//! fatal when they fail; deletes of replaced or orphaned blobs go through
//! [`discard`] and only log.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{AppError, AppResult};

const ALLOWED_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "gif"];

/// An uploaded file as received from a multipart form.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Validate and persist an upload. Returns the generated blob name.
    async fn put(&self, upload: PhotoUpload) -> AppResult<String>;

    /// Read a blob. `None` when absent or when `name` is not a plain blob name.
    async fn get(&self, name: &str) -> AppResult<Option<Vec<u8>>>;

    /// Remove a blob. Removing a missing blob succeeds.
    async fn delete(&self, name: &str) -> AppResult<()>;
}

/// Best-effort removal of a blob that is no longer referenced.
pub async fn discard(blobs: &dyn BlobStore, name: &str) {
    if let Err(e) = blobs.delete(name).await {
        tracing::warn!("Failed to delete blob {}: {}", name, e);
    }
}

/// Check type and size of an upload, returning the normalised extension.
/// Both the file extension and the declared MIME type must name an image
/// format we accept.
pub fn validate_photo(upload: &PhotoUpload, max_bytes: usize) -> AppResult<&'static str> {
    let ext = Path::new(&upload.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .and_then(|e| ALLOWED_EXTENSIONS.iter().copied().find(|allowed| *allowed == e))
        .ok_or_else(|| AppError::validation("Only image files are allowed!"))?;

    let mime_ok = upload
        .content_type
        .as_deref()
        .map(|ct| ct.to_ascii_lowercase())
        .and_then(|ct| ct.strip_prefix("image/").map(str::to_string))
        .is_some_and(|sub| ALLOWED_EXTENSIONS.contains(&sub.as_str()));
    if !mime_ok {
        return Err(AppError::validation("Only image files are allowed!"));
    }

    if upload.data.is_empty() {
        return Err(AppError::validation("Uploaded file is empty"));
    }
    if upload.data.len() > max_bytes {
        return Err(AppError::validation(format!(
            "File too large (max {} bytes)",
            max_bytes
        )));
    }

    Ok(ext)
}

/// A blob name we generated ourselves: no separators, no parent references.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

/// Filesystem-backed store rooted at the uploads directory.
pub struct LocalBlobStore {
    root: PathBuf,
    max_bytes: usize,
}

impl LocalBlobStore {
    pub fn open(root: PathBuf, max_bytes: usize) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, max_bytes })
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, upload: PhotoUpload) -> AppResult<String> {
        let ext = validate_photo(&upload, self.max_bytes)?;
        let name = format!("{}.{}", uuid::Uuid::now_v7(), ext);

        tokio::fs::write(self.root.join(&name), &upload.data)
            .await
            .map_err(|e| AppError::Storage(format!("write {}: {}", name, e)))?;

        tracing::debug!("Stored blob {} ({} bytes)", name, upload.data.len());
        Ok(name)
    }

    async fn get(&self, name: &str) -> AppResult<Option<Vec<u8>>> {
        if !is_plain_name(name) {
            return Ok(None);
        }
        match tokio::fs::read(self.root.join(name)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Storage(format!("read {}: {}", name, e))),
        }
    }

    async fn delete(&self, name: &str) -> AppResult<()> {
        if !is_plain_name(name) {
            return Ok(());
        }
        match tokio::fs::remove_file(self.root.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!("delete {}: {}", name, e))),
        }
    }
}

#[cfg(test)]
pub(crate) fn png(name: &str) -> PhotoUpload {
    PhotoUpload {
        file_name: name.to_string(),
        content_type: Some("image/png".to_string()),
        data: vec![0x89, b'P', b'N', b'G', 1, 2, 3],
    }
}
