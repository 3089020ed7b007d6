use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

use parley_types::models::{AttachmentCategory, AttachmentHandle};

/// 50 MB decoded size limit per attachment
pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 50 * 1024 * 1024;

/// Longest extension carried over from the display name.
const MAX_EXTENSION_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("payload is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },

    #[error("failed to write attachment: {0}")]
    Io(#[from] std::io::Error),
}

/// On-disk attachment storage.
///
/// Files and media live under separate roots. Every stored payload gets a
/// fresh `{uuid}.{ext}` name; nothing is deduplicated or overwritten.
pub struct AttachmentStore {
    files_dir: PathBuf,
    media_dir: PathBuf,
    max_bytes: usize,
}

impl AttachmentStore {
    /// Create both roots if absent and resolve them to absolute paths.
    pub async fn new(files_dir: PathBuf, media_dir: PathBuf, max_bytes: usize) -> anyhow::Result<Self> {
        fs::create_dir_all(&files_dir).await?;
        fs::create_dir_all(&media_dir).await?;
        let files_dir = fs::canonicalize(&files_dir).await?;
        let media_dir = fs::canonicalize(&media_dir).await?;

        info!("File attachments directory: {}", files_dir.display());
        info!("Media attachments directory: {}", media_dir.display());
        Ok(Self {
            files_dir,
            media_dir,
            max_bytes,
        })
    }

    pub fn root(&self, category: AttachmentCategory) -> &Path {
        match category {
            AttachmentCategory::File => &self.files_dir,
            AttachmentCategory::Media => &self.media_dir,
        }
    }

    /// Decode a base64 payload. Embedded line breaks are tolerated.
    pub fn decode(&self, encoded: &str) -> Result<Vec<u8>, AttachmentError> {
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = B64.decode(compact)?;
        if bytes.len() > self.max_bytes {
            return Err(AttachmentError::TooLarge {
                size: bytes.len(),
                max: self.max_bytes,
            });
        }
        Ok(bytes)
    }

    /// Decode and persist one payload.
    pub async fn store(
        &self,
        encoded: &str,
        display_name: &str,
        category: AttachmentCategory,
    ) -> Result<AttachmentHandle, AttachmentError> {
        let bytes = self.decode(encoded)?;
        self.write(&bytes, display_name, category).await
    }

    /// Persist already-decoded bytes under a freshly generated name.
    pub async fn write(
        &self,
        bytes: &[u8],
        display_name: &str,
        category: AttachmentCategory,
    ) -> Result<AttachmentHandle, AttachmentError> {
        let stored_name = generate_name(display_name);
        let location = self.root(category).join(&stored_name);

        let result = async {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&location)
                .await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(())
        }
        .await;

        if let Err(e) = result {
            error!("Failed to write {} attachment {}: {}", category.as_str(), location.display(), e);
            return Err(e.into());
        }

        info!(
            "Stored {} attachment {} ({} bytes)",
            category.as_str(),
            stored_name,
            bytes.len()
        );
        Ok(AttachmentHandle {
            content_type: content_type_for(display_name).to_string(),
            size: bytes.len() as u64,
            stored_name,
            location,
        })
    }
}

/// Random base name plus the display name's extension, if it has a sane one.
fn generate_name(display_name: &str) -> String {
    let id = Uuid::new_v4();
    match extension(display_name) {
        Some(ext) => format!("{}.{}", id, ext),
        None => id.to_string(),
    }
}

fn extension(display_name: &str) -> Option<String> {
    let ext = Path::new(display_name).extension()?.to_str()?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Content type guessed from the display name's extension. The payload
/// bytes are not inspected.
pub fn content_type_for(display_name: &str) -> &'static str {
    let ext = extension(display_name).unwrap_or_default();

    match ext.as_str() {
        // Text
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",

        // Documents
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "zip" => "application/zip",

        // Images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "heic" => "image/heic",

        // Audio / video
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",

        _ => "application/octet-stream",
    }
}
