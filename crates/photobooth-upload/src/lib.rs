//! Best-effort off-device backup of captured photos.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use photobooth_types::{PhotoboothError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod directory;
mod queue;

pub use directory::DirectoryUploader;
pub use queue::{UploadQueue, UploadStats};

/// Receipt returned by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Capability contract of the remote storage service.
pub trait StorageUploader: Send + Sync {
    fn upload(&self, path: &Path) -> Result<UploadedFile>;
}

/// A file waiting for the upload worker.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub id: Uuid,
    pub path: PathBuf,
    pub enqueued_at: DateTime<Utc>,
}

impl UploadTask {
    pub fn new(path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            path,
            enqueued_at: Utc::now(),
        }
    }

    /// Time since the task was queued.
    pub fn queued_for(&self) -> Duration {
        Utc::now().signed_duration_since(self.enqueued_at)
    }
}

pub fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

pub fn upload_error(message: impl Into<String>) -> PhotoboothError {
    PhotoboothError::Upload(message.into())
}
