use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use photobooth_types::{config::UploadConfig, Result};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{mime_type_for, upload_error, StorageUploader, UploadedFile};

/// Uploader mirroring photos into `<mirror_dir>/<folder_id>/`, typically a
/// mount of the remote storage.
pub struct DirectoryUploader {
    target_dir: PathBuf,
    credentials_path: Option<PathBuf>,
    session: Mutex<Option<Session>>,
}

#[derive(Debug, Clone)]
struct Session {
    account: String,
}

#[derive(Deserialize)]
struct Credentials {
    client_email: String,
}

impl DirectoryUploader {
    pub fn new(
        mirror_dir: impl Into<PathBuf>,
        folder_id: &str,
        credentials_path: Option<PathBuf>,
    ) -> Self {
        Self {
            target_dir: mirror_dir.into().join(folder_id),
            credentials_path,
            session: Mutex::new(None),
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(
            &config.mirror_dir,
            &config.folder_id,
            config.credentials_path.as_ref().map(PathBuf::from),
        )
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Authenticate on first use; a failed attempt is retried on the next upload.
    fn session(&self) -> Result<Session> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| upload_error("uploader session lock poisoned"))?;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let account = match &self.credentials_path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|err| {
                    upload_error(format!(
                        "unable to read credentials {}: {err}",
                        path.display()
                    ))
                })?;
                let credentials: Credentials = serde_json::from_str(&raw).map_err(|err| {
                    upload_error(format!("invalid credentials {}: {err}", path.display()))
                })?;
                credentials.client_email
            }
            None => "anonymous".to_string(),
        };
        info!("Upload session opened for {account}");
        let session = Session { account };
        *guard = Some(session.clone());
        Ok(session)
    }
}

impl StorageUploader for DirectoryUploader {
    fn upload(&self, path: &Path) -> Result<UploadedFile> {
        let session = self.session()?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| upload_error(format!("invalid upload path {}", path.display())))?
            .to_string();

        fs::create_dir_all(&self.target_dir).map_err(|err| {
            upload_error(format!(
                "unable to create remote folder {}: {err}",
                self.target_dir.display()
            ))
        })?;

        let destination = self.target_dir.join(&name);
        let staging = self.target_dir.join(format!(".{name}.upload"));
        fs::copy(path, &staging)
            .map_err(|err| upload_error(format!("copy of {} failed: {err}", path.display())))?;
        fs::rename(&staging, &destination).map_err(|err| {
            upload_error(format!("finalizing {} failed: {err}", destination.display()))
        })?;

        debug!(
            "Stored {} ({}) as {}",
            name,
            mime_type_for(path),
            session.account
        );
        Ok(UploadedFile {
            id: Uuid::new_v4().to_string(),
            name,
            url: format!("file://{}", destination.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photobooth_types::PhotoboothError;

    #[test]
    fn upload_copies_into_folder_and_keeps_source() {
        let local = tempfile::tempdir().expect("local");
        let remote = tempfile::tempdir().expect("remote");
        let source = local.path().join("photo_3.jpg");
        fs::write(&source, b"jpeg").expect("write");

        let uploader = DirectoryUploader::new(remote.path(), "event", None);
        let uploaded = uploader.upload(&source).expect("upload");

        assert_eq!(uploaded.name, "photo_3.jpg");
        assert!(uploaded.url.ends_with("event/photo_3.jpg"));
        assert_eq!(
            fs::read(remote.path().join("event").join("photo_3.jpg")).expect("read"),
            b"jpeg"
        );
        assert!(source.exists());
    }

    #[test]
    fn credentials_are_checked_lazily() {
        let local = tempfile::tempdir().expect("local");
        let source = local.path().join("photo_1.jpg");
        fs::write(&source, b"jpeg").expect("write");
        let credentials = local.path().join("credentials.json");

        let uploader =
            DirectoryUploader::new(local.path().join("remote"), "f", Some(credentials.clone()));
        let err = uploader.upload(&source).expect_err("missing credentials");
        assert!(matches!(err, PhotoboothError::Upload(_)));

        fs::write(&credentials, r#"{"client_email": "booth@example.com"}"#).expect("write");
        uploader.upload(&source).expect("upload after credentials appear");
    }

    #[test]
    fn missing_source_is_upload_error() {
        let remote = tempfile::tempdir().expect("remote");
        let uploader = DirectoryUploader::new(remote.path(), "f", None);
        let err = uploader
            .upload(&remote.path().join("gone.jpg"))
            .expect_err("missing source");
        assert!(matches!(err, PhotoboothError::Upload(_)));
    }
}
