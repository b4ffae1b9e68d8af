use crate::{error::StorageError, model::UploadedFile};
use bytes::Bytes;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tokio::{fs, io::AsyncWriteExt, task::JoinHandle};

const MAX_NAME_ATTEMPTS: u32 = 1000;
const MAX_EXTENSION_LEN: usize = 10;

/// Flat directory holding uploads and generated outputs.
#[derive(Clone, Debug)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    /// Opens the store, creating the directory if it is missing.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: root.clone(),
                source,
            })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Persists an upload under a fresh `<unix-millis>[-n].<ext>` name.
    pub async fn save(
        &self,
        original_name: &str,
        mime_type: Option<&str>,
        bytes: Bytes,
    ) -> Result<UploadedFile, StorageError> {
        let stamp = chrono::Utc::now().timestamp_millis();
        let extension = sanitized_extension(original_name);

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let stored_name = if attempt == 0 {
                format!("{stamp}{extension}")
            } else {
                format!("{stamp}-{attempt}{extension}")
            };
            let path = self.path_for(&stored_name);

            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(StorageError::Write { path, source }),
            };

            let written = async {
                file.write_all(&bytes).await?;
                file.flush().await
            }
            .await;
            if let Err(source) = written {
                return Err(StorageError::Write { path, source });
            }

            log::debug!("Stored upload {original_name:?} as {}", path.display());

            let mime_type = mime_type
                .map(str::to_string)
                .unwrap_or_else(|| {
                    mime_guess::from_path(original_name)
                        .first_or_octet_stream()
                        .to_string()
                });

            return Ok(UploadedFile {
                bytes,
                mime_type,
                original_name: original_name.to_string(),
                stored_name,
                path,
            });
        }

        Err(StorageError::NameExhausted(format!("{stamp}{extension}")))
    }

    /// Writes a generated image and returns its path.
    pub async fn write_output(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.path_for(name);
        fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Deletes regular files older than `retention` and returns how many were removed.
    pub async fn sweep_expired(&self, retention: Duration) -> Result<usize, StorageError> {
        let scan_error = |source| StorageError::Scan {
            path: self.root.clone(),
            source,
        };
        let mut entries = fs::read_dir(&self.root).await.map_err(scan_error)?;
        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await.map_err(scan_error)? {
            let path = entry.path();
            let modified = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta.modified(),
                Ok(_) => continue,
                Err(err) => Err(err),
            };
            let age = match modified {
                Ok(modified) => now.duration_since(modified).unwrap_or_default(),
                Err(err) => {
                    log::warn!("Skipping {} during sweep: {err}", path.display());
                    continue;
                }
            };
            if age <= retention {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(err) => log::warn!("Failed to remove expired {}: {err}", path.display()),
            }
        }

        Ok(removed)
    }
}

/// Spawns a task that periodically removes files older than `retention`.
pub fn spawn_retention_sweeper(
    store: UploadStore,
    retention: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.sweep_expired(retention).await {
                Ok(0) => {}
                Ok(removed) => log::info!("Swept {removed} expired files"),
                Err(err) => log::error!("Upload sweep failed: {err}"),
            }
        }
    })
}

/// `.ext` of the original file name, or empty when it is missing or suspicious.
fn sanitized_extension(original_name: &str) -> String {
    match Path::new(original_name).extension().and_then(|ext| ext.to_str()) {
        Some(ext)
            if !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{ext}")
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;

    #[test]
    fn extension_is_kept_only_when_safe() {
        assert_eq!(sanitized_extension("photo.JPG"), ".JPG");
        assert_eq!(sanitized_extension("archive.tar.gz"), ".gz");
        assert_eq!(sanitized_extension("noext"), "");
        assert_eq!(sanitized_extension("weird.p$g"), "");
        assert_eq!(sanitized_extension("long.abcdefghijk"), "");
    }

    #[tokio::test]
    async fn open_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("uploads");
        let store = UploadStore::open(&root).await.unwrap();
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn save_assigns_timestamp_names_and_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path()).await.unwrap();

        let first = store
            .save("me.png", Some("image/png"), Bytes::from_static(b"one"))
            .await
            .unwrap();
        let second = store
            .save("me.png", None, Bytes::from_static(b"two"))
            .await
            .unwrap();

        assert_ne!(first.stored_name, second.stored_name);
        assert!(first.stored_name.ends_with(".png"));
        let stem = first.stored_name.trim_end_matches(".png");
        assert!(stem.chars().all(|c| c.is_ascii_digit()));

        assert_eq!(std::fs::read(&first.path).unwrap(), b"one");
        assert_eq!(std::fs::read(&second.path).unwrap(), b"two");
        assert_eq!(first.mime_type, "image/png");
        assert_eq!(second.mime_type, "image/png");
        assert_eq!(second.original_name, "me.png");
    }

    #[tokio::test]
    async fn unknown_mime_falls_back_to_octet_stream() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path()).await.unwrap();
        let file = store
            .save("blob", None, Bytes::from_static(b"?"))
            .await
            .unwrap();
        assert_eq!(file.mime_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path()).await.unwrap();

        let old = store.write_output("old.png", b"old").await.unwrap();
        let fresh = store.write_output("fresh.png", b"fresh").await.unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let two_hours_ago = SystemTime::now() - Duration::from_secs(7200);
        filetime::set_file_mtime(&old, FileTime::from_system_time(two_hours_ago)).unwrap();

        let removed = store
            .sweep_expired(Duration::from_secs(3600))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(dir.path().join("subdir").is_dir());
    }
}
