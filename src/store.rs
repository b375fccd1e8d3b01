//! File-backed JSON documents.
//!
//! Every persisted document (credentials, model providers, tool settings, app
//! settings) is one JSON file in the data directory. Reads are full-document
//! loads, writes are full-document replaces, and read-modify-write cycles run
//! under a per-document lock so concurrent callers cannot lose each other's
//! updates.

use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// A schema-checked document persisted as a single JSON file.
pub trait Document: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// File name inside the data directory.
    const FILE_NAME: &'static str;

    /// Structural checks serde cannot express. `Err` carries a reason.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Handle on one JSON document file.
#[derive(Debug)]
pub struct JsonDocument<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _doc: PhantomData<fn() -> T>,
}

impl<T: Document> JsonDocument<T> {
    /// Document stored at `<data_dir>/<T::FILE_NAME>`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::at(data_dir.join(T::FILE_NAME))
    }

    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, falling back to the default on a missing or
    /// corrupt file.
    pub async fn load(&self) -> T {
        let _guard = self.lock.lock().await;
        self.read_unlocked().await
    }

    /// Replace the whole document.
    pub async fn save(&self, value: &T) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.write_unlocked(value).await
    }

    /// Load, apply `f`, and save as one critical section.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        let _guard = self.lock.lock().await;
        let mut value = self.read_unlocked().await;
        let out = f(&mut value);
        self.write_unlocked(&value).await?;
        Ok(out)
    }

    async fn read_unlocked(&self) -> T {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "unreadable document, using defaults");
                return T::default();
            }
        };
        let parsed: T = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "corrupt document, using defaults");
                return T::default();
            }
        };
        if let Err(reason) = parsed.validate() {
            warn!(path = %self.path.display(), %reason, "document failed validation, using defaults");
            return T::default();
        }
        parsed
    }

    async fn write_unlocked(&self, value: &T) -> Result<(), StoreError> {
        if let Err(reason) = value.validate() {
            error!(document = T::FILE_NAME, %reason, "refusing to persist invalid document");
            return Err(StoreError::Schema {
                document: T::FILE_NAME,
                reason,
            });
        }

        let text = serde_json::to_string_pretty(value)?;
        if let Some(parent) = self.path.parent() {
            ensure_private_dir(parent).await?;
        }

        let tmp = self.path.with_file_name(format!(".{}.tmp", T::FILE_NAME));
        let mut options = tokio::fs::OpenOptions::new();
        options.create(true).truncate(true).write(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&tmp).await?;
        file.write_all(text.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        // `mode` only applies on create; a stale temp file keeps its old bits.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = text.len(), "document saved");
        Ok(())
    }
}

async fn ensure_private_dir(dir: &Path) -> Result<(), StoreError> {
    tokio::fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(err) =
            tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).await
        {
            warn!(dir = %dir.display(), error = %err, "could not restrict data directory permissions");
        }
    }
    Ok(())
}
