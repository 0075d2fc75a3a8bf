//! services/api/src/adapters/fs_store.rs
//!
//! Filesystem implementation of the `Storage` port: one directory per
//! identity under the store root, submission filenames encoding
//! `(sequence, designation, kind)`, and everything sealed through the
//! key vault before it touches disk.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tipline_core::ports::{CryptoError, Encryption, Storage, StorageError};

/// File-backed storage rooted at `store_dir`.
pub struct FsStorage {
    root: PathBuf,
    vault: Arc<dyn Encryption>,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>, vault: Arc<dyn Encryption>) -> Self {
        Self {
            root: root.into(),
            vault,
        }
    }

    fn source_dir(&self, filesystem_id: &str) -> PathBuf {
        self.root.join(filesystem_id)
    }
}

fn io_error(err: std::io::Error) -> StorageError {
    StorageError::Io(err.to_string())
}

fn crypto_error(err: CryptoError) -> StorageError {
    StorageError::Io(format!("sealing failed: {err}"))
}

#[async_trait]
impl Storage for FsStorage {
    async fn ensure_source_dir(&self, filesystem_id: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(self.source_dir(filesystem_id))
            .await
            .map_err(io_error)
    }

    async fn save_message(
        &self,
        filesystem_id: &str,
        count: i64,
        journalist_filename: &str,
        message: &str,
    ) -> Result<String, StorageError> {
        let filename = format!("{count}-{journalist_filename}-msg.gpg");
        let sealed = self
            .vault
            .seal(filesystem_id, message.as_bytes())
            .await
            .map_err(crypto_error)?;
        tokio::fs::write(self.source_dir(filesystem_id).join(&filename), sealed)
            .await
            .map_err(io_error)?;
        Ok(filename)
    }

    async fn save_file(
        &self,
        filesystem_id: &str,
        count: i64,
        journalist_filename: &str,
        original_filename: &str,
        contents: &[u8],
    ) -> Result<String, StorageError> {
        // The original filename never reaches disk; the stored name only
        // encodes sequence, designation and kind.
        tracing::debug!(original_filename, "storing document submission");
        let filename = format!("{count}-{journalist_filename}-doc.gz.gpg");
        let sealed = self
            .vault
            .seal(filesystem_id, contents)
            .await
            .map_err(crypto_error)?;
        tokio::fs::write(self.source_dir(filesystem_id).join(&filename), sealed)
            .await
            .map_err(io_error)?;
        Ok(filename)
    }

    async fn reply_bytes(
        &self,
        filesystem_id: &str,
        filename: &str,
    ) -> Result<(Vec<u8>, DateTime<Utc>), StorageError> {
        let path = self.source_dir(filesystem_id).join(filename);
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(filename.to_string()))
            }
            Err(err) => return Err(io_error(err)),
        };
        let metadata = tokio::fs::metadata(&path).await.map_err(io_error)?;
        let mtime = metadata.modified().map_err(io_error)?;
        Ok((contents, DateTime::<Utc>::from(mtime)))
    }

    async fn normalize_timestamps(&self, filesystem_id: &str) -> Result<(), StorageError> {
        let dir = self.source_dir(filesystem_id);
        let now = SystemTime::now();
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_error)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let file = std::fs::File::options()
                .write(true)
                .open(entry.path())
                .map_err(io_error)?;
            file.set_modified(now).map_err(io_error)?;
        }
        Ok(())
    }
}
