//! # Filesystem Failure Log Adapter
//!
//! Local filesystem implementation of [`FailureLogStorage`] for development and
//! single-node deployments.

use crate::error::StorageError;
use crate::failure_log::{FailureId, FailureLogStorage, FailureRecord};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

const RECORD_EXTENSION: &str = "json";

/// Filesystem-based failure log
///
/// Each record is stored as a pretty-printed JSON file named after its
/// identifier directly below the base directory.
///
/// # Examples
///
/// ```no_run
/// use queue_relay_core::adapters::FilesystemFailureLogStorage;
/// use std::path::PathBuf;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = FilesystemFailureLogStorage::new(PathBuf::from("./data/failures")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FilesystemFailureLogStorage {
    base_path: PathBuf,
}

impl FilesystemFailureLogStorage {
    /// Create the storage, creating the base directory if needed
    pub async fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path)
            .await
            .map_err(|e| StorageError::InternalError {
                message: format!("Failed to create base directory: {}", e),
            })?;

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn record_path(&self, id: &FailureId) -> PathBuf {
        self.base_path.join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    /// Identifiers of all stored records, oldest first
    ///
    /// Files that are not named after a failure identifier are ignored.
    pub async fn list_identifiers(&self) -> Result<Vec<FailureId>, StorageError> {
        let mut entries = fs::read_dir(&self.base_path).await?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }

            let id = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<FailureId>().ok());

            if let Some(id) = id {
                ids.push(id);
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Write `contents` to `temp_path` and rename it onto `target`
    async fn write_atomically(
        temp_path: &Path,
        target: &Path,
        contents: &[u8],
    ) -> Result<(), StorageError> {
        let mut file =
            fs::File::create(temp_path)
                .await
                .map_err(|e| StorageError::InternalError {
                    message: format!("Failed to create temp file: {}", e),
                })?;

        file.write_all(contents)
            .await
            .map_err(|e| StorageError::InternalError {
                message: format!("Failed to write failure record: {}", e),
            })?;

        file.flush()
            .await
            .map_err(|e| StorageError::InternalError {
                message: format!("Failed to flush file: {}", e),
            })?;
        drop(file);

        fs::rename(temp_path, target)
            .await
            .map_err(|e| StorageError::InternalError {
                message: format!("Failed to rename temp file: {}", e),
            })
    }
}

#[async_trait]
impl FailureLogStorage for FilesystemFailureLogStorage {
    async fn log(&self, record: FailureRecord) -> Result<FailureId, StorageError> {
        let record_path = self.record_path(&record.id);

        let json = serde_json::to_string_pretty(&record).map_err(|e| {
            StorageError::SerializationFailed {
                message: format!("Failed to serialize failure record: {}", e),
            }
        })?;

        // Write to a temporary file, then rename into place
        let temp_path = record_path.with_extension("tmp");
        if let Err(e) = Self::write_atomically(&temp_path, &record_path, json.as_bytes()).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        path = %temp_path.display(),
                        error = %cleanup,
                        "Failed to remove temp file"
                    );
                }
            }
            return Err(e);
        }

        Ok(record.id)
    }

    async fn get_by_identifier(&self, id: &FailureId) -> Result<FailureRecord, StorageError> {
        let record_path = self.record_path(id);

        let json = match fs::read_to_string(&record_path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound { id: id.to_string() });
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        serde_json::from_str(&json).map_err(|e| StorageError::SerializationFailed {
            message: format!("Failed to deserialize failure record: {}", e),
        })
    }
}

#[cfg(test)]
#[path = "filesystem_failure_log_tests.rs"]
mod tests;
