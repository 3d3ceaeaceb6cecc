//! # In-Memory Failure Log
//!
//! Thread-safe failure log kept in process memory, for tests and embedding.

use crate::error::StorageError;
use crate::failure_log::{FailureId, FailureLogStorage, FailureRecord};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// Failure log kept in process memory
///
/// Clones share the same records.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFailureLogStorage {
    records: Arc<RwLock<HashMap<FailureId, FailureRecord>>>,
}

impl InMemoryFailureLogStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, oldest first
    pub fn records(&self) -> Result<Vec<FailureRecord>, StorageError> {
        let records = self.records.read().map_err(|_| poisoned())?;

        let mut all: Vec<FailureRecord> = records.values().cloned().collect();
        all.sort_by_key(|record| record.id);
        Ok(all)
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StorageError {
    StorageError::InternalError {
        message: "failure log lock poisoned".to_string(),
    }
}

#[async_trait]
impl FailureLogStorage for InMemoryFailureLogStorage {
    async fn log(&self, record: FailureRecord) -> Result<FailureId, StorageError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;

        let id = record.id;
        records.insert(id, record);
        Ok(id)
    }

    async fn get_by_identifier(&self, id: &FailureId) -> Result<FailureRecord, StorageError> {
        let records = self.records.read().map_err(|_| poisoned())?;

        records
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })
    }
}
