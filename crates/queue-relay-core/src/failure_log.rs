//! # Failure Log
//!
//! Persistent record of messages the transport could not process.
//!
//! [`FailureLogSink`] turns every [`TransportEvent`] into a [`FailureRecord`] and
//! hands it to a [`FailureLogStorage`]. The transport itself never reads records
//! back; lookups by identifier exist for operators and tooling.

use crate::envelope::Envelope;
use crate::error::{SinkError, StorageError};
use crate::events::{ErrorDetails, EventSink, EventType, TransportEvent};
use crate::message::{QueueName, ReceivedMessage, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use ulid::Ulid;

#[cfg(test)]
#[path = "failure_log_tests.rs"]
mod tests;

// ============================================================================
// Failure Records
// ============================================================================

/// Identifier of a failure record
///
/// Uses ULID so identifiers sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FailureId(Ulid);

impl FailureId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for FailureId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FailureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FailureId {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ulid>()
            .map(Self)
            .map_err(|_| StorageError::NotFound { id: s.to_string() })
    }
}

/// Snapshot of a failed message, stored in the failure log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: FailureId,
    pub event_type: EventType,
    pub queue_name: QueueName,
    pub message: ReceivedMessage,
    pub error: ErrorDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<Envelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    pub created_at: Timestamp,
}

impl FailureRecord {
    /// Build a record from a transport event
    pub fn from_event(event: &TransportEvent) -> Self {
        let (attempt, limit) = match event.repeat_counts() {
            Some((attempts, max_attempts)) => (Some(attempts), Some(max_attempts)),
            None => (None, None),
        };

        Self {
            id: FailureId::new(),
            event_type: event.event_type(),
            queue_name: event.queue().clone(),
            message: event.message().clone(),
            error: event.error().clone(),
            envelope: event.envelope().cloned(),
            attempt,
            limit,
            created_at: Timestamp::now(),
        }
    }
}

// ============================================================================
// Storage Port
// ============================================================================

/// Storage for failure records
#[async_trait]
pub trait FailureLogStorage: Send + Sync {
    /// Persist a record and return its identifier
    async fn log(&self, record: FailureRecord) -> Result<FailureId, StorageError>;

    /// Load a record; fails with [`StorageError::NotFound`] for unknown identifiers
    async fn get_by_identifier(&self, id: &FailureId) -> Result<FailureRecord, StorageError>;
}

#[async_trait]
impl<T: FailureLogStorage + ?Sized> FailureLogStorage for Arc<T> {
    async fn log(&self, record: FailureRecord) -> Result<FailureId, StorageError> {
        (**self).log(record).await
    }

    async fn get_by_identifier(&self, id: &FailureId) -> Result<FailureRecord, StorageError> {
        (**self).get_by_identifier(id).await
    }
}

/// Event sink that writes every event into a failure log
pub struct FailureLogSink<S> {
    storage: S,
}

impl<S: FailureLogStorage> FailureLogSink<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

#[async_trait]
impl<S: FailureLogStorage> EventSink for FailureLogSink<S> {
    async fn notify(&self, event: &TransportEvent) -> Result<(), SinkError> {
        let record = FailureRecord::from_event(event);
        let id = self.storage.log(record).await?;

        debug!(
            failure_id = %id,
            event_type = %event.event_type(),
            queue = %event.queue(),
            "Failure recorded"
        );

        Ok(())
    }
}
