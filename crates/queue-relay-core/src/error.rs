//! Error types for the transport, its ports and its adapters.

use std::time::Duration;
use thiserror::Error;

/// Errors reported by a queue client (consumer, producer or context).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Topic not found: {topic_name}")]
    TopicNotFound { topic_name: String },

    #[error("Message not found or already settled: {message_id}")]
    MessageNotFound { message_id: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Channel closed: {message}")]
    ChannelClosed { message: String },

    #[error("Permission denied for operation: {operation}")]
    PermissionDenied { operation: String },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl QueueError {
    /// Check if the error is a transient condition a recovery hook may repair
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::TopicNotFound { .. } => false,
            Self::MessageNotFound { .. } => false,
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::ChannelClosed { .. } => true,
            Self::PermissionDenied { .. } => false,
            Self::MessageTooLarge { .. } => false,
            Self::ProviderError { .. } => true,
            Self::ValidationError(_) => false,
        }
    }
}

/// Failures raised by an envelope codec
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Message body could not be decoded: {message}")]
    Decode { message: String },

    #[error("Envelope could not be encoded: {message}")]
    Encode { message: String },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome signals returned by an envelope handler
///
/// Only [`HandlerError::Failed`] is an actual failure; the other variants ask the
/// transport to redeliver the message in a particular way.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Re-publish the envelope after a delay, bounded by a maximum attempt count.
    ///
    /// When the envelope already carries a repeat policy that policy wins and the
    /// values supplied here are ignored.
    #[error("Repeat requested: {reason}")]
    Repeat {
        reason: String,
        delay: Option<Duration>,
        max_attempts: Option<u32>,
    },

    /// Return the message to the queue for immediate redelivery
    #[error("Requeue requested: {reason}")]
    Requeue { reason: String },

    #[error("Handler failed: {0}")]
    Failed(#[source] anyhow::Error),
}

impl HandlerError {
    /// Request a repeat using the transport's default delay and attempt limit
    pub fn repeat(reason: impl Into<String>) -> Self {
        Self::Repeat {
            reason: reason.into(),
            delay: None,
            max_attempts: None,
        }
    }

    /// Request a repeat with an explicit delay and attempt limit
    pub fn repeat_with(reason: impl Into<String>, delay: Duration, max_attempts: u32) -> Self {
        Self::Repeat {
            reason: reason.into(),
            delay: Some(delay),
            max_attempts: Some(max_attempts),
        }
    }

    /// Request immediate redelivery
    pub fn requeue(reason: impl Into<String>) -> Self {
        Self::Requeue {
            reason: reason.into(),
        }
    }

    /// Wrap an arbitrary processing failure
    pub fn failed(error: impl Into<anyhow::Error>) -> Self {
        Self::Failed(error.into())
    }

    /// Short machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Repeat { .. } => "repeat_requested",
            Self::Requeue { .. } => "requeue_requested",
            Self::Failed(_) => "handler_failed",
        }
    }
}

/// Invalid transport options, detected before any queue I/O
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration for '{key}': {message}")]
    Invalid { key: String, message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Unknown delay strategy '{value}'")]
    UnknownDelayStrategy { value: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors for identifiers and values
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

/// Failure log storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failure record not found: {id}")]
    NotFound { id: String },

    #[error("Failure record serialization failed: {message}")]
    SerializationFailed { message: String },

    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage internal error: {message}")]
    InternalError { message: String },
}

/// Errors raised by an event sink while handling a notification
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failure log storage rejected the record: {0}")]
    Storage(#[from] StorageError),

    #[error("Event sink failed: {message}")]
    Failed { message: String },
}

/// Errors surfaced to callers of the transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The producer send failed and the recovery hook declined to retry it
    #[error("Sending message to topic '{topic}' failed: {source}")]
    SendFailed {
        topic: String,
        #[source]
        source: QueueError,
    },

    #[error("Envelope could not be encoded: {0}")]
    Encode(#[source] CodecError),

    /// Unrecoverable queue-client failure that ended the receive loop
    #[error("Queue '{queue}' failed: {source}")]
    Queue {
        queue: String,
        #[source]
        source: QueueError,
    },

    /// An event sink failed while strict notifications were enabled
    #[error("Event sink failed while reporting {event_type}: {source}")]
    Notification {
        event_type: String,
        #[source]
        source: SinkError,
    },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
