//! # Transport Events
//!
//! Notifications emitted by the receive loop whenever a message cannot be
//! processed normally. The loop reports four situations:
//!
//! | Event type                    | Raised when                                         |
//! |-------------------------------|-----------------------------------------------------|
//! | `MESSAGE_DECODE_FAIL`         | the codec could not rebuild an envelope             |
//! | `ENVELOPE_EXECUTE_FAIL`       | the handler failed without asking for a redelivery  |
//! | `ENVELOPE_REACH_REPEAT_LIMIT` | a repeat was requested but the policy is exhausted  |
//! | `ENVELOPE_FAIL_ON_REPEAT`     | re-publishing a repeat failed                       |
//!
//! Sinks are wired into the transport at construction. Use [`FanoutEventSink`]
//! to deliver each event to several sinks.

use crate::envelope::Envelope;
use crate::error::SinkError;
use crate::message::{QueueName, ReceivedMessage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;

/// The four notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    MessageDecodeFail,
    EnvelopeExecuteFail,
    EnvelopeReachRepeatLimit,
    EnvelopeFailOnRepeat,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageDecodeFail => "MESSAGE_DECODE_FAIL",
            Self::EnvelopeExecuteFail => "ENVELOPE_EXECUTE_FAIL",
            Self::EnvelopeReachRepeatLimit => "ENVELOPE_REACH_REPEAT_LIMIT",
            Self::EnvelopeFailOnRepeat => "ENVELOPE_FAIL_ON_REPEAT",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of an error and its source chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Short classification of the error
    pub kind: String,
    pub message: String,
    /// Messages of the source errors, outermost first
    #[serde(default)]
    pub chain: Vec<String>,
}

impl ErrorDetails {
    /// Capture an error's message and source chain
    pub fn new(kind: impl Into<String>, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        Self {
            kind: kind.into(),
            message: error.to_string(),
            chain,
        }
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Payload of `MESSAGE_DECODE_FAIL`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDecodeFail {
    pub message: ReceivedMessage,
    pub queue: QueueName,
    pub error: ErrorDetails,
}

/// Payload of `ENVELOPE_EXECUTE_FAIL`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeExecuteFail {
    pub envelope: Envelope,
    pub message: ReceivedMessage,
    pub queue: QueueName,
    pub error: ErrorDetails,
}

/// Payload of `ENVELOPE_REACH_REPEAT_LIMIT` and `ENVELOPE_FAIL_ON_REPEAT`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatFailure {
    pub envelope: Envelope,
    pub message: ReceivedMessage,
    pub queue: QueueName,
    /// Attempts recorded on the policy when the repeat was requested
    pub attempts: u32,
    pub max_attempts: u32,
    pub error: ErrorDetails,
}

/// A failure notification raised by the receive loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportEvent {
    MessageDecodeFail(MessageDecodeFail),
    EnvelopeExecuteFail(EnvelopeExecuteFail),
    EnvelopeReachRepeatLimit(RepeatFailure),
    EnvelopeFailOnRepeat(RepeatFailure),
}

impl TransportEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::MessageDecodeFail(_) => EventType::MessageDecodeFail,
            Self::EnvelopeExecuteFail(_) => EventType::EnvelopeExecuteFail,
            Self::EnvelopeReachRepeatLimit(_) => EventType::EnvelopeReachRepeatLimit,
            Self::EnvelopeFailOnRepeat(_) => EventType::EnvelopeFailOnRepeat,
        }
    }

    /// The raw message that triggered the event
    pub fn message(&self) -> &ReceivedMessage {
        match self {
            Self::MessageDecodeFail(e) => &e.message,
            Self::EnvelopeExecuteFail(e) => &e.message,
            Self::EnvelopeReachRepeatLimit(e) | Self::EnvelopeFailOnRepeat(e) => &e.message,
        }
    }

    pub fn queue(&self) -> &QueueName {
        match self {
            Self::MessageDecodeFail(e) => &e.queue,
            Self::EnvelopeExecuteFail(e) => &e.queue,
            Self::EnvelopeReachRepeatLimit(e) | Self::EnvelopeFailOnRepeat(e) => &e.queue,
        }
    }

    pub fn error(&self) -> &ErrorDetails {
        match self {
            Self::MessageDecodeFail(e) => &e.error,
            Self::EnvelopeExecuteFail(e) => &e.error,
            Self::EnvelopeReachRepeatLimit(e) | Self::EnvelopeFailOnRepeat(e) => &e.error,
        }
    }

    /// The decoded envelope; absent for decode failures
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            Self::MessageDecodeFail(_) => None,
            Self::EnvelopeExecuteFail(e) => Some(&e.envelope),
            Self::EnvelopeReachRepeatLimit(e) | Self::EnvelopeFailOnRepeat(e) => Some(&e.envelope),
        }
    }

    /// `(attempts, max_attempts)` for the repeat events
    pub fn repeat_counts(&self) -> Option<(u32, u32)> {
        match self {
            Self::EnvelopeReachRepeatLimit(e) | Self::EnvelopeFailOnRepeat(e) => {
                Some((e.attempts, e.max_attempts))
            }
            _ => None,
        }
    }
}

/// Receiver of transport notifications
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn notify(&self, event: &TransportEvent) -> Result<(), SinkError>;
}

#[async_trait]
impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    async fn notify(&self, event: &TransportEvent) -> Result<(), SinkError> {
        (**self).notify(event).await
    }
}

/// Writes every event to the `tracing` subscriber
#[derive(Debug, Clone, Default)]
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventSink for TracingEventSink {
    async fn notify(&self, event: &TransportEvent) -> Result<(), SinkError> {
        let message = event.message();

        match event.repeat_counts() {
            Some((attempts, max_attempts)) => warn!(
                event_type = %event.event_type(),
                queue = %event.queue(),
                message_id = %message.message_id,
                attempts = attempts,
                max_attempts = max_attempts,
                error = %event.error(),
                "Envelope repeat could not be scheduled"
            ),
            None => error!(
                event_type = %event.event_type(),
                queue = %event.queue(),
                message_id = %message.message_id,
                delivery_count = message.delivery_count,
                error = %event.error(),
                "Message processing failed"
            ),
        }

        Ok(())
    }
}

/// Delivers each event to several sinks in registration order
///
/// Every sink is notified even when an earlier one fails; the first failure is
/// returned.
#[derive(Clone, Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl EventSink for FanoutEventSink {
    async fn notify(&self, event: &TransportEvent) -> Result<(), SinkError> {
        let mut first_error = None;

        for sink in &self.sinks {
            if let Err(e) = sink.notify(event).await {
                warn!(
                    event_type = %event.event_type(),
                    error = %e,
                    "Event sink failed"
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
