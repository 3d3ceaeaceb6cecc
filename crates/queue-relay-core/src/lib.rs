//! # Queue Relay Core
//!
//! Message transport that sits between an application's envelope handler and a
//! message broker.
//!
//! The transport pulls raw messages from the configured queues, decodes them
//! into [`Envelope`]s, dispatches them to an [`EnvelopeHandler`] and settles
//! each message according to the outcome: acknowledge, re-publish with a
//! bounded [`RepeatMessage`] policy, requeue, or reject and report. Failures
//! are reported to an [`EventSink`].
//!
//! ## Architecture
//!
//! - The broker, the codec and the event sinks are traits; the transport only
//!   depends on those abstractions
//! - [`adapters`] provides an in-process broker and failure log implementations
//! - Configuration is a plain serde type validated before any broker I/O
//!
//! ## Usage
//!
//! ```rust
//! use queue_relay_core::{Envelope, RepeatMessage, RoutingKey};
//! use std::time::Duration;
//!
//! let envelope = Envelope::new(serde_json::json!({"order": 42}))
//!     .with(RoutingKey::new("orders.created"))
//!     .with(RepeatMessage::new(Duration::from_secs(1), 3));
//!
//! assert_eq!(envelope.routing_key(), Some("orders.created"));
//! assert!(envelope.repeat().map(RepeatMessage::is_repeatable).unwrap_or(false));
//! ```

pub mod adapters;
pub mod client;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod failure_log;
pub mod message;
pub mod repeat;
pub mod transport;

pub use client::{DelayStrategy, Destination, QueueConsumer, QueueContext, QueueProducer};
pub use codec::EnvelopeCodec;
pub use config::{QueueOptions, RepeatOptions, TopicOptions, TransportOptions};
pub use envelope::{
    Envelope, EnvelopeItem, Item, ItemKind, RoutingKey, SourceQueue, TransportConfiguration,
};
pub use error::{
    CodecError, ConfigurationError, HandlerError, QueueError, SinkError, StorageError,
    TransportError, ValidationError,
};
pub use events::{
    EnvelopeExecuteFail, ErrorDetails, EventSink, EventType, FanoutEventSink, MessageDecodeFail,
    RepeatFailure, TracingEventSink, TransportEvent,
};
pub use failure_log::{FailureId, FailureLogSink, FailureLogStorage, FailureRecord};
pub use message::{
    EncodedMessage, Message, MessageId, QueueName, ReceivedMessage, Timestamp, Topic, TopicKind,
    TopicName,
};
pub use repeat::{Backoff, RepeatMessage};
pub use transport::{EnvelopeHandler, QueueTransport, StopHandle};

/// Standard result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
