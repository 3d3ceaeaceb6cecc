//! # Envelopes
//!
//! An [`Envelope`] carries an application message together with an ordered set
//! of metadata items. Items are keyed by their [`ItemKind`]: at most one item of
//! each kind is present, and attaching an item of a kind already present
//! replaces it in place.
//!
//! Envelopes are immutable. [`Envelope::with`] returns a new envelope and leaves
//! the receiver untouched, so a retry can be built from the envelope that was
//! handed to the handler without affecting it.
//!
//! ```rust
//! use queue_relay_core::{Envelope, RoutingKey, SourceQueue};
//!
//! let envelope = Envelope::new(serde_json::json!({"order": 42}))
//!     .with(RoutingKey::new("orders.eu"))
//!     .with(RoutingKey::new("orders.us"));
//!
//! assert_eq!(envelope.items().len(), 1);
//! assert_eq!(envelope.get::<RoutingKey>().unwrap().as_str(), "orders.us");
//! assert!(envelope.get::<SourceQueue>().is_none());
//! ```

use crate::message::{QueueName, TopicName};
use crate::repeat::RepeatMessage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ============================================================================
// Item Types
// ============================================================================

/// Static tag identifying the kind of an envelope item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKind {
    SourceQueue,
    RoutingKey,
    TransportConfiguration,
    Repeat,
}

/// Queue an inbound envelope was received from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceQueue {
    queue: QueueName,
}

impl SourceQueue {
    pub fn new(queue: QueueName) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }
}

/// Routing key applied to the raw message when the envelope is sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingKey {
    routing_key: String,
}

impl RoutingKey {
    pub fn new(routing_key: impl Into<String>) -> Self {
        Self {
            routing_key: routing_key.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.routing_key
    }
}

/// Per-envelope override of the transport's destination
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransportConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic: Option<TopicName>,
}

impl TransportConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish to this topic instead of the configured default
    pub fn with_topic(mut self, topic: TopicName) -> Self {
        self.topic = Some(topic);
        self
    }

    pub fn topic(&self) -> Option<&TopicName> {
        self.topic.as_ref()
    }
}

/// A metadata item attached to an envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvelopeItem {
    SourceQueue(SourceQueue),
    RoutingKey(RoutingKey),
    TransportConfiguration(TransportConfiguration),
    Repeat(RepeatMessage),
}

impl EnvelopeItem {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::SourceQueue(_) => ItemKind::SourceQueue,
            Self::RoutingKey(_) => ItemKind::RoutingKey,
            Self::TransportConfiguration(_) => ItemKind::TransportConfiguration,
            Self::Repeat(_) => ItemKind::Repeat,
        }
    }
}

/// Typed access to a single kind of envelope item
pub trait Item: Into<EnvelopeItem> {
    const KIND: ItemKind;

    fn from_item(item: &EnvelopeItem) -> Option<&Self>;
}

macro_rules! envelope_item {
    ($ty:ident, $variant:ident) => {
        impl From<$ty> for EnvelopeItem {
            fn from(item: $ty) -> Self {
                EnvelopeItem::$variant(item)
            }
        }

        impl Item for $ty {
            const KIND: ItemKind = ItemKind::$variant;

            fn from_item(item: &EnvelopeItem) -> Option<&Self> {
                match item {
                    EnvelopeItem::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

envelope_item!(SourceQueue, SourceQueue);
envelope_item!(RoutingKey, RoutingKey);
envelope_item!(TransportConfiguration, TransportConfiguration);
envelope_item!(RepeatMessage, Repeat);

// ============================================================================
// Envelope
// ============================================================================

/// Immutable application message plus metadata items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    message: serde_json::Value,
    #[serde(default)]
    items: Vec<EnvelopeItem>,
}

impl Envelope {
    /// Wrap an application message with no items
    pub fn new(message: serde_json::Value) -> Self {
        Self {
            message,
            items: Vec::new(),
        }
    }

    /// Wrap a serializable application message
    pub fn from_message<T: Serialize>(message: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_value(message)?))
    }

    /// Wrap a message and attach the given items in order
    pub fn with_items<I>(message: serde_json::Value, items: I) -> Self
    where
        I: IntoIterator<Item = EnvelopeItem>,
    {
        items
            .into_iter()
            .fold(Self::new(message), |envelope, item| envelope.with(item))
    }

    /// The application message
    pub fn message(&self) -> &serde_json::Value {
        &self.message
    }

    /// Deserialize the application message into a concrete type
    pub fn message_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.message.clone())
    }

    /// Items in attachment order
    pub fn items(&self) -> &[EnvelopeItem] {
        &self.items
    }

    /// Return a copy of this envelope carrying `item`
    ///
    /// An existing item of the same kind is replaced in its current position.
    pub fn with(&self, item: impl Into<EnvelopeItem>) -> Self {
        let item = item.into();
        let mut items = self.items.clone();

        match items.iter().position(|existing| existing.kind() == item.kind()) {
            Some(index) => items[index] = item,
            None => items.push(item),
        }

        Self {
            message: self.message.clone(),
            items,
        }
    }

    /// Return a copy of this envelope without the item of the given kind
    pub fn without(&self, kind: ItemKind) -> Self {
        Self {
            message: self.message.clone(),
            items: self
                .items
                .iter()
                .filter(|item| item.kind() != kind)
                .cloned()
                .collect(),
        }
    }

    /// Look up the item of the given kind
    pub fn item(&self, kind: ItemKind) -> Option<&EnvelopeItem> {
        self.items.iter().find(|item| item.kind() == kind)
    }

    /// Typed lookup of an item
    pub fn get<T: Item>(&self) -> Option<&T> {
        self.item(T::KIND).and_then(T::from_item)
    }

    /// Queue the envelope was received from, if it came off a queue
    pub fn source_queue(&self) -> Option<&QueueName> {
        self.get::<SourceQueue>().map(SourceQueue::queue)
    }

    pub fn routing_key(&self) -> Option<&str> {
        self.get::<RoutingKey>().map(RoutingKey::as_str)
    }

    pub fn repeat(&self) -> Option<&RepeatMessage> {
        self.get::<RepeatMessage>()
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
