//! Queue client port: the primitives the transport needs from a message broker.
//!
//! The transport never talks to a broker directly. A backend implements
//! [`QueueContext`] to hand out consumers and producers, to declare topology,
//! and to decide whether a failed operation may be retried.

use crate::error::{ConfigurationError, QueueError};
use crate::message::{Message, QueueName, ReceivedMessage, Topic};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Where envelopes are published and which queues are consumed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub topic: Topic,
    pub queues: Vec<QueueName>,
}

impl Destination {
    pub fn new(topic: Topic, queues: Vec<QueueName>) -> Self {
        Self { topic, queues }
    }
}

/// Broker mechanism used to implement delayed delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DelayStrategy {
    /// RabbitMQ `x-delayed-message` exchange plugin
    RabbitMqDelayPlugin,
    /// Per-message TTL on a holding queue dead-lettering back to the topic
    RabbitMqDlx,
}

impl DelayStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RabbitMqDelayPlugin => "rabbitmq_delay_plugin",
            Self::RabbitMqDlx => "rabbitmq_dlx",
        }
    }
}

impl Default for DelayStrategy {
    fn default() -> Self {
        Self::RabbitMqDelayPlugin
    }
}

impl fmt::Display for DelayStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DelayStrategy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "rabbitmq_delay_plugin" | "rabbit_mq_delay_plugin" => Ok(Self::RabbitMqDelayPlugin),
            "rabbitmq_dlx" | "rabbit_mq_dlx" => Ok(Self::RabbitMqDlx),
            _ => Err(ConfigurationError::UnknownDelayStrategy {
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for DelayStrategy {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DelayStrategy> for String {
    fn from(strategy: DelayStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

/// Entry point to a broker connection
#[async_trait]
pub trait QueueContext: Send + Sync {
    /// Open a consumer on a queue
    async fn create_consumer(&self, queue: &QueueName)
        -> Result<Box<dyn QueueConsumer>, QueueError>;

    /// Open a producer for publishing to topics
    async fn create_producer(&self) -> Result<Box<dyn QueueProducer>, QueueError>;

    /// Declare the topic, the queues and their bindings if they do not exist
    async fn ensure_topology(&self, destination: &Destination) -> Result<(), QueueError>;

    /// Attempt to repair the connection after `error`
    ///
    /// Returns `true` when the failed operation should be retried.
    async fn recover_from_error(&self, error: &QueueError, destination: &Destination) -> bool;
}

/// Pulls messages from a single queue
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Queue this consumer reads from
    fn queue(&self) -> &QueueName;

    /// Pull one message, waiting at most `timeout`; zero polls once
    async fn receive(&self, timeout: Duration) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Mark the message as processed
    async fn acknowledge(&self, message: &ReceivedMessage) -> Result<(), QueueError>;

    /// Give the message back to the broker
    ///
    /// With `requeue` the message is made available again immediately; without
    /// it the broker drops or dead-letters it.
    async fn reject(&self, message: &ReceivedMessage, requeue: bool) -> Result<(), QueueError>;
}

/// Publishes messages to topics
///
/// Delivery options apply to every subsequent `send` on the same producer.
#[async_trait]
pub trait QueueProducer: Send + Sync {
    fn set_delivery_delay(&mut self, delay: Option<Duration>);

    fn set_priority(&mut self, priority: Option<u8>);

    fn set_time_to_live(&mut self, ttl: Option<Duration>);

    /// Whether the producer accepts a pluggable delay strategy
    fn supports_delay_strategy(&self) -> bool {
        false
    }

    fn set_delay_strategy(&mut self, _strategy: DelayStrategy) {}

    async fn send(&self, topic: &Topic, message: Message) -> Result<(), QueueError>;
}
