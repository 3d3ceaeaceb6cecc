//! # Transport Options
//!
//! Delivery, destination and repeat settings for a [`QueueTransport`](crate::QueueTransport).
//!
//! Options deserialize from camelCase keys so they can be loaded from TOML,
//! YAML or JSON files:
//!
//! ```yaml
//! receiveTimeout: 1000
//! deliveryDelay: null
//! delayStrategy: rabbitmq_delay_plugin
//! priority: 5
//! timeToLive: 60000
//! topic:
//!   name: messages
//!   kind: topic
//! queue:
//!   - name: messages
//! repeat:
//!   delay: 1000
//!   maxAttempts: 3
//!   backoff:
//!     type: linear
//! ```
//!
//! Environment overlays produce lowercase keys, so every camelCase key also
//! accepts its all-lowercase spelling.
//!
//! All durations are milliseconds. Values of the wrong type are rejected during
//! deserialization; [`TransportOptions::validate`] performs the remaining
//! semantic checks and is run by the transport constructor.

use crate::client::{DelayStrategy, Destination};
use crate::error::ConfigurationError;
use crate::message::{QueueName, Topic, TopicKind, TopicName};
use crate::repeat::{Backoff, RepeatMessage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Default topic and queue name
pub const DEFAULT_DESTINATION_NAME: &str = "messages";

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Options controlling how a transport consumes and publishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct TransportOptions {
    /// Receive timeout in milliseconds; absent or zero polls without blocking
    #[serde(alias = "receivetimeout")]
    pub receive_timeout: Option<u64>,

    /// Static delivery delay in milliseconds applied to every send
    #[serde(alias = "deliverydelay")]
    pub delivery_delay: Option<u64>,

    #[serde(alias = "delaystrategy")]
    pub delay_strategy: Option<DelayStrategy>,

    pub priority: Option<u8>,

    /// Message time-to-live in milliseconds
    #[serde(alias = "timetolive")]
    pub time_to_live: Option<u64>,

    pub topic: TopicOptions,

    /// Queues consumed by `receive`, in processing order
    pub queue: Vec<QueueOptions>,

    pub repeat: RepeatOptions,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            receive_timeout: None,
            delivery_delay: None,
            delay_strategy: Some(DelayStrategy::default()),
            priority: None,
            time_to_live: None,
            topic: TopicOptions::default(),
            queue: vec![QueueOptions::default()],
            repeat: RepeatOptions::default(),
        }
    }
}

/// Topic the transport publishes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopicOptions {
    pub name: String,
    #[serde(alias = "type")]
    pub kind: TopicKind,
}

impl Default for TopicOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_DESTINATION_NAME.to_string(),
            kind: TopicKind::default(),
        }
    }
}

/// A queue consumed by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueOptions {
    pub name: String,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_DESTINATION_NAME.to_string(),
        }
    }
}

impl QueueOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Defaults for repeat requests that do not carry their own delay or limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct RepeatOptions {
    /// Base delay in milliseconds
    pub delay: u64,
    #[serde(alias = "maxattempts")]
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RepeatOptions {
    fn default() -> Self {
        Self {
            delay: 1000,
            max_attempts: 3,
            backoff: Backoff::Linear,
        }
    }
}

impl RepeatOptions {
    /// Build a fresh repeat policy, letting explicit values override the defaults
    pub fn policy(&self, delay: Option<Duration>, max_attempts: Option<u32>) -> RepeatMessage {
        RepeatMessage::new(
            delay.unwrap_or_else(|| Duration::from_millis(self.delay)),
            max_attempts.unwrap_or(self.max_attempts),
        )
        .with_backoff(self.backoff)
    }
}

impl TransportOptions {
    /// Check the options and resolve the configured destination
    pub fn validate(&self) -> Result<Destination, ConfigurationError> {
        let topic_name =
            TopicName::new(self.topic.name.clone()).map_err(|e| ConfigurationError::Invalid {
                key: "topic.name".to_string(),
                message: e.to_string(),
            })?;

        if self.queue.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "queue".to_string(),
            });
        }

        let mut seen = HashSet::new();
        let mut queues = Vec::with_capacity(self.queue.len());
        for (index, queue) in self.queue.iter().enumerate() {
            let name =
                QueueName::new(queue.name.clone()).map_err(|e| ConfigurationError::Invalid {
                    key: format!("queue[{}].name", index),
                    message: e.to_string(),
                })?;

            if !seen.insert(name.clone()) {
                return Err(ConfigurationError::Invalid {
                    key: format!("queue[{}].name", index),
                    message: format!("queue '{}' is listed more than once", name),
                });
            }
            queues.push(name);
        }

        if let Backoff::Exponential {
            multiplier,
            max_delay_ms,
        } = self.repeat.backoff
        {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(ConfigurationError::Invalid {
                    key: "repeat.backoff.multiplier".to_string(),
                    message: format!("must be a finite number >= 1.0, got {}", multiplier),
                });
            }
            if max_delay_ms == Some(0) {
                return Err(ConfigurationError::Invalid {
                    key: "repeat.backoff.maxDelay".to_string(),
                    message: "must be greater than zero when set".to_string(),
                });
            }
        }

        Ok(Destination::new(
            Topic::new(topic_name, self.topic.kind),
            queues,
        ))
    }

    /// Receive timeout handed to the consumer; zero means a single poll
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout.unwrap_or(0))
    }

    pub fn delivery_delay(&self) -> Option<Duration> {
        self.delivery_delay.map(Duration::from_millis)
    }

    pub fn time_to_live(&self) -> Option<Duration> {
        self.time_to_live.map(Duration::from_millis)
    }

    /// Parse options from a JSON value, rejecting unknown keys and wrong types
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigurationError> {
        serde_json::from_value(value).map_err(|e| ConfigurationError::Parsing {
            message: e.to_string(),
        })
    }
}
