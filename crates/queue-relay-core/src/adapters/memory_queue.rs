//! # In-Memory Queue Backend
//!
//! A broker that lives inside the process. Useful for tests, local development
//! and embedding the transport without a real message broker.
//!
//! Topics are bound to queues by [`QueueContext::ensure_topology`] (or
//! [`InMemoryQueueContext::declare`]). Publishing copies the message into every
//! queue bound to the topic; routing keys are carried on the message but do not
//! filter bindings. Within a queue, available messages are delivered by
//! descending priority and then in publish order.

use crate::client::{DelayStrategy, Destination, QueueConsumer, QueueContext, QueueProducer};
use crate::error::QueueError;
use crate::message::{
    Message, MessageId, QueueName, ReceivedMessage, Timestamp, Topic, TopicName,
};
use async_trait::async_trait;
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

const PROVIDER: &str = "memory";

/// Upper bound on a single wait inside `receive`, so delayed messages become
/// visible without a publish wake-up.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A message recorded by a producer, with the delivery options in effect
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: Topic,
    pub message: Message,
    pub delivery_delay: Option<Duration>,
    pub delay_strategy: Option<DelayStrategy>,
    pub priority: Option<u8>,
    pub time_to_live: Option<Duration>,
}

#[derive(Debug)]
struct StoredMessage {
    message: ReceivedMessage,
    priority: u8,
    available_at: Instant,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<MessageId, StoredMessage>,
    dead_letters: Vec<ReceivedMessage>,
}

impl QueueState {
    /// Remove the next deliverable message, dead-lettering expired ones
    fn take_next(&mut self, now: Instant) -> Option<StoredMessage> {
        let mut index = 0;
        while index < self.ready.len() {
            let expired = self.ready[index]
                .expires_at
                .map(|at| at <= now)
                .unwrap_or(false);
            if expired {
                if let Some(stored) = self.ready.remove(index) {
                    self.dead_letters.push(stored.message);
                }
            } else {
                index += 1;
            }
        }

        let position = self
            .ready
            .iter()
            .enumerate()
            .filter(|(_, stored)| stored.available_at <= now)
            .max_by(|(ia, a), (ib, b)| a.priority.cmp(&b.priority).then(ib.cmp(ia)))
            .map(|(index, _)| index)?;

        self.ready.remove(position)
    }
}

#[derive(Debug, Default)]
struct Broker {
    queues: HashMap<QueueName, QueueState>,
    bindings: HashMap<TopicName, Vec<QueueName>>,
    published: Vec<PublishedMessage>,
    send_failures: VecDeque<QueueError>,
    receive_failures: VecDeque<QueueError>,
    topology_checks: usize,
}

#[derive(Debug, Default)]
struct Shared {
    broker: Mutex<Broker>,
    published: Notify,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, Broker>, QueueError> {
        self.broker.lock().map_err(|_| QueueError::ProviderError {
            provider: PROVIDER.to_string(),
            code: "poisoned".to_string(),
            message: "broker state lock poisoned".to_string(),
        })
    }
}

/// In-process broker implementing [`QueueContext`]
///
/// Clones share the same broker state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueueContext {
    shared: Arc<Shared>,
}

impl InMemoryQueueContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the destination's queues to its topic, creating both as needed
    pub fn declare(&self, destination: &Destination) -> Result<(), QueueError> {
        let mut broker = self.shared.lock()?;

        for queue in &destination.queues {
            broker.queues.entry(queue.clone()).or_default();
        }

        let bound = broker
            .bindings
            .entry(destination.topic.name.clone())
            .or_default();
        for queue in &destination.queues {
            if !bound.contains(queue) {
                bound.push(queue.clone());
            }
        }

        Ok(())
    }

    /// Put a message straight onto a queue, bypassing topics
    pub fn enqueue(&self, queue: &QueueName, message: Message) -> Result<MessageId, QueueError> {
        let id = MessageId::new();
        {
            let mut broker = self.shared.lock()?;
            broker
                .queues
                .entry(queue.clone())
                .or_default()
                .ready
                .push_back(StoredMessage {
                    message: ReceivedMessage::new(id.clone(), message),
                    priority: 0,
                    available_at: Instant::now(),
                    expires_at: None,
                });
        }
        self.shared.published.notify_waiters();
        Ok(id)
    }

    /// Make the next producer `send` fail with `error`
    pub fn fail_next_send(&self, error: QueueError) -> Result<(), QueueError> {
        self.shared.lock()?.send_failures.push_back(error);
        Ok(())
    }

    /// Make the next consumer `receive` fail with `error`
    pub fn fail_next_receive(&self, error: QueueError) -> Result<(), QueueError> {
        self.shared.lock()?.receive_failures.push_back(error);
        Ok(())
    }

    /// Every message accepted by a producer, in send order
    pub fn published(&self) -> Result<Vec<PublishedMessage>, QueueError> {
        Ok(self.shared.lock()?.published.clone())
    }

    /// Messages rejected without requeue or expired on the queue
    pub fn dead_letters(&self, queue: &QueueName) -> Result<Vec<ReceivedMessage>, QueueError> {
        Ok(self
            .shared
            .lock()?
            .queues
            .get(queue)
            .map(|state| state.dead_letters.clone())
            .unwrap_or_default())
    }

    /// Remove and return the publish history
    ///
    /// The history grows with every send; long-running embeddings drain it
    /// periodically.
    pub fn take_published(&self) -> Result<Vec<PublishedMessage>, QueueError> {
        Ok(std::mem::take(&mut self.shared.lock()?.published))
    }

    /// Remove and return the dead letters of a queue
    pub fn take_dead_letters(&self, queue: &QueueName) -> Result<Vec<ReceivedMessage>, QueueError> {
        Ok(self
            .shared
            .lock()?
            .queues
            .get_mut(queue)
            .map(|state| std::mem::take(&mut state.dead_letters))
            .unwrap_or_default())
    }

    /// Messages waiting on the queue, including delayed ones
    pub fn depth(&self, queue: &QueueName) -> Result<usize, QueueError> {
        Ok(self
            .shared
            .lock()?
            .queues
            .get(queue)
            .map(|state| state.ready.len())
            .unwrap_or(0))
    }

    /// Messages delivered but not yet acknowledged or rejected
    pub fn in_flight(&self, queue: &QueueName) -> Result<usize, QueueError> {
        Ok(self
            .shared
            .lock()?
            .queues
            .get(queue)
            .map(|state| state.in_flight.len())
            .unwrap_or(0))
    }

    /// Queues bound to a topic
    pub fn bindings(&self, topic: &TopicName) -> Result<Vec<QueueName>, QueueError> {
        Ok(self
            .shared
            .lock()?
            .bindings
            .get(topic)
            .cloned()
            .unwrap_or_default())
    }

    /// Number of `ensure_topology` calls received
    pub fn topology_checks(&self) -> Result<usize, QueueError> {
        Ok(self.shared.lock()?.topology_checks)
    }
}

#[async_trait]
impl QueueContext for InMemoryQueueContext {
    async fn create_consumer(
        &self,
        queue: &QueueName,
    ) -> Result<Box<dyn QueueConsumer>, QueueError> {
        self.shared.lock()?.queues.entry(queue.clone()).or_default();

        Ok(Box::new(InMemoryConsumer {
            shared: Arc::clone(&self.shared),
            queue: queue.clone(),
        }))
    }

    async fn create_producer(&self) -> Result<Box<dyn QueueProducer>, QueueError> {
        Ok(Box::new(InMemoryProducer {
            shared: Arc::clone(&self.shared),
            delivery_delay: None,
            delay_strategy: None,
            priority: None,
            time_to_live: None,
        }))
    }

    async fn ensure_topology(&self, destination: &Destination) -> Result<(), QueueError> {
        self.shared.lock()?.topology_checks += 1;
        self.declare(destination)
    }

    async fn recover_from_error(&self, error: &QueueError, destination: &Destination) -> bool {
        let recoverable = error.is_transient();
        debug!(
            topic = %destination.topic,
            error = %error,
            recoverable = recoverable,
            "In-memory broker recovery requested"
        );
        recoverable
    }
}

/// Consumer handed out by [`InMemoryQueueContext`]
pub struct InMemoryConsumer {
    shared: Arc<Shared>,
    queue: QueueName,
}

impl InMemoryConsumer {
    fn try_take(&self) -> Result<Option<ReceivedMessage>, QueueError> {
        let mut broker = self.shared.lock()?;

        if let Some(error) = broker.receive_failures.pop_front() {
            return Err(error);
        }

        let state = broker
            .queues
            .get_mut(&self.queue)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: self.queue.to_string(),
            })?;

        let Some(mut stored) = state.take_next(Instant::now()) else {
            return Ok(None);
        };

        stored.message.delivered_at = Timestamp::now();
        let message = stored.message.clone();
        state.in_flight.insert(message.message_id.clone(), stored);
        Ok(Some(message))
    }

    fn settle(
        &self,
        message: &ReceivedMessage,
    ) -> Result<(MutexGuard<'_, Broker>, StoredMessage), QueueError> {
        let mut broker = self.shared.lock()?;

        let stored = broker
            .queues
            .get_mut(&self.queue)
            .and_then(|state| state.in_flight.remove(&message.message_id))
            .ok_or_else(|| QueueError::MessageNotFound {
                message_id: message.message_id.to_string(),
            })?;

        Ok((broker, stored))
    }
}

#[async_trait]
impl QueueConsumer for InMemoryConsumer {
    fn queue(&self) -> &QueueName {
        &self.queue
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<ReceivedMessage>, QueueError> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking so a concurrent publish is not missed
            let published = self.shared.published.notified();

            if let Some(message) = self.try_take()? {
                return Ok(Some(message));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let wait = (deadline - now).min(POLL_INTERVAL);
            let _ = tokio::time::timeout(wait, published).await;
        }
    }

    async fn acknowledge(&self, message: &ReceivedMessage) -> Result<(), QueueError> {
        let _ = self.settle(message)?;
        Ok(())
    }

    async fn reject(&self, message: &ReceivedMessage, requeue: bool) -> Result<(), QueueError> {
        let (mut broker, mut stored) = self.settle(message)?;
        let state = broker.queues.entry(self.queue.clone()).or_default();

        if requeue {
            stored.message.delivery_count = stored.message.delivery_count.saturating_add(1);
            stored.available_at = Instant::now();
            state.ready.push_front(stored);
            drop(broker);
            self.shared.published.notify_waiters();
        } else {
            state.dead_letters.push(stored.message);
        }

        Ok(())
    }
}

/// Producer handed out by [`InMemoryQueueContext`]
pub struct InMemoryProducer {
    shared: Arc<Shared>,
    delivery_delay: Option<Duration>,
    delay_strategy: Option<DelayStrategy>,
    priority: Option<u8>,
    time_to_live: Option<Duration>,
}

#[async_trait]
impl QueueProducer for InMemoryProducer {
    fn set_delivery_delay(&mut self, delay: Option<Duration>) {
        self.delivery_delay = delay;
    }

    fn set_priority(&mut self, priority: Option<u8>) {
        self.priority = priority;
    }

    fn set_time_to_live(&mut self, ttl: Option<Duration>) {
        self.time_to_live = ttl;
    }

    fn supports_delay_strategy(&self) -> bool {
        true
    }

    fn set_delay_strategy(&mut self, strategy: DelayStrategy) {
        self.delay_strategy = Some(strategy);
    }

    async fn send(&self, topic: &Topic, message: Message) -> Result<(), QueueError> {
        {
            let mut broker = self.shared.lock()?;

            if let Some(error) = broker.send_failures.pop_front() {
                return Err(error);
            }

            let queues = broker
                .bindings
                .get(&topic.name)
                .cloned()
                .ok_or_else(|| QueueError::TopicNotFound {
                    topic_name: topic.name.to_string(),
                })?;

            let now = Instant::now();
            let available_at = now + self.delivery_delay.unwrap_or(Duration::ZERO);
            let expires_at = self.time_to_live.map(|ttl| available_at + ttl);

            for queue in &queues {
                broker
                    .queues
                    .entry(queue.clone())
                    .or_default()
                    .ready
                    .push_back(StoredMessage {
                        message: ReceivedMessage::new(MessageId::new(), message.clone()),
                        priority: self.priority.unwrap_or(0),
                        available_at,
                        expires_at,
                    });
            }

            broker.published.push(PublishedMessage {
                topic: topic.clone(),
                message,
                delivery_delay: self.delivery_delay,
                delay_strategy: self.delay_strategy,
                priority: self.priority,
                time_to_live: self.time_to_live,
            });

            debug!(topic = %topic, queues = queues.len(), "Message published");
        }

        self.shared.published.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_queue_tests.rs"]
mod tests;
