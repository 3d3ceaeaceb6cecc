//! # Queue Transport
//!
//! Bridges an envelope handler to a message broker.
//!
//! [`QueueTransport::receive`] consumes every configured queue in order, decodes
//! each message into an [`Envelope`], hands it to the [`EnvelopeHandler`] and
//! settles the message according to the outcome:
//!
//! | Handler outcome           | Broker action       | Follow-up                                |
//! |---------------------------|---------------------|------------------------------------------|
//! | `Ok(())`                  | acknowledge         |                                          |
//! | [`HandlerError::Repeat`]  | reject              | re-publish with the next repeat attempt, |
//! |                           |                     | or `ENVELOPE_REACH_REPEAT_LIMIT`         |
//! | [`HandlerError::Requeue`] | reject with requeue |                                          |
//! | [`HandlerError::Failed`]  | reject              | `ENVELOPE_EXECUTE_FAIL`                  |
//! | undecodable message       | reject              | `MESSAGE_DECODE_FAIL`                    |
//!
//! [`QueueTransport::send`] publishes an envelope with the configured delivery
//! options. A repeat policy on the envelope overrides the static delivery delay.
//!
//! Stopping is cooperative: [`QueueTransport::stop`] takes effect before the
//! next poll, never in the middle of handling a message.

use crate::client::{Destination, QueueConsumer, QueueContext, QueueProducer};
use crate::codec::EnvelopeCodec;
use crate::config::TransportOptions;
use crate::envelope::{Envelope, SourceQueue, TransportConfiguration};
use crate::error::{ConfigurationError, HandlerError, QueueError, TransportError};
use crate::events::{
    EnvelopeExecuteFail, ErrorDetails, EventSink, MessageDecodeFail, RepeatFailure,
    TransportEvent,
};
use crate::message::{Message, QueueName, ReceivedMessage, Topic};
use crate::repeat::RepeatMessage;
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

const DECODE_FAILED: &str = "decode_failed";
const SEND_FAILED: &str = "send_failed";

/// Application callback invoked for every poll of the receive loop
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    /// Process one envelope
    ///
    /// `None` means the poll returned no message. Errors returned for a `None`
    /// poll are logged and otherwise ignored.
    async fn handle(&self, envelope: Option<&Envelope>) -> Result<(), HandlerError>;
}

#[async_trait]
impl<T: EnvelopeHandler + ?Sized> EnvelopeHandler for Arc<T> {
    async fn handle(&self, envelope: Option<&Envelope>) -> Result<(), HandlerError> {
        (**self).handle(envelope).await
    }
}

/// Cloneable handle that stops a running receive loop
///
/// Stopping is sticky: once stopped, later `receive` calls return as soon as
/// each queue's consumer has been opened.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the loop to stop after the current iteration; idempotent
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Consumes and publishes envelopes through a [`QueueContext`]
pub struct QueueTransport {
    context: Arc<dyn QueueContext>,
    codec: Arc<dyn EnvelopeCodec>,
    events: Arc<dyn EventSink>,
    options: TransportOptions,
    destination: Destination,
    debug: bool,
    strict_notifications: bool,
    stop: StopHandle,
}

impl QueueTransport {
    /// Create a transport, validating the options before any broker I/O
    ///
    /// In `debug` mode the topology is declared before consuming and before
    /// every send.
    pub fn new(
        context: Arc<dyn QueueContext>,
        codec: Arc<dyn EnvelopeCodec>,
        events: Arc<dyn EventSink>,
        options: TransportOptions,
        debug: bool,
    ) -> Result<Self, ConfigurationError> {
        let destination = options.validate()?;

        Ok(Self {
            context,
            codec,
            events,
            options,
            destination,
            debug,
            strict_notifications: false,
            stop: StopHandle::new(),
        })
    }

    /// Make event sink failures end the receive loop
    pub fn with_strict_notifications(mut self, strict: bool) -> Self {
        self.strict_notifications = strict;
        self
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stop the receive loop before its next poll
    pub fn stop(&self) {
        info!("Transport stop requested");
        self.stop.stop();
    }

    /// Resolve where an envelope is published
    ///
    /// A [`TransportConfiguration`] item with a topic overrides the configured
    /// topic name; the topic kind and queues always come from the options.
    pub fn destination(&self, envelope: Option<&Envelope>) -> Destination {
        let mut destination = self.destination.clone();

        if let Some(topic) = envelope
            .and_then(|e| e.get::<TransportConfiguration>())
            .and_then(TransportConfiguration::topic)
        {
            destination.topic = Topic::new(topic.clone(), destination.topic.kind);
        }

        destination
    }

    // ------------------------------------------------------------------------
    // Receive path
    // ------------------------------------------------------------------------

    /// Consume the configured queues until stopped
    ///
    /// Queues are processed one at a time in configuration order. Returns an
    /// error only for queue failures the recovery hook declines, or for sink
    /// failures when strict notifications are enabled.
    pub async fn receive(&self, handler: &dyn EnvelopeHandler) -> Result<(), TransportError> {
        let timeout = self.options.receive_timeout();

        for queue in &self.destination.queues {
            let consumer = self.open_consumer(queue).await?;

            info!(
                queue = %queue,
                timeout_ms = timeout.as_millis() as u64,
                "Consuming queue"
            );

            while !self.stop.is_stopped() {
                self.poll(consumer.as_ref(), queue, timeout, handler).await?;
            }

            info!(queue = %queue, "Stopped consuming queue");
        }

        Ok(())
    }

    async fn open_consumer(
        &self,
        queue: &QueueName,
    ) -> Result<Box<dyn QueueConsumer>, TransportError> {
        let consumer = loop {
            match self.context.create_consumer(queue).await {
                Ok(consumer) => break consumer,
                Err(e) => self.recover(e, queue).await?,
            }
        };

        if self.debug {
            while let Err(e) = self.context.ensure_topology(&self.destination).await {
                self.recover(e, queue).await?;
            }
        }

        Ok(consumer)
    }

    /// One iteration of the receive loop
    async fn poll(
        &self,
        consumer: &dyn QueueConsumer,
        queue: &QueueName,
        timeout: Duration,
        handler: &dyn EnvelopeHandler,
    ) -> Result<(), TransportError> {
        let message = match consumer.receive(timeout).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                if let Err(e) = handler.handle(None).await {
                    warn!(queue = %queue, error = %e, "Handler failed on empty poll");
                }
                return Ok(());
            }
            Err(e) => return self.recover(e, queue).await,
        };

        debug!(
            queue = %queue,
            message_id = %message.message_id,
            delivery_count = message.delivery_count,
            "Message received"
        );

        let envelope = match self.codec.decode(message.encoded()) {
            Ok(envelope) => envelope.with(SourceQueue::new(queue.clone())),
            Err(e) => {
                warn!(
                    queue = %queue,
                    message_id = %message.message_id,
                    error = %e,
                    "Message could not be decoded"
                );
                self.settle(consumer.reject(&message, false).await, queue)
                    .await?;

                return self
                    .notify(TransportEvent::MessageDecodeFail(MessageDecodeFail {
                        message,
                        queue: queue.clone(),
                        error: ErrorDetails::new(DECODE_FAILED, &e),
                    }))
                    .await;
            }
        };

        let error = match handler.handle(Some(&envelope)).await {
            Ok(()) => {
                debug!(queue = %queue, message_id = %message.message_id, "Message processed");
                return self
                    .settle(consumer.acknowledge(&message).await, queue)
                    .await;
            }
            Err(error) => error,
        };

        match &error {
            HandlerError::Repeat {
                delay,
                max_attempts,
                ..
            } => {
                self.settle(consumer.reject(&message, false).await, queue)
                    .await?;

                let policy = envelope
                    .repeat()
                    .cloned()
                    .unwrap_or_else(|| self.options.repeat.policy(*delay, *max_attempts));

                self.repeat(&envelope, message, queue, policy, &error).await
            }
            HandlerError::Requeue { reason } => {
                debug!(
                    queue = %queue,
                    message_id = %message.message_id,
                    reason = %reason,
                    "Requeueing message"
                );
                self.settle(consumer.reject(&message, true).await, queue).await
            }
            HandlerError::Failed(_) => {
                warn!(
                    queue = %queue,
                    message_id = %message.message_id,
                    error = %error,
                    "Handler failed"
                );
                self.settle(consumer.reject(&message, false).await, queue)
                    .await?;

                self.notify(TransportEvent::EnvelopeExecuteFail(EnvelopeExecuteFail {
                    envelope,
                    message,
                    queue: queue.clone(),
                    error: ErrorDetails::new(error.kind(), &error),
                }))
                .await
            }
        }
    }

    /// Re-publish an envelope whose handler asked for a repeat
    async fn repeat(
        &self,
        envelope: &Envelope,
        message: ReceivedMessage,
        queue: &QueueName,
        policy: RepeatMessage,
        error: &HandlerError,
    ) -> Result<(), TransportError> {
        let attempts = policy.attempts();
        let max_attempts = policy.max_attempts();

        if !policy.is_repeatable() {
            warn!(
                queue = %queue,
                message_id = %message.message_id,
                attempts = attempts,
                max_attempts = max_attempts,
                "Repeat limit reached"
            );

            return self
                .notify(TransportEvent::EnvelopeReachRepeatLimit(RepeatFailure {
                    envelope: envelope.clone(),
                    message,
                    queue: queue.clone(),
                    attempts,
                    max_attempts,
                    error: ErrorDetails::new(error.kind(), error),
                }))
                .await;
        }

        let next = policy.next_attempt();
        debug!(
            queue = %queue,
            message_id = %message.message_id,
            attempt = next.attempts(),
            max_attempts = max_attempts,
            delay_ms = next.next_delay().as_millis() as u64,
            "Scheduling repeat"
        );

        match self.send(&envelope.with(next)).await {
            Ok(()) => Ok(()),
            Err(send_error) => {
                warn!(
                    queue = %queue,
                    message_id = %message.message_id,
                    error = %send_error,
                    "Repeat could not be published"
                );

                self.notify(TransportEvent::EnvelopeFailOnRepeat(RepeatFailure {
                    envelope: envelope.clone(),
                    message,
                    queue: queue.clone(),
                    attempts,
                    max_attempts,
                    error: ErrorDetails::new(SEND_FAILED, &send_error),
                }))
                .await
            }
        }
    }

    /// Pass an acknowledge or reject result through the recovery hook
    async fn settle(
        &self,
        result: Result<(), QueueError>,
        queue: &QueueName,
    ) -> Result<(), TransportError> {
        match result {
            Ok(()) => Ok(()),
            Err(e) => self.recover(e, queue).await,
        }
    }

    /// `Ok` when the broker recovered and the loop may continue
    async fn recover(&self, error: QueueError, queue: &QueueName) -> Result<(), TransportError> {
        if self
            .context
            .recover_from_error(&error, &self.destination)
            .await
        {
            warn!(queue = %queue, error = %error, "Recovered from queue error");
            return Ok(());
        }

        error!(queue = %queue, error = %error, "Unrecoverable queue error");
        Err(TransportError::Queue {
            queue: queue.to_string(),
            source: error,
        })
    }

    async fn notify(&self, event: TransportEvent) -> Result<(), TransportError> {
        let Err(source) = self.events.notify(&event).await else {
            return Ok(());
        };

        if self.strict_notifications {
            error!(
                event_type = %event.event_type(),
                error = %source,
                "Event sink failed"
            );
            return Err(TransportError::Notification {
                event_type: event.event_type().to_string(),
                source,
            });
        }

        warn!(
            event_type = %event.event_type(),
            error = %source,
            "Event sink failed; continuing"
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Send path
    // ------------------------------------------------------------------------

    /// Encode and publish an envelope
    ///
    /// Failed publishes are retried for as long as the recovery hook reports
    /// the broker as recovered.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let destination = self.destination(Some(envelope));

        loop {
            match self.publish(envelope, &destination).await {
                Ok(()) => return Ok(()),
                Err(PublishError::Encode(e)) => return Err(TransportError::Encode(e)),
                Err(PublishError::Queue(e)) => {
                    if !self.context.recover_from_error(&e, &destination).await {
                        error!(topic = %destination.topic, error = %e, "Send failed");
                        return Err(TransportError::SendFailed {
                            topic: destination.topic.name.to_string(),
                            source: e,
                        });
                    }

                    warn!(topic = %destination.topic, error = %e, "Retrying send after recovery");
                }
            }
        }
    }

    async fn publish(
        &self,
        envelope: &Envelope,
        destination: &Destination,
    ) -> Result<(), PublishError> {
        if self.debug {
            self.context.ensure_topology(destination).await?;
        }

        let encoded = self.codec.encode(envelope).map_err(PublishError::Encode)?;
        let mut message = Message::from_encoded(encoded);
        if let Some(routing_key) = envelope.routing_key() {
            message = message.with_routing_key(routing_key);
        }

        let mut producer = self.context.create_producer().await?;

        if let Some(delay) = self.options.delivery_delay() {
            self.apply_delay(producer.as_mut(), delay);
        }
        producer.set_priority(self.options.priority);
        producer.set_time_to_live(self.options.time_to_live());

        if let Some(repeat) = envelope.repeat() {
            self.apply_delay(producer.as_mut(), repeat.next_delay());
        }

        producer.send(&destination.topic, message).await?;

        debug!(topic = %destination.topic, "Envelope sent");
        Ok(())
    }

    fn apply_delay(&self, producer: &mut dyn QueueProducer, delay: Duration) {
        producer.set_delivery_delay(Some(delay));

        if let Some(strategy) = self.options.delay_strategy {
            if producer.supports_delay_strategy() {
                producer.set_delay_strategy(strategy);
            }
        }
    }
}

/// Failure of a single publish attempt
enum PublishError {
    Encode(crate::error::CodecError),
    Queue(QueueError),
}

impl From<QueueError> for PublishError {
    fn from(error: QueueError) -> Self {
        Self::Queue(error)
    }
}
