//! Tests for the queue client port types.

use super::*;
use crate::message::{TopicKind, TopicName};

#[test]
fn test_delay_strategy_parsing() {
    assert_eq!(
        "rabbitmq_delay_plugin".parse::<DelayStrategy>().unwrap(),
        DelayStrategy::RabbitMqDelayPlugin
    );
    assert_eq!(
        "RabbitMQ-DLX".parse::<DelayStrategy>().unwrap(),
        DelayStrategy::RabbitMqDlx
    );

    match "redis_sorted_set".parse::<DelayStrategy>() {
        Err(ConfigurationError::UnknownDelayStrategy { value }) => {
            assert_eq!(value, "redis_sorted_set");
        }
        other => panic!("Expected UnknownDelayStrategy, got: {:?}", other),
    }
}

#[test]
fn test_delay_strategy_serde_uses_identifiers() {
    let json = serde_json::to_string(&DelayStrategy::RabbitMqDlx).unwrap();
    assert_eq!(json, "\"rabbitmq_dlx\"");

    let strategy: DelayStrategy = serde_json::from_str("\"rabbitmq_delay_plugin\"").unwrap();
    assert_eq!(strategy, DelayStrategy::RabbitMqDelayPlugin);

    assert!(serde_json::from_str::<DelayStrategy>("\"unknown\"").is_err());
}

#[test]
fn test_default_delay_strategy() {
    assert_eq!(DelayStrategy::default(), DelayStrategy::RabbitMqDelayPlugin);
    assert_eq!(
        DelayStrategy::default().to_string(),
        "rabbitmq_delay_plugin"
    );
}

#[test]
fn test_destination_keeps_queue_order() {
    let destination = Destination::new(
        Topic::new(TopicName::new("messages").unwrap(), TopicKind::Topic),
        vec![
            QueueName::new("high").unwrap(),
            QueueName::new("low").unwrap(),
        ],
    );

    let names: Vec<&str> = destination.queues.iter().map(QueueName::as_str).collect();
    assert_eq!(names, vec!["high", "low"]);
}

/// Producers that do not override the delay strategy hooks ignore them
#[tokio::test]
async fn test_producer_delay_strategy_defaults() {
    struct PlainProducer;

    #[async_trait]
    impl QueueProducer for PlainProducer {
        fn set_delivery_delay(&mut self, _delay: Option<Duration>) {}
        fn set_priority(&mut self, _priority: Option<u8>) {}
        fn set_time_to_live(&mut self, _ttl: Option<Duration>) {}

        async fn send(&self, _topic: &Topic, _message: Message) -> Result<(), QueueError> {
            Ok(())
        }
    }

    let mut producer = PlainProducer;
    assert!(!producer.supports_delay_strategy());
    producer.set_delay_strategy(DelayStrategy::RabbitMqDlx);

    let topic = Topic::new(TopicName::new("messages").unwrap(), TopicKind::Topic);
    let message = Message::from_encoded(crate::message::EncodedMessage::new("x"));
    assert!(producer.send(&topic, message).await.is_ok());
}
