//! Tests for transport options.

use super::*;
use serde_json::json;

#[test]
fn test_defaults() {
    let options = TransportOptions::default();

    assert_eq!(options.receive_timeout, None);
    assert_eq!(options.delivery_delay, None);
    assert_eq!(options.delay_strategy, Some(DelayStrategy::RabbitMqDelayPlugin));
    assert_eq!(options.priority, None);
    assert_eq!(options.time_to_live, None);
    assert_eq!(options.topic.name, "messages");
    assert_eq!(options.topic.kind, TopicKind::Topic);
    assert_eq!(options.queue, vec![QueueOptions::new("messages")]);
    assert_eq!(options.repeat, RepeatOptions::default());
    assert_eq!(options.receive_timeout(), Duration::ZERO);
}

#[test]
fn test_empty_document_yields_defaults() {
    let options = TransportOptions::from_json(json!({})).unwrap();
    assert_eq!(options, TransportOptions::default());
}

#[test]
fn test_full_document_parses() {
    let options = TransportOptions::from_json(json!({
        "receiveTimeout": 250,
        "deliveryDelay": 100,
        "delayStrategy": "rabbitmq_dlx",
        "priority": 7,
        "timeToLive": 60000,
        "topic": {"name": "events", "type": "fanout"},
        "queue": [{"name": "high"}, {"name": "low"}],
        "repeat": {"delay": 500, "maxAttempts": 5, "backoff": {"type": "constant"}}
    }))
    .unwrap();

    assert_eq!(options.receive_timeout(), Duration::from_millis(250));
    assert_eq!(options.delivery_delay(), Some(Duration::from_millis(100)));
    assert_eq!(options.delay_strategy, Some(DelayStrategy::RabbitMqDlx));
    assert_eq!(options.priority, Some(7));
    assert_eq!(options.time_to_live(), Some(Duration::from_secs(60)));
    assert_eq!(options.topic.kind, TopicKind::Fanout);
    assert_eq!(options.repeat.max_attempts, 5);
    assert_eq!(options.repeat.backoff, Backoff::Constant);

    let destination = options.validate().unwrap();
    assert_eq!(destination.topic.name.as_str(), "events");
    let queues: Vec<&str> = destination.queues.iter().map(QueueName::as_str).collect();
    assert_eq!(queues, vec!["high", "low"]);
}

#[test]
fn test_null_delay_strategy_disables_strategy() {
    let options = TransportOptions::from_json(json!({"delayStrategy": null})).unwrap();
    assert_eq!(options.delay_strategy, None);
}

#[test]
fn test_wrong_types_are_rejected() {
    for document in [
        json!({"receiveTimeout": "soon"}),
        json!({"deliveryDelay": -5}),
        json!({"priority": 1000}),
        json!({"timeToLive": 1.5}),
        json!({"delayStrategy": "teleport"}),
        json!({"topic": {"name": "t", "kind": "broadcast"}}),
        json!({"queue": "messages"}),
        json!({"unexpected": true}),
    ] {
        match TransportOptions::from_json(document.clone()) {
            Err(ConfigurationError::Parsing { .. }) => {}
            other => panic!("Expected parsing error for {}, got: {:?}", document, other),
        }
    }
}

#[test]
fn test_validate_rejects_empty_queue_list() {
    let options = TransportOptions {
        queue: Vec::new(),
        ..TransportOptions::default()
    };

    match options.validate() {
        Err(ConfigurationError::Missing { key }) => assert_eq!(key, "queue"),
        other => panic!("Expected Missing error, got: {:?}", other),
    }
}

#[test]
fn test_validate_rejects_invalid_names() {
    let options = TransportOptions {
        queue: vec![QueueOptions::new("ok"), QueueOptions::new("not ok")],
        ..TransportOptions::default()
    };
    match options.validate() {
        Err(ConfigurationError::Invalid { key, .. }) => assert_eq!(key, "queue[1].name"),
        other => panic!("Expected Invalid error, got: {:?}", other),
    }

    let options = TransportOptions {
        topic: TopicOptions {
            name: String::new(),
            kind: TopicKind::Direct,
        },
        ..TransportOptions::default()
    };
    match options.validate() {
        Err(ConfigurationError::Invalid { key, .. }) => assert_eq!(key, "topic.name"),
        other => panic!("Expected Invalid error, got: {:?}", other),
    }
}

#[test]
fn test_validate_rejects_duplicate_queues() {
    let options = TransportOptions {
        queue: vec![QueueOptions::new("a"), QueueOptions::new("a")],
        ..TransportOptions::default()
    };

    assert!(matches!(
        options.validate(),
        Err(ConfigurationError::Invalid { .. })
    ));
}

#[test]
fn test_validate_rejects_shrinking_backoff() {
    let mut options = TransportOptions::default();
    options.repeat.backoff = Backoff::Exponential {
        multiplier: 0.5,
        max_delay_ms: None,
    };
    assert!(options.validate().is_err());

    options.repeat.backoff = Backoff::Exponential {
        multiplier: 2.0,
        max_delay_ms: Some(0),
    };
    assert!(options.validate().is_err());

    options.repeat.backoff = Backoff::Exponential {
        multiplier: 2.0,
        max_delay_ms: Some(30_000),
    };
    assert!(options.validate().is_ok());
}

#[test]
fn test_repeat_options_policy_overrides() {
    let repeat = RepeatOptions {
        delay: 200,
        max_attempts: 4,
        backoff: Backoff::Constant,
    };

    let defaulted = repeat.policy(None, None);
    assert_eq!(defaulted.delay(), Duration::from_millis(200));
    assert_eq!(defaulted.max_attempts(), 4);
    assert_eq!(defaulted.backoff(), Backoff::Constant);
    assert_eq!(defaulted.attempts(), 0);

    let explicit = repeat.policy(Some(Duration::from_millis(1000)), Some(3));
    assert_eq!(explicit.delay(), Duration::from_millis(1000));
    assert_eq!(explicit.max_attempts(), 3);
}

#[test]
fn test_lowercase_keys_are_accepted() {
    let options = TransportOptions::from_json(json!({
        "receivetimeout": 10,
        "timetolive": 20,
        "repeat": {"maxattempts": 9}
    }))
    .unwrap();

    assert_eq!(options.receive_timeout, Some(10));
    assert_eq!(options.time_to_live, Some(20));
    assert_eq!(options.repeat.max_attempts, 9);
}
