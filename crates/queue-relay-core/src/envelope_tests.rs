//! Tests for envelopes and their items.

use super::*;
use serde_json::json;
use std::time::Duration;

fn queue(name: &str) -> QueueName {
    QueueName::new(name).unwrap()
}

#[test]
fn test_items_of_distinct_kinds_coexist() {
    let envelope = Envelope::new(json!({"id": 1}))
        .with(RoutingKey::new("orders"))
        .with(SourceQueue::new(queue("inbox")));

    assert_eq!(envelope.routing_key(), Some("orders"));
    assert_eq!(envelope.source_queue(), Some(&queue("inbox")));
    assert_eq!(envelope.items().len(), 2);
}

#[test]
fn test_same_kind_replaces_in_place() {
    let envelope = Envelope::new(json!("payload"))
        .with(RoutingKey::new("first"))
        .with(SourceQueue::new(queue("inbox")))
        .with(RoutingKey::new("second"));

    assert_eq!(envelope.items().len(), 2);
    assert_eq!(envelope.routing_key(), Some("second"));

    // Replacement keeps the original position
    assert_eq!(envelope.items()[0].kind(), ItemKind::RoutingKey);
    assert_eq!(envelope.items()[1].kind(), ItemKind::SourceQueue);
}

#[test]
fn test_with_leaves_original_untouched() {
    let original = Envelope::new(json!({"id": 7})).with(RoutingKey::new("a"));
    let changed = original.with(RoutingKey::new("b"));
    let extended = original.with(RepeatMessage::new(Duration::from_millis(10), 2));

    assert_eq!(original.routing_key(), Some("a"));
    assert!(original.repeat().is_none());
    assert_eq!(changed.routing_key(), Some("b"));
    assert!(extended.repeat().is_some());
    assert_eq!(original.message(), changed.message());
}

#[test]
fn test_without_removes_only_requested_kind() {
    let envelope = Envelope::new(json!(null))
        .with(RoutingKey::new("key"))
        .with(RepeatMessage::new(Duration::from_millis(10), 2));

    let stripped = envelope.without(ItemKind::Repeat);

    assert!(stripped.repeat().is_none());
    assert_eq!(stripped.routing_key(), Some("key"));
    assert!(envelope.repeat().is_some());
}

#[test]
fn test_item_lookup_by_kind() {
    let topic = TopicName::new("audit").unwrap();
    let envelope =
        Envelope::new(json!(1)).with(TransportConfiguration::new().with_topic(topic.clone()));

    match envelope.item(ItemKind::TransportConfiguration) {
        Some(EnvelopeItem::TransportConfiguration(config)) => {
            assert_eq!(config.topic(), Some(&topic));
        }
        other => panic!("Expected transport configuration, got: {:?}", other),
    }
    assert!(envelope.item(ItemKind::RoutingKey).is_none());
}

#[test]
fn test_with_items_applies_replacement_rules() {
    let envelope = Envelope::with_items(
        json!("x"),
        vec![
            RoutingKey::new("one").into(),
            RoutingKey::new("two").into(),
            SourceQueue::new(queue("q")).into(),
        ],
    );

    assert_eq!(envelope.items().len(), 2);
    assert_eq!(envelope.routing_key(), Some("two"));
}

#[test]
fn test_typed_message_access() {
    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct OrderPlaced {
        order_id: u64,
        total_cents: u64,
    }

    let order = OrderPlaced {
        order_id: 42,
        total_cents: 1999,
    };
    let envelope = Envelope::from_message(&order).unwrap();

    assert_eq!(envelope.message_as::<OrderPlaced>().unwrap(), order);
    assert!(envelope.message_as::<Vec<String>>().is_err());
}

#[test]
fn test_envelope_serialization_preserves_items() {
    let envelope = Envelope::new(json!({"id": 3}))
        .with(RoutingKey::new("orders"))
        .with(RepeatMessage::new(Duration::from_millis(500), 3).with_attempts(1))
        .with(TransportConfiguration::new().with_topic(TopicName::new("retry").unwrap()));

    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["items"][0]["kind"], "routing_key");
    assert_eq!(json["items"][1]["kind"], "repeat");
    assert_eq!(json["items"][2]["kind"], "transport_configuration");

    let restored: Envelope = serde_json::from_value(json).unwrap();
    assert_eq!(restored, envelope);
}
