//! Tests for failure records, the in-memory store and the failure log sink.

use super::*;
use crate::adapters::InMemoryFailureLogStorage;
use crate::error::HandlerError;
use crate::events::{EnvelopeExecuteFail, MessageDecodeFail, RepeatFailure};
use crate::message::{EncodedMessage, Message, MessageId};

fn received() -> ReceivedMessage {
    ReceivedMessage::new(
        MessageId::new(),
        Message::from_encoded(EncodedMessage::new("{\"id\":7}".to_string())),
    )
}

fn decode_fail_event() -> TransportEvent {
    let error = crate::error::CodecError::Decode {
        message: "unexpected end of input".to_string(),
    };
    TransportEvent::MessageDecodeFail(MessageDecodeFail {
        message: received(),
        queue: QueueName::new("orders").unwrap(),
        error: ErrorDetails::new("decode_failed", &error),
    })
}

fn repeat_fail_event() -> TransportEvent {
    let error = HandlerError::repeat("downstream busy");
    TransportEvent::EnvelopeFailOnRepeat(RepeatFailure {
        envelope: Envelope::new(serde_json::json!({"id": 7})),
        message: received(),
        queue: QueueName::new("orders").unwrap(),
        attempts: 1,
        max_attempts: 3,
        error: ErrorDetails::new(error.kind(), &error),
    })
}

// ============================================================================
// FailureId Tests
// ============================================================================

#[test]
fn test_failure_id_parses_from_display() {
    let id = FailureId::new();
    let parsed: FailureId = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn test_failure_id_rejects_garbage() {
    match "not-a-ulid".parse::<FailureId>() {
        Err(StorageError::NotFound { id }) => assert_eq!(id, "not-a-ulid"),
        other => panic!("Expected NotFound, got: {:?}", other),
    }
}

// ============================================================================
// FailureRecord Tests
// ============================================================================

#[test]
fn test_record_from_decode_failure_has_no_envelope() {
    let event = decode_fail_event();
    let record = FailureRecord::from_event(&event);

    assert_eq!(record.event_type, EventType::MessageDecodeFail);
    assert_eq!(record.queue_name.as_str(), "orders");
    assert_eq!(record.message, *event.message());
    assert!(record.envelope.is_none());
    assert_eq!(record.attempt, None);
    assert_eq!(record.limit, None);
}

#[test]
fn test_record_from_repeat_failure_keeps_counts() {
    let record = FailureRecord::from_event(&repeat_fail_event());

    assert_eq!(record.event_type, EventType::EnvelopeFailOnRepeat);
    assert_eq!(record.attempt, Some(1));
    assert_eq!(record.limit, Some(3));
    assert_eq!(record.error.kind, "repeat_requested");
    assert!(record.envelope.is_some());
}

#[test]
fn test_record_json_omits_absent_fields() {
    let record = FailureRecord::from_event(&decode_fail_event());
    let json = serde_json::to_value(&record).unwrap();

    assert!(json.get("envelope").is_none());
    assert!(json.get("attempt").is_none());
    assert_eq!(json["event_type"], "MESSAGE_DECODE_FAIL");

    let restored: FailureRecord = serde_json::from_value(json).unwrap();
    assert_eq!(restored, record);
}

// ============================================================================
// Storage and Sink Tests
// ============================================================================

#[tokio::test]
async fn test_in_memory_storage_returns_logged_record() {
    let storage = InMemoryFailureLogStorage::new();
    let record = FailureRecord::from_event(&decode_fail_event());

    let id = storage.log(record.clone()).await.unwrap();

    assert_eq!(id, record.id);
    assert_eq!(storage.get_by_identifier(&id).await.unwrap(), record);
}

#[tokio::test]
async fn test_in_memory_storage_unknown_id_is_not_found() {
    let storage = InMemoryFailureLogStorage::new();

    let result = storage.get_by_identifier(&FailureId::new()).await;

    assert!(matches!(result, Err(StorageError::NotFound { .. })));
}

#[tokio::test]
async fn test_sink_logs_each_event() {
    let storage = InMemoryFailureLogStorage::new();
    let sink = FailureLogSink::new(storage.clone());

    sink.notify(&decode_fail_event()).await.unwrap();
    sink.notify(&repeat_fail_event()).await.unwrap();

    let records = storage.records().unwrap();
    assert_eq!(records.len(), 2);

    let kinds: Vec<EventType> = records.iter().map(|r| r.event_type).collect();
    assert!(kinds.contains(&EventType::MessageDecodeFail));
    assert!(kinds.contains(&EventType::EnvelopeFailOnRepeat));
}

struct BrokenStorage;

#[async_trait]
impl FailureLogStorage for BrokenStorage {
    async fn log(&self, _record: FailureRecord) -> Result<FailureId, StorageError> {
        Err(StorageError::InternalError {
            message: "disk full".to_string(),
        })
    }

    async fn get_by_identifier(&self, id: &FailureId) -> Result<FailureRecord, StorageError> {
        Err(StorageError::NotFound { id: id.to_string() })
    }
}

#[tokio::test]
async fn test_sink_surfaces_storage_errors() {
    let sink = FailureLogSink::new(BrokenStorage);

    let result = sink.notify(&repeat_fail_event()).await;

    assert!(matches!(
        result,
        Err(SinkError::Storage(StorageError::InternalError { .. }))
    ));
}

#[tokio::test]
async fn test_sink_accepts_shared_storage() {
    let storage = Arc::new(InMemoryFailureLogStorage::new());
    let sink = FailureLogSink::new(storage.clone());

    sink.notify(&decode_fail_event()).await.unwrap();

    assert_eq!(sink.storage().records().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sink_records_execute_failure_envelope() {
    let storage = InMemoryFailureLogStorage::new();
    let sink = FailureLogSink::new(storage.clone());
    let error = HandlerError::failed(anyhow::anyhow!("constraint violated"));
    let envelope = Envelope::new(serde_json::json!({"order": 42}));

    sink.notify(&TransportEvent::EnvelopeExecuteFail(EnvelopeExecuteFail {
        envelope: envelope.clone(),
        message: received(),
        queue: QueueName::new("orders").unwrap(),
        error: ErrorDetails::new(error.kind(), &error),
    }))
    .await
    .unwrap();

    let records = storage.records().unwrap();
    assert_eq!(records[0].envelope.as_ref(), Some(&envelope));
    assert_eq!(records[0].error.chain, vec!["constraint violated".to_string()]);
}
