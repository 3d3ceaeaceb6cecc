//! Tests for error types.

use super::*;

#[test]
fn test_queue_error_transience() {
    assert!(QueueError::ConnectionFailed {
        message: "broker went away".to_string(),
    }
    .is_transient());

    assert!(QueueError::ChannelClosed {
        message: "channel 3 closed".to_string(),
    }
    .is_transient());

    assert!(QueueError::Timeout {
        duration: Duration::from_secs(1),
    }
    .is_transient());

    assert!(!QueueError::QueueNotFound {
        queue_name: "messages".to_string(),
    }
    .is_transient());

    assert!(!QueueError::MessageTooLarge {
        size: 1000,
        max_size: 500
    }
    .is_transient());
}

#[test]
fn test_handler_error_constructors() {
    match HandlerError::repeat_with("busy", Duration::from_millis(250), 4) {
        HandlerError::Repeat {
            delay,
            max_attempts,
            ..
        } => {
            assert_eq!(delay, Some(Duration::from_millis(250)));
            assert_eq!(max_attempts, Some(4));
        }
        other => panic!("Expected Repeat, got: {:?}", other),
    }

    match HandlerError::repeat("busy") {
        HandlerError::Repeat {
            delay,
            max_attempts,
            ..
        } => {
            assert!(delay.is_none());
            assert!(max_attempts.is_none());
        }
        other => panic!("Expected Repeat, got: {:?}", other),
    }

    assert_eq!(HandlerError::requeue("lock held").kind(), "requeue_requested");
    assert_eq!(
        HandlerError::failed(anyhow::anyhow!("boom")).kind(),
        "handler_failed"
    );
}

#[test]
fn test_handler_failure_keeps_source() {
    let error = HandlerError::failed(std::io::Error::new(
        std::io::ErrorKind::Other,
        "disk full",
    ));

    let source = std::error::Error::source(&error).expect("source should be kept");
    assert_eq!(source.to_string(), "disk full");
}

#[test]
fn test_send_failure_wraps_queue_error() {
    let error = TransportError::SendFailed {
        topic: "messages".to_string(),
        source: QueueError::ConnectionFailed {
            message: "refused".to_string(),
        },
    };

    assert!(error.to_string().contains("messages"));
    let source = std::error::Error::source(&error).expect("source should be kept");
    assert!(source.to_string().contains("refused"));
}
