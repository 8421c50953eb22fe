//! Tests for request parsing, wire shapes and health checking.

use super::*;
use lean_queue_core::{
    ClaimRequest, InMemoryMessageStore, LeaseGrant, ConsumerId, Payload, QueueError, QueueName,
    QueueResult,
};
use std::time::Duration;

fn params(pairs: &[(&str, &str)]) -> ReserveNextParams {
    let mut p = ReserveNextParams::default();
    for (key, value) in pairs {
        let value = Some(value.to_string());
        match *key {
            "queue_name" => p.queue_name = value,
            "limit" => p.limit = value,
            "reserved_by" => p.reserved_by = value,
            "reserve_by_seconds" => p.reserve_by_seconds = value,
            "reserved_info" => p.reserved_info = value,
            other => panic!("unknown param {other}"),
        }
    }
    p
}

mod reserve_params_tests {
    use super::*;

    /// Verify that all parameters are carried into the request
    #[test]
    fn test_full_params() {
        let request = params(&[
            ("queue_name", "jobs"),
            ("reserved_by", "w1"),
            ("limit", "5"),
            ("reserve_by_seconds", "30"),
            ("reserved_info", "note"),
        ])
        .into_request()
        .expect("valid");

        assert_eq!(request.queue_name, "jobs");
        assert_eq!(request.consumer_id, "w1");
        assert_eq!(request.limit, Some(5));
        assert_eq!(request.lease_seconds, Some(30));
        assert_eq!(request.reserved_info.as_deref(), Some("note"));
    }

    /// Verify that empty numeric values are treated as absent
    #[test]
    fn test_empty_numbers_are_absent() {
        let request = params(&[
            ("queue_name", "jobs"),
            ("reserved_by", "w1"),
            ("limit", ""),
            ("reserve_by_seconds", ""),
        ])
        .into_request()
        .expect("valid");

        assert_eq!(request.limit, None);
        assert_eq!(request.lease_seconds, None);
    }

    /// Verify that an explicit zero lease is preserved
    #[test]
    fn test_zero_lease_preserved() {
        let request = params(&[
            ("queue_name", "jobs"),
            ("reserved_by", "w1"),
            ("reserve_by_seconds", "0"),
        ])
        .into_request()
        .expect("valid");

        assert_eq!(request.lease_seconds, Some(0));
    }

    /// Verify that missing required parameters are named in the error
    #[test]
    fn test_missing_required() {
        let no_queue = params(&[("reserved_by", "w1")]).into_request();
        let blank_consumer = params(&[("queue_name", "jobs"), ("reserved_by", " ")]).into_request();

        assert!(matches!(
            no_queue,
            Err(ApiError::MissingParameter { ref name }) if name == "queue_name"
        ));
        assert!(matches!(
            blank_consumer,
            Err(ApiError::MissingParameter { ref name }) if name == "reserved_by"
        ));
    }

    /// Verify that non-numeric and negative numbers are rejected by name
    #[test]
    fn test_invalid_numbers() {
        let bad_limit = params(&[("queue_name", "jobs"), ("reserved_by", "w1"), ("limit", "ten")])
            .into_request();
        let negative_lease = params(&[
            ("queue_name", "jobs"),
            ("reserved_by", "w1"),
            ("reserve_by_seconds", "-5"),
        ])
        .into_request();

        assert!(matches!(
            bad_limit,
            Err(ApiError::InvalidParameter { ref name, .. }) if name == "limit"
        ));
        assert!(matches!(
            negative_lease,
            Err(ApiError::InvalidParameter { ref name, .. }) if name == "reserve_by_seconds"
        ));
    }

    /// Verify list limit parsing
    #[test]
    fn test_list_limit() {
        let absent = ListMessagesParams::default();
        let present = ListMessagesParams {
            limit: Some("7".to_string()),
        };
        let invalid = ListMessagesParams {
            limit: Some("x".to_string()),
        };

        assert_eq!(absent.limit().expect("ok"), None);
        assert_eq!(present.limit().expect("ok"), Some(7));
        assert!(invalid.limit().is_err());
    }
}

mod wire_tests {
    use super::*;

    /// Verify that an unleased message serializes with null reservation fields
    #[test]
    fn test_unleased_message_shape() {
        let message = Message::new(
            QueueName::new("jobs").expect("valid"),
            Payload::new("x").expect("valid"),
            Timestamp::parse("2024-01-01 00:00:00.000000").expect("valid"),
        );

        let json = serde_json::to_value(MessageResponse::from(&message)).expect("serialize");

        assert_eq!(json["queue_name"], "jobs");
        assert_eq!(json["message"], "x");
        assert_eq!(json["published_at"], "2024-01-01 00:00:00.000000");
        assert!(json["reserved_at"].is_null());
        assert!(json["reserved_by"].is_null());
        assert_eq!(json["reserved_count"], 0);
        assert!(json["reserve_expires"].is_null());
    }

    /// Verify that a leased message carries every reservation field
    #[test]
    fn test_leased_message_shape() {
        let mut message = Message::new(
            QueueName::new("jobs").expect("valid"),
            Payload::new("x").expect("valid"),
            Timestamp::parse("2024-01-01 00:00:00.000000").expect("valid"),
        );
        let grant = LeaseGrant::new(
            ConsumerId::new("w1").expect("valid"),
            Some("info".to_string()),
            Timestamp::parse("2024-01-01 00:00:01.500000").expect("valid"),
            Duration::from_secs(5),
        )
        .expect("grant");
        message.grant_lease(&grant).expect("lease");

        let json = serde_json::to_value(MessageResponse::from(&message)).expect("serialize");

        assert_eq!(json["reserved_at"], "2024-01-01 00:00:01.500000");
        assert_eq!(json["reserved_by"], "w1");
        assert_eq!(json["reserved_count"], 1);
        assert_eq!(json["reserved_info"], "info");
        assert_eq!(json["reserve_expires"], "2024-01-01 00:00:06.500000");
    }

    /// Verify confirmation bodies
    #[test]
    fn test_confirmation_bodies() {
        let id = MessageId::new();

        let published = serde_json::to_value(PublishResponse::new(id)).expect("serialize");
        let removed = serde_json::to_value(RemoveResponse::new(id, false)).expect("serialize");

        assert_eq!(published["status"], "published");
        assert_eq!(published["message_id"], id.to_string());
        assert_eq!(removed["status"], "removed");
        assert_eq!(removed["existed"], false);
    }
}

mod health_tests {
    use super::*;

    struct DownStore;

    #[async_trait::async_trait]
    impl MessageStore for DownStore {
        async fn insert(&self, _message: &Message) -> QueueResult<()> {
            Err(QueueError::storage("down"))
        }
        async fn claim_batch(&self, _request: &ClaimRequest) -> QueueResult<Vec<Message>> {
            Err(QueueError::storage("down"))
        }
        async fn list_pending(&self, _q: &QueueName, _limit: u32) -> QueueResult<Vec<Message>> {
            Err(QueueError::storage("down"))
        }
        async fn get(&self, _id: &MessageId) -> QueueResult<Option<Message>> {
            Err(QueueError::storage("down"))
        }
        async fn delete(&self, _id: &MessageId) -> QueueResult<bool> {
            Err(QueueError::storage("down"))
        }
        async fn health_check(&self) -> QueueResult<()> {
            Err(QueueError::storage("connection refused"))
        }
    }

    /// Verify that a reachable store reports healthy on the deep check
    #[tokio::test]
    async fn test_deep_health_with_reachable_store() {
        let checker = StoreHealthChecker::new(Arc::new(InMemoryMessageStore::new()));

        let status = checker.check_deep_health().await;

        assert!(status.is_healthy);
        assert!(status.checks["message_store"].healthy);
    }

    /// Verify that an unreachable store fails only the deep check
    #[tokio::test]
    async fn test_unreachable_store() {
        let checker = StoreHealthChecker::new(Arc::new(DownStore));

        let basic = checker.check_basic_health().await;
        let deep = checker.check_deep_health().await;

        assert!(basic.is_healthy);
        assert!(!deep.is_healthy);
        assert!(deep.checks["message_store"]
            .message
            .contains("connection refused"));
    }
}
