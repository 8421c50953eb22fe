//! Integration tests for the lease protocol through the queue service

mod common;

use common::EPOCH;
use lean_queue_core::{
    InMemoryMessageStore, ManualClock, MessageId, MessageStore, QueueError, QueueService,
    ReserveRequest, Timestamp,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn service() -> (QueueService, ManualClock) {
    let store: Arc<dyn MessageStore> = Arc::new(InMemoryMessageStore::new());
    let clock = ManualClock::new(Timestamp::parse(EPOCH).expect("valid epoch"));
    let queue = QueueService::new(store).with_clock(Arc::new(clock.clone()));
    (queue, clock)
}

/// Verify that concurrent reservations never hand out the same message twice
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reservations_are_disjoint() {
    // Arrange
    let (queue, _clock) = service();
    for i in 0..200 {
        queue
            .publish("jobs", &format!("job-{}", i))
            .await
            .expect("publish");
    }

    // Act
    let mut handles = Vec::new();
    for worker in 0..16 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            loop {
                let batch = queue
                    .reserve_next(
                        ReserveRequest::new("jobs", format!("w{}", worker))
                            .with_limit(7)
                            .with_lease_seconds(600),
                    )
                    .await
                    .expect("reserve");
                if batch.is_empty() {
                    break;
                }
                claimed.extend(batch.iter().map(|m| *m.id()));
            }
            claimed
        }));
    }

    let mut all: Vec<MessageId> = Vec::new();
    for handle in handles {
        all.extend(handle.await.expect("worker task"));
    }

    // Assert
    let unique: HashSet<MessageId> = all.iter().copied().collect();
    assert_eq!(all.len(), 200, "every message claimed exactly once");
    assert_eq!(unique.len(), 200);
}

/// Verify that a zero second lease is reclaimable by another consumer
#[tokio::test]
async fn test_zero_lease_is_reclaimable() {
    // Arrange
    let (queue, clock) = service();
    let id = queue.publish("jobs", "x").await.expect("publish");
    let first = queue
        .reserve_next(ReserveRequest::new("jobs", "w1").with_lease_seconds(0))
        .await
        .expect("reserve");
    assert_eq!(first.len(), 1);

    // Act
    clock.advance(Duration::from_micros(1));
    let second = queue
        .reserve_next(ReserveRequest::new("jobs", "w2"))
        .await
        .expect("reserve");

    // Assert
    assert_eq!(second.len(), 1);
    assert_eq!(*second[0].id(), id);
    assert_eq!(
        second[0]
            .reservation()
            .map(|r| r.reserved_by.as_str().to_string()),
        Some("w2".to_string())
    );
}

/// Verify that an active lease hides the message from other consumers
#[tokio::test]
async fn test_active_lease_hides_message() {
    // Arrange
    let (queue, clock) = service();
    queue.publish("jobs", "x").await.expect("publish");
    queue
        .reserve_next(ReserveRequest::new("jobs", "w1").with_lease_seconds(30))
        .await
        .expect("reserve");

    // Act
    clock.advance(Duration::from_secs(29));
    let during = queue
        .reserve_next(ReserveRequest::new("jobs", "w2"))
        .await
        .expect("reserve");
    clock.advance(Duration::from_secs(2));
    let after = queue
        .reserve_next(ReserveRequest::new("jobs", "w2"))
        .await
        .expect("reserve");

    // Assert
    assert!(during.is_empty());
    assert_eq!(after.len(), 1);
}

/// Verify that N claims through repeated expiry leave a count of N
#[tokio::test]
async fn test_reservation_count_is_monotonic() {
    // Arrange
    let (queue, clock) = service();
    let id = queue.publish("jobs", "x").await.expect("publish");

    // Act
    let mut counts = Vec::new();
    for attempt in 0..5 {
        let batch = queue
            .reserve_next(
                ReserveRequest::new("jobs", format!("w{}", attempt)).with_lease_seconds(10),
            )
            .await
            .expect("reserve");
        assert_eq!(batch.len(), 1);
        counts.push(batch[0].reserved_count());
        clock.advance(Duration::from_secs(11));
    }

    // Assert
    assert_eq!(counts, vec![1, 2, 3, 4, 5]);
    let stored = queue.get(&id).await.expect("get").expect("present");
    assert_eq!(stored.reserved_count(), 5);
}

/// Verify first-in-first-out order within one queue
#[tokio::test]
async fn test_fifo_within_queue() {
    // Arrange
    let (queue, clock) = service();
    let a = queue.publish("jobs", "A").await.expect("publish");
    clock.advance(Duration::from_millis(1));
    let b = queue.publish("jobs", "B").await.expect("publish");
    clock.advance(Duration::from_millis(1));
    let c = queue.publish("jobs", "C").await.expect("publish");

    // Act
    let batch = queue
        .reserve_next(ReserveRequest::new("jobs", "w1").with_limit(3))
        .await
        .expect("reserve");

    // Assert
    let ids: Vec<MessageId> = batch.iter().map(|m| *m.id()).collect();
    assert_eq!(ids, vec![a, b, c]);
}

/// Verify that messages published at the same instant keep publish order
#[tokio::test]
async fn test_fifo_with_identical_timestamps() {
    // Arrange
    let (queue, _clock) = service();
    let mut published = Vec::new();
    for name in ["A", "B", "C", "D"] {
        published.push(queue.publish("jobs", name).await.expect("publish"));
    }

    // Act
    let batch = queue
        .reserve_next(ReserveRequest::new("jobs", "w1").with_limit(10))
        .await
        .expect("reserve");

    // Assert
    let ids: Vec<MessageId> = batch.iter().map(|m| *m.id()).collect();
    assert_eq!(ids, published);
}

/// Verify that claims are scoped to one queue
#[tokio::test]
async fn test_queues_are_independent() {
    // Arrange
    let (queue, _clock) = service();
    queue.publish("emails", "e").await.expect("publish");
    let job = queue.publish("jobs", "j").await.expect("publish");

    // Act
    let batch = queue
        .reserve_next(ReserveRequest::new("jobs", "w1").with_limit(10))
        .await
        .expect("reserve");

    // Assert
    assert_eq!(batch.len(), 1);
    assert_eq!(*batch[0].id(), job);
}

/// Verify that removing twice succeeds both times
#[tokio::test]
async fn test_remove_is_idempotent() {
    // Arrange
    let (queue, _clock) = service();
    let id = queue.publish("jobs", "x").await.expect("publish");

    // Act
    let first = queue.remove(&id).await;
    let second = queue.remove(&id).await;

    // Assert
    assert!(matches!(first, Ok(true)));
    assert!(matches!(second, Ok(false)));
}

/// Verify that validation failures never reach the store
#[tokio::test]
async fn test_validation_rejects_before_storage() {
    // Arrange
    let (queue, _clock) = service();

    // Act
    let empty_queue = queue.publish("", "x").await;
    let empty_payload = queue.publish("jobs", "").await;
    let empty_consumer = queue.reserve_next(ReserveRequest::new("jobs", "")).await;

    // Assert
    assert!(matches!(empty_queue, Err(QueueError::InvalidArgument(_))));
    assert!(matches!(empty_payload, Err(QueueError::InvalidArgument(_))));
    assert!(matches!(empty_consumer, Err(QueueError::InvalidArgument(_))));
    let listed = queue.list_pending("jobs", Some(10)).await.expect("list");
    assert!(listed.is_empty());
}
