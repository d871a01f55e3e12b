//! Notification bridge integration tests
//!
//! Exercises the single-slot handoff between a monitor-style thread and the
//! Tokio consumer side:
//! - At most one unconsumed event, for all interleavings
//! - FIFO delivery order (depth 1)
//! - Teardown wakes blocked waiters on both sides
//!
//! Run with: `cargo test -p common --test bridge_tests`

use common::test_utils::{DEFAULT_TEST_TIMEOUT, mock_record, with_timeout};
use common::{StorageEvent, event_bridge};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

fn numbered_event(seq: usize) -> StorageEvent {
    StorageEvent::Added(mock_record(0x1d6b, seq as u16, &format!("/dev/sd{seq}")))
}

// ============================================================================
// Backpressure
// ============================================================================

#[tokio::test]
async fn test_never_more_than_one_event_in_flight() {
    const EVENTS: usize = 100;

    let (publisher, consumer) = event_bridge();
    let in_flight = Arc::new(AtomicUsize::new(0));

    let publisher_count = Arc::clone(&in_flight);
    let producer = thread::spawn(move || {
        for seq in 0..EVENTS {
            publisher.wait_until_handled().expect("bridge closed early");

            // Claiming the ack token means the prior event is fully drained;
            // anything else is a backpressure violation.
            let outstanding = publisher_count.fetch_add(1, Ordering::SeqCst);
            assert_eq!(outstanding, 0, "second publish before prior ack");

            publisher.publish(numbered_event(seq)).expect("publish failed");
        }
    });

    let result = with_timeout(DEFAULT_TEST_TIMEOUT, async {
        for _ in 0..EVENTS {
            let event = consumer.next_event().await.expect("event expected");
            assert_eq!(in_flight.load(Ordering::SeqCst), 1);

            // Give the producer a chance to race ahead if it ever could.
            tokio::time::sleep(Duration::from_micros(200)).await;

            drop(event);
            in_flight.fetch_sub(1, Ordering::SeqCst);
            consumer.mark_handled().await.expect("ack failed");
        }
    })
    .await;

    result.expect("consumer loop timed out");
    producer.join().expect("producer panicked");
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_fifo_delivery_order() {
    const EVENTS: usize = 50;

    let (publisher, consumer) = event_bridge();

    let producer = thread::spawn(move || {
        for seq in 0..EVENTS {
            publisher.wait_until_handled().expect("bridge closed early");
            publisher.publish(numbered_event(seq)).expect("publish failed");
        }
    });

    let received = with_timeout(DEFAULT_TEST_TIMEOUT, async {
        let mut received = Vec::with_capacity(EVENTS);
        for _ in 0..EVENTS {
            let event = consumer.next_event().await.expect("event expected");
            received.push(event.record().product_id as usize);
            consumer.mark_handled().await.expect("ack failed");
        }
        received
    })
    .await
    .expect("consumer loop timed out");

    assert_eq!(received, (0..EVENTS).collect::<Vec<_>>());
    producer.join().expect("producer panicked");
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_close_wakes_blocked_publisher() {
    let (publisher, consumer) = event_bridge();

    let shutdown_handle = publisher.clone();
    let producer = thread::spawn(move || {
        publisher.wait_until_handled().expect("first claim must succeed");
        publisher.publish(numbered_event(0)).expect("publish failed");

        // The consumer never acks, so this parks until the bridge closes.
        publisher.wait_until_handled()
    });

    // Take the event but do not acknowledge it.
    let event = with_timeout(DEFAULT_TEST_TIMEOUT, consumer.next_event())
        .await
        .expect("receive timed out")
        .expect("event expected");
    assert_eq!(event.record().dev_node, "/dev/sd0");

    shutdown_handle.close();

    let blocked_result = producer.join().expect("producer panicked");
    assert!(blocked_result.is_err(), "close must wake the blocked waiter");
}

#[tokio::test]
async fn test_close_ends_consumer_without_publisher() {
    let (publisher, consumer) = event_bridge();

    publisher.close();
    drop(publisher);

    let next = with_timeout(DEFAULT_TEST_TIMEOUT, consumer.next_event())
        .await
        .expect("receive timed out");
    assert!(next.is_none());
}

#[tokio::test]
async fn test_mark_handled_fails_after_close() {
    let (publisher, consumer) = event_bridge();

    publisher.close();
    assert!(consumer.mark_handled().await.is_err());
}
