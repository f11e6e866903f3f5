use crate::*;

use std::time::Duration;

use serde_json::json;
use spool_client::{Process, Queue};

/// FIFO holds regardless of which process issues each call: a worker
/// process produces, the parent consumes in order.
#[tokio::test]
async fn fifo_order_across_processes() {
    let broker = start_broker().await;

    let mut producer = Process::builder(broker.clone(), "queues:produce")
        .arg(json!("work"))
        .arg(json!(["first", "second", "third"]))
        .program(worker_program())
        .build();
    producer.start().await.unwrap();
    producer.join(Some(RESULT_WAIT)).await;
    assert_eq!(producer.exit_code(), Some(0));
    assert_eq!(producer.result(Some(RESULT_WAIT)).await, Some(json!(3)));

    let q = Queue::new(&broker, "work");
    assert_eq!(q.get(Some(RESULT_WAIT)).await, Some(json!("first")));
    assert_eq!(q.get(Some(RESULT_WAIT)).await, Some(json!("second")));
    assert_eq!(q.get(Some(RESULT_WAIT)).await, Some(json!("third")));
}

/// The other direction: parent puts, a worker process gets.
#[tokio::test]
async fn worker_consumes_what_the_parent_put() {
    let broker = start_broker().await;

    let q = Queue::new(&broker, "inbox");
    q.put(json!({ "job": 42 })).await;

    let mut consumer = Process::builder(broker.clone(), "queues:consume")
        .arg(json!("inbox"))
        .program(worker_program())
        .build();
    consumer.start().await.unwrap();
    consumer.join(Some(RESULT_WAIT)).await;

    assert_eq!(
        consumer.result(Some(RESULT_WAIT)).await,
        Some(json!({ "job": 42 }))
    );
}

/// A get with a timeout on an empty queue waits at least that long and
/// comes back with the sentinel, not an error.
#[tokio::test]
async fn empty_queue_get_times_out_to_none() {
    let broker = start_broker().await;
    let q = Queue::new(&broker, "quiet");

    let timeout = Duration::from_millis(500);
    let start = std::time::Instant::now();
    let got = q.get(Some(timeout)).await;
    let elapsed = start.elapsed();

    assert_eq!(got, None);
    assert!(elapsed >= timeout, "returned early: {elapsed:?}");
    // Not meaningfully later either — allow generous slack for scheduling.
    assert!(elapsed < timeout + Duration::from_millis(500));
}

/// A blocked get is released by a put from another connection.
#[tokio::test]
async fn blocked_get_wakes_on_put() {
    let broker = start_broker().await;

    let getter = {
        let q = Queue::new(&broker, "handoff");
        tokio::spawn(async move { q.get(Some(Duration::from_secs(5))).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    Queue::new(&broker, "handoff").put(json!("released")).await;
    assert_eq!(getter.await.unwrap(), Some(json!("released")));
}

/// Queues with different names do not see each other's items.
#[tokio::test]
async fn queues_are_isolated_by_name() {
    let broker = start_broker().await;

    Queue::new(&broker, "a").put(json!(1)).await;
    Queue::new(&broker, "b").put(json!(2)).await;

    assert_eq!(
        Queue::new(&broker, "a").get(Some(RESULT_WAIT)).await,
        Some(json!(1))
    );
    assert_eq!(
        Queue::new(&broker, "b").get(Some(RESULT_WAIT)).await,
        Some(json!(2))
    );
}
