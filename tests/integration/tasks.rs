use crate::*;

use std::time::Duration;

use serde_json::json;
use spool_client::Process;
use spool_core::task::{is_exception, TaskDescriptor};

/// A worker with nothing assigned gets `task: null` and exits 0 without
/// running anything.
#[tokio::test]
async fn worker_with_no_task_exits_zero() {
    let broker = start_broker().await;

    let status = tokio::process::Command::new(worker_program())
        .arg(broker.host())
        .arg(broker.port().to_string())
        .arg("never-assigned")
        .status()
        .await
        .expect("worker should spawn");

    assert_eq!(status.code(), Some(0));
    assert_eq!(broker.unclaimed_results(), 0, "no result should be reported");
}

#[tokio::test]
async fn square_task_round_trips_through_a_real_process() {
    let broker = start_broker().await;

    let mut p = Process::builder(broker.clone(), "math:square")
        .arg(json!(7))
        .program(worker_program())
        .build();
    p.start().await.expect("start should succeed");
    assert!(p.is_alive() || p.exit_code().is_some());

    p.join(Some(RESULT_WAIT)).await;
    assert_eq!(p.exit_code(), Some(0));
    assert!(!p.is_alive());

    let result = p.result(Some(RESULT_WAIT)).await;
    assert_eq!(result, Some(json!(49)));
}

#[tokio::test]
async fn kwargs_reach_the_task() {
    let broker = start_broker().await;

    let mut p = Process::builder(broker.clone(), "math:add")
        .arg(json!(2))
        .arg(json!(3))
        .kwarg("offset", json!(100))
        .program(worker_program())
        .build();
    p.start().await.unwrap();
    p.join(Some(RESULT_WAIT)).await;

    assert_eq!(p.result(Some(RESULT_WAIT)).await, Some(json!(105)));
}

/// The dotted spec form resolves the same function.
#[tokio::test]
async fn dotted_spec_form_is_accepted() {
    let broker = start_broker().await;

    let mut p = Process::builder(broker.clone(), "math.square")
        .arg(json!(4))
        .program(worker_program())
        .build();
    p.start().await.unwrap();
    p.join(Some(RESULT_WAIT)).await;

    assert_eq!(p.result(Some(RESULT_WAIT)).await, Some(json!(16)));
}

#[tokio::test]
async fn serialized_target_goes_through_the_call_file() {
    let broker = start_broker().await;

    let mut p = Process::builder(broker.clone(), "math:square")
        .arg(json!(6))
        .serialized()
        .program(worker_program())
        .build();
    p.start().await.unwrap();
    p.join(Some(RESULT_WAIT)).await;

    assert_eq!(p.exit_code(), Some(0));
    assert_eq!(p.result(Some(RESULT_WAIT)).await, Some(json!(36)));
}

/// A failing task surfaces as data: the `__exception__` shape, a matching
/// error type, a non-empty trace, and worker exit code 1.
#[tokio::test]
async fn failing_task_reports_exception_and_exit_code_one() {
    let broker = start_broker().await;

    let mut p = Process::builder(broker.clone(), "errors:boom")
        .program(worker_program())
        .build();
    p.start().await.unwrap();
    p.join(Some(RESULT_WAIT)).await;
    assert_eq!(p.exit_code(), Some(1));

    let result = p
        .result(Some(RESULT_WAIT))
        .await
        .expect("a failure still produces a result");
    assert!(is_exception(&result));
    assert!(result["type"].as_str().unwrap().contains("boom"));
    assert!(!result["trace"].as_str().unwrap().is_empty());
}

/// Assigning twice before any worker asks leaves only the second task.
#[tokio::test]
async fn second_assignment_overwrites_the_first() {
    let broker = start_broker().await;

    broker.assign(
        "w-reassigned",
        TaskDescriptor::importable("math:square").with_args(vec![json!(2)]),
    );
    broker.assign(
        "w-reassigned",
        TaskDescriptor::importable("math:cube").with_args(vec![json!(2)]),
    );

    let status = tokio::process::Command::new(worker_program())
        .arg(broker.host())
        .arg(broker.port().to_string())
        .arg("w-reassigned")
        .status()
        .await
        .expect("worker should spawn");
    assert_eq!(status.code(), Some(0));

    let result = broker.get_result("w-reassigned", Some(RESULT_WAIT)).await;
    assert_eq!(result, Some(json!(8)), "the cube task must win");
}

/// Results are delivered to exactly one caller.
#[tokio::test]
async fn result_is_delivered_at_most_once() {
    let broker = start_broker().await;

    let mut p = Process::builder(broker.clone(), "math:square")
        .arg(json!(3))
        .program(worker_program())
        .build();
    p.start().await.unwrap();
    p.join(Some(RESULT_WAIT)).await;

    assert_eq!(p.result(Some(RESULT_WAIT)).await, Some(json!(9)));
    assert_eq!(
        p.result(Some(Duration::from_millis(200))).await,
        None,
        "second poll must see nothing"
    );
}

/// terminate() is best-effort and leaves the handle usable.
#[tokio::test]
async fn terminate_kills_a_running_worker() {
    let broker = start_broker().await;

    // queues:consume with a long timeout keeps the worker alive until we
    // terminate it.
    let mut p = Process::builder(broker.clone(), "queues:consume")
        .arg(json!("nobody-writes-here"))
        .kwarg("timeout_ms", json!(30_000))
        .program(worker_program())
        .build();
    p.start().await.unwrap();

    // Give it a moment to actually start waiting.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(p.is_alive());

    p.terminate();
    p.join(Some(RESULT_WAIT)).await;
    assert!(!p.is_alive());
    // Killed, not exited: no result ever arrives.
    assert_eq!(p.result(Some(Duration::from_millis(200))).await, None);
}
