//! spool integration test harness.
//!
//! These tests run the real thing end to end: the broker lives in the test
//! process, workers are actual OS processes spawned from the `task-host`
//! binary in this package. Cargo builds that binary automatically and
//! exposes its path through CARGO_BIN_EXE_task-host.
//!
//! Each test starts its own broker on an OS-assigned loopback port, so
//! tests do not interfere with each other.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use spool_broker::Broker;

mod queues;
mod tasks;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Path to the worker program built from this package.
pub fn worker_program() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_task-host"))
}

/// A fresh broker on an OS-assigned port.
pub async fn start_broker() -> Arc<Broker> {
    Broker::start_default().await.expect("broker should start")
}

/// Generous wait for a spawned worker's result; workers are whole OS
/// processes, so allow for slow CI machines.
pub const RESULT_WAIT: Duration = Duration::from_secs(10);
