//! spool-worker — the program run inside each spawned worker process.
//!
//! A worker connects back to the broker, announces readiness, executes
//! exactly one assigned task, reports the result, and exits. Task code is
//! looked up in a [`TaskRegistry`] the embedding binary populates at
//! startup — the stand-in for dynamic `module:function` import.

mod registry;
mod runner;

pub use registry::{TaskInvocation, TaskRegistry};
pub use runner::{run, WorkerOpts};
