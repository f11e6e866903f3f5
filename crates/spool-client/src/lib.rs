//! spool-client — the API surface the rest of the system uses.
//!
//! Three handles: [`Process`] spawns one worker for one task, [`Queue`] is a
//! named cross-process FIFO, [`Pool`] maps a task over an iterable with
//! bounded concurrency. Everything else (broker internals, the worker
//! lifecycle) stays behind these.

mod pool;
mod process;
mod queue;

pub use pool::Pool;
pub use process::{Process, ProcessBuilder, ProcessError};
pub use queue::Queue;
