//! Protocol messages carried inside frames.
//!
//! Every connection starts with one `Handshake`, then exchanges `Message`s.
//! Bodies are tagged on `"type"`; unknown types decode to `Message::Unknown`
//! so the broker can answer them instead of tearing the connection down.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::TaskDescriptor;

/// Who is on the far end of a connection. Informational only — the broker
/// records it but does not enforce role-specific behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A spawned worker process, here to pick up one task.
    Worker,
    /// Anything else: the spawning side, queue users, diagnostics.
    Parent,
}

/// Sent exactly once per connection, before any typed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub client_id: String,
    pub role: Role,
}

/// One typed protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Worker → broker: "give me my task".
    Ready,

    /// Broker → worker: the pending task, or `None` if nothing is assigned.
    Task { task: Option<TaskDescriptor> },

    /// Worker → broker: the task outcome. `exitcode` mirrors the process
    /// exit code the worker is about to exit with.
    Result { result: Value, exitcode: i32 },

    /// Append `item` to the tail of the named queue.
    QueuePut { queue: String, item: Value },

    /// Pop the head of the named queue, waiting up to `timeout_ms`
    /// (absent = wait indefinitely).
    QueueGet {
        queue: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// Broker → caller: the popped item, or `None` on timeout.
    QueueItem { item: Option<Value> },

    /// Side-channel diagnostic text. No reply.
    Log { msg: String },

    /// Liveness probe; answered with `Pong`.
    Heartbeat,
    Pong,

    /// Generic acknowledgment.
    Ok,

    /// Catch-all for message types this build does not recognize.
    #[serde(other)]
    Unknown,
}
