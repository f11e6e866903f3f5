//! Broker-owned shared state: client registry, pending tasks, results,
//! and named queues.
//!
//! Locking is per table (and per queue), not one coarse mutex: the only
//! ordering guarantee the protocol makes is FIFO within a single queue.
//! Blocking reads wait on `Notify` signals rather than polling; a timeout
//! always yields the `None` sentinel, never an error.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

use spool_core::message::Role;
use spool_core::task::TaskDescriptor;

/// One connected peer, as recorded at handshake time.
#[derive(Debug, Clone)]
pub struct ClientEntry {
    pub addr: SocketAddr,
    pub role: Role,
}

/// A broker-held FIFO list shared across processes.
///
/// Unbounded, created on first use, lives until broker shutdown. `put` order
/// equals `get` order regardless of which process issues each call.
#[derive(Default)]
pub struct NamedQueue {
    items: Mutex<VecDeque<Value>>,
    notify: Notify,
}

impl NamedQueue {
    /// Append to the tail and wake one waiting getter.
    pub fn push(&self, item: Value) {
        self.items
            .lock()
            .expect("queue lock poisoned")
            .push_back(item);
        self.notify.notify_one();
    }

    /// Remove and return the head, if any.
    pub fn try_pop(&self) -> Option<Value> {
        self.items.lock().expect("queue lock poisoned").pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return the head, waiting up to `timeout` for one to
    /// appear. `None` timeout waits indefinitely. Returns `None` when the
    /// wait elapses with the queue still empty.
    pub async fn pop_wait(&self, timeout: Option<Duration>) -> Option<Value> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            // Register for wakeup before checking, so a push between the
            // check and the await is not lost.
            let notified = self.notify.notified();
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            match deadline {
                None => notified.await,
                Some(d) => {
                    if timeout_at(d, notified).await.is_err() {
                        // Deadline hit. One last grab covers a push that
                        // raced the timeout.
                        return self.try_pop();
                    }
                }
            }
        }
    }
}

/// All shared mutable broker state.
pub struct BrokerState {
    /// client id → connection info, while connected. Informational;
    /// best-effort removed on disconnect.
    clients: DashMap<String, ClientEntry>,

    /// client id → task descriptor, consumed exactly once by `ready`.
    pending: DashMap<String, TaskDescriptor>,

    /// client id → last reported result, read-and-removed by `get_result`.
    /// Entries nobody polls for persist until shutdown.
    results: DashMap<String, Value>,
    result_notify: Notify,

    /// queue name → FIFO list.
    queues: DashMap<String, Arc<NamedQueue>>,
}

impl BrokerState {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            pending: DashMap::new(),
            results: DashMap::new(),
            result_notify: Notify::new(),
            queues: DashMap::new(),
        }
    }

    // ── Client registry ──────────────────────────────────────────────────────

    pub fn register_client(&self, client_id: String, entry: ClientEntry) {
        self.clients.insert(client_id, entry);
    }

    pub fn deregister_client(&self, client_id: &str) {
        self.clients.remove(client_id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    // ── Pending tasks ────────────────────────────────────────────────────────

    /// Store a task for a client id. Overwrites any previous assignment —
    /// last writer wins, no queuing of tasks per id.
    pub fn assign(&self, client_id: impl Into<String>, descriptor: TaskDescriptor) {
        self.pending.insert(client_id.into(), descriptor);
    }

    /// Atomically pop the pending entry for `client_id`, if any.
    pub fn take_pending(&self, client_id: &str) -> Option<TaskDescriptor> {
        self.pending.remove(client_id).map(|(_, d)| d)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // ── Results ──────────────────────────────────────────────────────────────

    /// Record a worker's reported result and wake anyone waiting on it.
    pub fn store_result(&self, client_id: impl Into<String>, result: Value) {
        self.results.insert(client_id.into(), result);
        self.result_notify.notify_waiters();
    }

    /// Pop the result for `client_id` if present. Delivery is at-most-once:
    /// whichever caller pops first gets it.
    pub fn try_take_result(&self, client_id: &str) -> Option<Value> {
        self.results.remove(client_id).map(|(_, v)| v)
    }

    /// Pop the result for `client_id`, waiting up to `timeout` for it to
    /// arrive. `None` timeout waits indefinitely.
    pub async fn wait_result(&self, client_id: &str, timeout: Option<Duration>) -> Option<Value> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let notified = self.result_notify.notified();
            if let Some(result) = self.try_take_result(client_id) {
                return Some(result);
            }
            match deadline {
                None => notified.await,
                Some(d) => {
                    if timeout_at(d, notified).await.is_err() {
                        return self.try_take_result(client_id);
                    }
                }
            }
        }
    }

    pub fn unclaimed_results(&self) -> usize {
        self.results.len()
    }

    // ── Queues ───────────────────────────────────────────────────────────────

    /// The named queue, created on first use.
    pub fn queue(&self, name: &str) -> Arc<NamedQueue> {
        self.queues
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn queue_len(&self, name: &str) -> usize {
        self.queues.get(name).map(|q| q.len()).unwrap_or(0)
    }
}

impl Default for BrokerState {
    fn default() -> Self {
        Self::new()
    }
}
