//! Named cross-process FIFO queue handle.
//!
//! Every `put`/`get` is a fresh short-lived connection to the broker — no
//! persistent subscription, no push notification. Connection failures are
//! swallowed (best-effort semantics) but logged, so they are observable
//! without breaking the non-raising contract.

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpStream;

use spool_broker::Broker;
use spool_core::frame::{read_frame, write_frame, FrameError};
use spool_core::message::{Handshake, Message, Role};

/// Handle for one named broker-held queue.
#[derive(Debug, Clone)]
pub struct Queue {
    name: String,
    broker_addr: SocketAddr,
}

impl Queue {
    pub fn new(broker: &Broker, name: impl Into<String>) -> Self {
        Self::at(broker.local_addr(), name)
    }

    /// Build a handle from a raw broker address — the form worker-side task
    /// code uses, via `TaskInvocation::broker_addr`.
    pub fn at(broker_addr: SocketAddr, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            broker_addr,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append `item` to the tail of the queue. Best-effort: a broker that
    /// is gone means the item is silently dropped (and logged).
    pub async fn put(&self, item: Value) {
        let result = self
            .exchange(Message::QueuePut {
                queue: self.name.clone(),
                item,
            })
            .await;
        if let Err(e) = result {
            tracing::warn!(queue = self.name, error = %e, "queue put failed");
        }
    }

    /// Pop the head of the queue, waiting up to `timeout` (`None` = wait
    /// indefinitely). Returns `None` on timeout or any connection failure.
    pub async fn get(&self, timeout: Option<Duration>) -> Option<Value> {
        let reply = self
            .exchange(Message::QueueGet {
                queue: self.name.clone(),
                timeout_ms: timeout.map(|t| t.as_millis() as u64),
            })
            .await;
        match reply {
            Ok(Message::QueueItem { item }) => item,
            Ok(other) => {
                tracing::warn!(queue = self.name, "unexpected queue reply: {other:?}");
                None
            }
            Err(e) => {
                tracing::warn!(queue = self.name, error = %e, "queue get failed");
                None
            }
        }
    }

    /// One connection, one request, one reply.
    async fn exchange(&self, msg: Message) -> Result<Message, FrameError> {
        let mut stream = TcpStream::connect(self.broker_addr).await?;
        write_frame(
            &mut stream,
            &Handshake {
                client_id: format!("queue-{}-{}", self.name, std::process::id()),
                role: Role::Parent,
            },
        )
        .await?;
        write_frame(&mut stream, &msg).await?;
        read_frame(&mut stream).await
    }
}
