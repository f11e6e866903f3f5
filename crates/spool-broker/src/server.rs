//! Broker TCP server: accept loop and per-connection protocol handlers.
//!
//! The accept loop never blocks on handler work; every connection gets its
//! own spawned handler which runs until the peer disconnects, sends a
//! malformed frame, or the broker shuts down. Handlers never hold a table
//! lock across socket I/O.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use spool_core::config::SpoolConfig;
use spool_core::frame::{read_frame_limited, write_frame, FrameError};
use spool_core::message::{Handshake, Message};
use spool_core::task::TaskDescriptor;

use crate::state::{BrokerState, ClientEntry};

/// The coordinating service for one host.
///
/// Constructed explicitly and passed to whoever needs it; see
/// [`crate::global`] for the process-wide convenience wrapper.
pub struct Broker {
    local_addr: SocketAddr,
    state: Arc<BrokerState>,
    shutdown: broadcast::Sender<()>,
    accept_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    config: Arc<SpoolConfig>,
}

impl Broker {
    /// Bind the listener and start accepting in the background.
    ///
    /// Returns as soon as the port is bound; the resolved address is
    /// available via [`Broker::local_addr`] immediately.
    pub async fn start(config: SpoolConfig) -> Result<Arc<Self>> {
        let bind = format!("{}:{}", config.network.bind_addr, config.network.port);
        let listener = TcpListener::bind(&bind)
            .await
            .with_context(|| format!("failed to bind broker listener on {bind}"))?;
        let local_addr = listener.local_addr().context("listener has no local addr")?;

        let state = Arc::new(BrokerState::new());
        let (shutdown, _) = broadcast::channel::<()>(1);
        let config = Arc::new(config);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            state.clone(),
            shutdown.clone(),
            config.clone(),
        ));

        tracing::info!(addr = %local_addr, "broker listening");

        Ok(Arc::new(Self {
            local_addr,
            state,
            shutdown,
            accept_task: std::sync::Mutex::new(Some(accept_task)),
            config,
        }))
    }

    /// Start with default configuration (loopback, OS-assigned port).
    pub async fn start_default() -> Result<Arc<Self>> {
        Self::start(SpoolConfig::default()).await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn host(&self) -> String {
        self.local_addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// The configuration this broker was started with. Client-side defaults
    /// (worker program, pool result timeout) come from here.
    pub fn config(&self) -> &SpoolConfig {
        &self.config
    }

    /// Store a task for a client id before its worker process exists.
    /// A second assign to the same id overwrites the first.
    pub fn assign(&self, client_id: impl Into<String>, descriptor: TaskDescriptor) {
        let client_id = client_id.into();
        tracing::debug!(client_id, "task assigned");
        self.state.assign(client_id, descriptor);
    }

    /// Pop the result reported for `client_id`, waiting up to `timeout`.
    /// Delivered at most once; `None` after the timeout elapses.
    pub async fn get_result(&self, client_id: &str, timeout: Option<Duration>) -> Option<Value> {
        self.state.wait_result(client_id, timeout).await
    }

    // ── Introspection ────────────────────────────────────────────────────────

    pub fn client_count(&self) -> usize {
        self.state.client_count()
    }

    pub fn pending_count(&self) -> usize {
        self.state.pending_count()
    }

    pub fn unclaimed_results(&self) -> usize {
        self.state.unclaimed_results()
    }

    pub fn queue_len(&self, name: &str) -> usize {
        self.state.queue_len(name)
    }

    /// Stop listening and tear down handlers. State drops once the last
    /// handler releases it.
    pub fn shutdown(&self) {
        tracing::info!(addr = %self.local_addr, "broker shutting down");
        let _ = self.shutdown.send(());
        if let Some(task) = self
            .accept_task
            .lock()
            .expect("accept task lock poisoned")
            .take()
        {
            task.abort();
        }
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<BrokerState>,
    shutdown: broadcast::Sender<()>,
    config: Arc<SpoolConfig>,
) {
    let mut shutdown_rx = shutdown.subscribe();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::debug!("accept loop stopping");
                return;
            }

            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let state = state.clone();
                let config = config.clone();
                let handler_shutdown = shutdown.subscribe();
                tokio::spawn(async move {
                    handle_connection(state, stream, peer, handler_shutdown, config).await;
                });
            }
        }
    }
}

/// One connection's protocol loop.
///
/// Reads the handshake, registers the client, then dispatches messages until
/// the peer goes away. Read failures (closed peer, malformed frame) end the
/// handler; the client registry entry is removed on the way out, but any
/// result the client already reported stays in the table.
async fn handle_connection(
    state: Arc<BrokerState>,
    mut stream: TcpStream,
    peer: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
    config: Arc<SpoolConfig>,
) {
    let handshake: Handshake =
        match read_frame_limited(&mut stream, config.limits.max_frame_bytes).await {
            Ok(h) => h,
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "connection closed before handshake");
                return;
            }
        };
    let client_id = handshake.client_id.clone();
    tracing::debug!(client_id, role = ?handshake.role, peer = %peer, "client connected");
    state.register_client(
        client_id.clone(),
        ClientEntry {
            addr: peer,
            role: handshake.role,
        },
    );

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            done = serve_one(&state, &mut stream, &client_id, &config) => {
                if done {
                    break;
                }
            }
        }
    }

    state.deregister_client(&client_id);
    tracing::debug!(client_id, "client disconnected");
}

/// Read one message, dispatch it, write the reply if the message has one.
/// Returns true when the connection should close.
async fn serve_one(
    state: &Arc<BrokerState>,
    stream: &mut TcpStream,
    client_id: &str,
    config: &SpoolConfig,
) -> bool {
    let msg = match read_frame_limited::<_, Message>(stream, config.limits.max_frame_bytes).await {
        Ok(m) => m,
        Err(FrameError::EndOfStream) => return true,
        Err(e) => {
            tracing::warn!(client_id, error = %e, "dropping connection");
            return true;
        }
    };

    let reply = match msg {
        Message::Ready => {
            let task = state.take_pending(client_id);
            tracing::debug!(client_id, assigned = task.is_some(), "worker ready");
            Some(Message::Task { task })
        }

        Message::Result { result, exitcode } => {
            tracing::debug!(client_id, exitcode, "result reported");
            state.store_result(client_id.to_string(), result);
            None
        }

        Message::QueuePut { queue, item } => {
            state.queue(&queue).push(item);
            Some(Message::Ok)
        }

        Message::QueueGet { queue, timeout_ms } => {
            // A caller that names no timeout gets the configured default;
            // a configured 0 means wait forever.
            let timeout_ms = timeout_ms.or(match config.limits.queue_default_timeout_ms {
                0 => None,
                ms => Some(ms),
            });
            let timeout = timeout_ms.map(Duration::from_millis);
            let queue = state.queue(&queue);
            let item = queue.pop_wait(timeout).await;
            Some(Message::QueueItem { item })
        }

        Message::Log { msg } => {
            tracing::info!(client_id, "{msg}");
            None
        }

        Message::Heartbeat => Some(Message::Pong),

        // Replies from us, or types this build doesn't know.
        Message::Task { .. }
        | Message::QueueItem { .. }
        | Message::Pong
        | Message::Ok
        | Message::Unknown => Some(Message::Unknown),
    };

    if let Some(reply) = reply {
        if let Err(e) = write_frame(stream, &reply).await {
            tracing::warn!(client_id, error = %e, "reply failed");
            return true;
        }
    }
    false
}
