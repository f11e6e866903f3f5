//! The worker's one-task lifecycle.
//!
//! connect → handshake → ready → execute → result → exit. Task failures are
//! returned as data (the `__exception__` shape) with exit code 1; a missing
//! assignment is a clean no-op exit 0.

use std::net::{IpAddr, SocketAddr};
use std::panic::AssertUnwindSafe;

use anyhow::{anyhow, bail, Context, Result};
use futures::FutureExt;
use serde_json::Value;
use tokio::net::TcpStream;

use spool_core::frame::{read_frame, write_frame};
use spool_core::message::{Handshake, Message, Role};
use spool_core::task::{exception_value, StoredTarget, TaskDescriptor, TaskTarget};

use crate::registry::{TaskInvocation, TaskRegistry};

/// The three required worker program arguments.
#[derive(Debug, Clone)]
pub struct WorkerOpts {
    pub host: String,
    pub port: u16,
    pub client_id: String,
}

impl WorkerOpts {
    /// Parse `host port client_id` from program arguments.
    pub fn from_args(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let host = args.next().context("missing argument: broker host")?;
        let port = args
            .next()
            .context("missing argument: broker port")?
            .parse()
            .context("broker port is not a number")?;
        let client_id = args.next().context("missing argument: client id")?;
        Ok(Self {
            host,
            port,
            client_id,
        })
    }

    fn broker_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("broker host is not an address: {}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Run the full worker lifecycle. Returns the process exit code: 0 for
/// success or nothing-to-do, 1 when the task failed.
///
/// Errors are infrastructure failures (broker unreachable, protocol
/// violation) — distinct from a task that ran and raised.
pub async fn run(opts: &WorkerOpts, registry: &TaskRegistry) -> Result<i32> {
    let broker_addr = opts.broker_addr()?;
    let mut stream = TcpStream::connect(broker_addr)
        .await
        .with_context(|| format!("failed to connect to broker at {broker_addr}"))?;

    write_frame(
        &mut stream,
        &Handshake {
            client_id: opts.client_id.clone(),
            role: Role::Worker,
        },
    )
    .await
    .context("handshake failed")?;

    write_frame(&mut stream, &Message::Ready)
        .await
        .context("ready failed")?;
    let reply: Message = read_frame(&mut stream).await.context("no task reply")?;
    let descriptor = match reply {
        Message::Task { task: Some(t) } => t,
        Message::Task { task: None } => {
            tracing::debug!(client_id = opts.client_id, "nothing to do");
            return Ok(0);
        }
        other => bail!("expected task reply, got {other:?}"),
    };

    match execute(&descriptor, registry, broker_addr).await {
        Ok(result) => {
            write_frame(
                &mut stream,
                &Message::Result {
                    result,
                    exitcode: 0,
                },
            )
            .await
            .context("result report failed")?;
            Ok(0)
        }
        Err(err) => {
            let trace = format!("{err:?}");
            tracing::warn!(client_id = opts.client_id, "task failed: {trace}");
            // The trace goes up the side channel first, then the result
            // carries the marker shape the caller inspects.
            write_frame(&mut stream, &Message::Log { msg: trace.clone() })
                .await
                .ok();
            write_frame(
                &mut stream,
                &Message::Result {
                    result: exception_value(&err.to_string(), &trace),
                    exitcode: 1,
                },
            )
            .await
            .context("failure report failed")?;
            Ok(1)
        }
    }
}

/// Resolve the descriptor's target and invoke it. Panics in task code are
/// captured as failures.
async fn execute(
    descriptor: &TaskDescriptor,
    registry: &TaskRegistry,
    broker_addr: SocketAddr,
) -> Result<Value> {
    let spec = match &descriptor.target {
        TaskTarget::Importable { spec } => spec.clone(),
        TaskTarget::Serialized { path } => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read call file {}", path.display()))?;
            let stored: StoredTarget = serde_json::from_str(&text)
                .with_context(|| format!("invalid call file {}", path.display()))?;
            stored.spec
        }
    };

    let task_fn = registry
        .resolve(&spec)
        .ok_or_else(|| anyhow!("no task registered for spec {spec:?}"))?;

    let invocation = TaskInvocation {
        args: descriptor.args.clone(),
        kwargs: descriptor.kwargs.clone(),
        broker_addr,
    };

    match AssertUnwindSafe(task_fn(invocation)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(anyhow!("task panicked: {msg}"))
        }
    }
}
