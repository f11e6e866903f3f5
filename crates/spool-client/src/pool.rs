//! Bounded-concurrency map over worker processes.
//!
//! One worker per input item, never more than `processes` alive at once.
//! Results come back in input order; a failed item occupies its slot with
//! the `__exception__` shape instead of cancelling the rest.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::Semaphore;

use spool_broker::Broker;

use crate::process::Process;

pub struct Pool {
    broker: Arc<Broker>,
    processes: usize,
    program: Option<PathBuf>,
    result_timeout: Duration,
}

impl Pool {
    /// A pool running at most `processes` workers simultaneously. The
    /// per-item result wait comes from the broker's `[worker]`
    /// `pool_result_timeout_secs` (default 5).
    pub fn new(broker: Arc<Broker>, processes: usize) -> Self {
        let result_timeout = Duration::from_secs(broker.config().worker.pool_result_timeout_secs);
        Self {
            broker,
            processes: processes.max(1),
            program: None,
            result_timeout,
        }
    }

    /// Worker program for every spawned process. Default: current executable.
    pub fn program(mut self, path: impl Into<PathBuf>) -> Self {
        self.program = Some(path.into());
        self
    }

    /// Per-item result wait after the worker exits.
    pub fn result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = timeout;
        self
    }

    /// Run `spec` once per item, each worker getting that single item as its
    /// one positional argument. Returns results in input order. An item
    /// whose result never arrives yields `null` in its slot.
    pub async fn map(&self, spec: &str, items: Vec<Value>) -> Result<Vec<Value>> {
        let semaphore = Arc::new(Semaphore::new(self.processes));
        let mut handles = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let broker = self.broker.clone();
            let spec = spec.to_string();
            let program = self.program.clone();
            let result_timeout = self.result_timeout;

            handles.push(tokio::spawn(async move {
                // The permit spans launch through result collection, so at
                // most `processes` workers are alive at any moment.
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .context("pool semaphore closed")?;

                let mut builder = Process::builder(broker, spec).arg(item);
                if let Some(program) = program {
                    builder = builder.program(program);
                }
                let mut process = builder.build();
                process
                    .start()
                    .await
                    .with_context(|| format!("failed to start pool worker {index}"))?;
                process.join(None).await;
                let result = process.result(Some(result_timeout)).await;
                Ok::<Value, anyhow::Error>(result.unwrap_or(Value::Null))
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for outcome in futures::future::join_all(handles).await {
            results.push(outcome.context("pool worker task panicked")??);
        }
        Ok(results)
    }
}
