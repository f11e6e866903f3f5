//! One spawned worker: descriptor preparation, process launch, and the
//! join/result/terminate surface.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::process::Child;

use spool_broker::Broker;
use spool_core::task::{StoredTarget, TaskDescriptor, TaskTarget};

/// Errors surfaced by [`Process::start`]. A spawn failure is fatal and
/// reported, not degraded to a missing result.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn worker program {0}: {1}")]
    Spawn(PathBuf, std::io::Error),

    #[error("failed to write call file: {0}")]
    CallFile(std::io::Error),

    #[error("could not determine worker program: {0}")]
    Program(std::io::Error),
}

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Unique per handle within this host: pid plus a process-local counter.
fn next_client_id() -> String {
    format!(
        "{}-{}",
        std::process::id(),
        NEXT_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Builder for [`Process`].
pub struct ProcessBuilder {
    broker: Arc<Broker>,
    spec: String,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    program: Option<PathBuf>,
    serialize_call: bool,
}

impl ProcessBuilder {
    /// Positional argument.
    pub fn arg(mut self, value: Value) -> Self {
        self.args.push(value);
        self
    }

    pub fn args(mut self, values: Vec<Value>) -> Self {
        self.args = values;
        self
    }

    /// Keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }

    /// Worker program to spawn. Default: the current executable.
    pub fn program(mut self, path: impl Into<PathBuf>) -> Self {
        self.program = Some(path.into());
        self
    }

    /// Route the target through an on-disk call file (the `serialized`
    /// descriptor form) instead of inlining the spec.
    pub fn serialized(mut self) -> Self {
        self.serialize_call = true;
        self
    }

    pub fn build(self) -> Process {
        Process {
            broker: self.broker,
            client_id: next_client_id(),
            spec: self.spec,
            args: self.args,
            kwargs: self.kwargs,
            program: self.program,
            serialize_call: self.serialize_call,
            child: None,
            exit_code: None,
        }
    }
}

/// Client-side handle for one spawned worker process.
pub struct Process {
    broker: Arc<Broker>,
    client_id: String,
    spec: String,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    program: Option<PathBuf>,
    serialize_call: bool,
    child: Option<Child>,
    exit_code: Option<i32>,
}

impl Process {
    pub fn builder(broker: Arc<Broker>, spec: impl Into<String>) -> ProcessBuilder {
        ProcessBuilder {
            broker,
            spec: spec.into(),
            args: Vec::new(),
            kwargs: Map::new(),
            program: None,
            serialize_call: false,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Assign the task under this handle's client id and launch the worker
    /// process with the broker's host, port, and that id as arguments.
    pub async fn start(&mut self) -> Result<(), ProcessError> {
        let target = if self.serialize_call {
            TaskTarget::Serialized {
                path: self.write_call_file()?,
            }
        } else {
            TaskTarget::Importable {
                spec: self.spec.clone(),
            }
        };
        let descriptor = TaskDescriptor {
            target,
            args: self.args.clone(),
            kwargs: self.kwargs.clone(),
        };
        self.broker.assign(self.client_id.clone(), descriptor);

        let program = self.worker_program()?;

        let child = tokio::process::Command::new(&program)
            .arg(self.broker.host())
            .arg(self.broker.port().to_string())
            .arg(&self.client_id)
            .spawn()
            .map_err(|e| ProcessError::Spawn(program.clone(), e))?;

        tracing::debug!(
            client_id = self.client_id,
            program = %program.display(),
            "worker spawned"
        );
        self.child = Some(child);
        Ok(())
    }

    /// Builder override → broker config `[worker] program` → the current
    /// executable.
    fn worker_program(&self) -> Result<PathBuf, ProcessError> {
        if let Some(p) = &self.program {
            return Ok(p.clone());
        }
        let configured = &self.broker.config().worker.program;
        if !configured.as_os_str().is_empty() {
            return Ok(configured.clone());
        }
        std::env::current_exe().map_err(ProcessError::Program)
    }

    /// The call file is persisted, not temp-deleted: the worker may not read
    /// it before this handle is dropped, and nothing reaps it afterwards.
    fn write_call_file(&self) -> Result<PathBuf, ProcessError> {
        let mut file = tempfile::Builder::new()
            .prefix("spool-call-")
            .suffix(".json")
            .tempfile()
            .map_err(ProcessError::CallFile)?;
        let stored = StoredTarget {
            spec: self.spec.clone(),
        };
        let body = serde_json::to_vec(&stored)
            .map_err(|e| ProcessError::CallFile(std::io::Error::other(e)))?;
        file.write_all(&body).map_err(ProcessError::CallFile)?;
        let (_, path) = file
            .keep()
            .map_err(|e| ProcessError::CallFile(e.error))?;
        Ok(path)
    }

    /// Wait for the worker process to exit, up to `timeout`. Records the
    /// exit code; returns quietly on timeout.
    pub async fn join(&mut self, timeout: Option<Duration>) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        let status = match timeout {
            None => child.wait().await,
            Some(t) => match tokio::time::timeout(t, child.wait()).await {
                Ok(status) => status,
                Err(_) => return, // still running; not an error
            },
        };
        match status {
            Ok(status) => self.exit_code = status.code(),
            Err(e) => tracing::warn!(client_id = self.client_id, error = %e, "join failed"),
        }
    }

    /// True iff the worker process was started and has not yet terminated.
    pub fn is_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                self.exit_code = status.code();
                false
            }
            Ok(None) => true,
            Err(_) => false,
        }
    }

    /// Best-effort forceful termination. Errors are swallowed.
    pub fn terminate(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.start_kill() {
                tracing::debug!(client_id = self.client_id, error = %e, "terminate ignored");
            }
        }
    }

    /// Exit code recorded by `join`/`is_alive`, if the process has exited.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Pop this worker's reported result from the broker, waiting up to
    /// `timeout`. Delivered at most once.
    pub async fn result(&self, timeout: Option<Duration>) -> Option<Value> {
        self.broker.get_result(&self.client_id, timeout).await
    }
}
