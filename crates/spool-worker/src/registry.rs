//! Name → task function registry.
//!
//! Target specs are `"module:function"`. The dotted form
//! `"module.function"` is accepted too: the segment after the last dot is
//! the function name. Specs are normalized to the colon form on both
//! register and resolve, so either spelling finds the other.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use serde_json::{Map, Value};

/// Everything a task function receives when invoked.
#[derive(Debug, Clone)]
pub struct TaskInvocation {
    /// Positional arguments from the task descriptor.
    pub args: Vec<Value>,
    /// Keyword arguments from the task descriptor.
    pub kwargs: Map<String, Value>,
    /// Address of the broker that assigned this task. Task code can open
    /// queue handles against it.
    pub broker_addr: SocketAddr,
}

impl TaskInvocation {
    /// Positional argument `i`, or `Null` if absent.
    pub fn arg(&self, i: usize) -> &Value {
        self.args.get(i).unwrap_or(&Value::Null)
    }

    /// Keyword argument by name, or `Null` if absent.
    pub fn kwarg(&self, name: &str) -> &Value {
        self.kwargs.get(name).unwrap_or(&Value::Null)
    }
}

type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;
type TaskFn = dyn Fn(TaskInvocation) -> TaskFuture + Send + Sync;

/// The set of task functions a worker binary can execute.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Box<TaskFn>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `spec` (`"module:function"` or dotted form).
    pub fn register<F, Fut>(&mut self, spec: &str, f: F)
    where
        F: Fn(TaskInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.tasks
            .insert(normalize(spec), Box::new(move |inv| Box::pin(f(inv))));
    }

    /// Look up the function for `spec`, accepting both spelling forms.
    pub fn resolve(&self, spec: &str) -> Option<&TaskFn> {
        self.tasks.get(&normalize(spec)).map(|b| b.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Canonical form: `module:function`.
///
/// `a.b.c` splits at the last dot (`a.b:c`); anything already containing a
/// colon is kept as-is.
fn normalize(spec: &str) -> String {
    if spec.contains(':') {
        return spec.to_string();
    }
    match spec.rsplit_once('.') {
        Some((module, func)) => format!("{module}:{func}"),
        None => spec.to_string(),
    }
}
