//! Task descriptors and the remote-failure result shape.
//!
//! A descriptor tells a worker what to run. The `importable` form names a
//! registry entry directly; the `serialized` form points at a JSON file
//! written by the spawning side before launch, holding a `StoredTarget`.
//! Closures cannot cross process boundaries, so the stored form carries a
//! registry spec as well — the importable-by-name path, one filesystem
//! indirection removed.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// What the worker should execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskTarget {
    /// A registry spec, `"module:function"` (dotted `module.function` is
    /// accepted by the resolver as well).
    Importable { spec: String },

    /// Path to a file containing a JSON-encoded [`StoredTarget`], written
    /// by the spawning side before the worker process exists.
    Serialized { path: PathBuf },
}

/// The on-disk body of a `serialized` target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTarget {
    pub spec: String,
}

/// One unit of work: a target plus its call arguments.
///
/// At most one descriptor is pending per client id; assigning a second
/// overwrites the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub target: TaskTarget,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl TaskDescriptor {
    pub fn importable(spec: impl Into<String>) -> Self {
        Self {
            target: TaskTarget::Importable { spec: spec.into() },
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    pub fn serialized(path: impl Into<PathBuf>) -> Self {
        Self {
            target: TaskTarget::Serialized { path: path.into() },
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }
}

/// Key marking a result value as a remote failure.
///
/// Task errors travel as data, not as a typed error channel: callers inspect
/// the result shape to detect them.
pub const EXCEPTION_KEY: &str = "__exception__";

/// Build the result value reported for a failed task.
pub fn exception_value(error_type: &str, trace: &str) -> Value {
    json!({
        EXCEPTION_KEY: true,
        "type": error_type,
        "trace": trace,
    })
}

/// True if `value` is a remote-failure marker produced by a worker.
pub fn is_exception(value: &Value) -> bool {
    value
        .get(EXCEPTION_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
