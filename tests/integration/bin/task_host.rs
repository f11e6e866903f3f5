//! task-host — the worker program spawned by the integration tests.
//!
//! Registers the task set the tests exercise, then runs the standard worker
//! lifecycle: connect to the broker named by the three program arguments,
//! pick up one task, execute it, report, exit.

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use spool_client::Queue;
use spool_worker::{run, TaskInvocation, TaskRegistry, WorkerOpts};

fn registry() -> TaskRegistry {
    let mut r = TaskRegistry::new();

    r.register("math:square", |inv: TaskInvocation| async move {
        let n = inv
            .arg(0)
            .as_i64()
            .ok_or_else(|| anyhow!("square expects an integer"))?;
        Ok(json!(n * n))
    });

    r.register("math:cube", |inv: TaskInvocation| async move {
        let n = inv
            .arg(0)
            .as_i64()
            .ok_or_else(|| anyhow!("cube expects an integer"))?;
        Ok(json!(n * n * n))
    });

    // Positional plus keyword arguments.
    r.register("math:add", |inv: TaskInvocation| async move {
        let a = inv.arg(0).as_i64().unwrap_or(0);
        let b = inv.arg(1).as_i64().unwrap_or(0);
        let offset = inv.kwarg("offset").as_i64().unwrap_or(0);
        Ok(json!(a + b + offset))
    });

    // Rejects negative input; used to prove one failure does not poison a
    // pool run.
    r.register("math:checked_square", |inv: TaskInvocation| async move {
        let n = inv
            .arg(0)
            .as_i64()
            .ok_or_else(|| anyhow!("checked_square expects an integer"))?;
        if n < 0 {
            return Err(anyhow!("invalid value: {n} is negative"));
        }
        Ok(json!(n * n))
    });

    r.register("errors:boom", |_| async {
        Err(anyhow!("invalid value: boom"))
    });

    // Pushes every element of arg(1) onto the queue named by arg(0).
    r.register("queues:produce", |inv: TaskInvocation| async move {
        let name = inv
            .arg(0)
            .as_str()
            .ok_or_else(|| anyhow!("produce expects a queue name"))?
            .to_string();
        let items = inv
            .arg(1)
            .as_array()
            .cloned()
            .unwrap_or_default();
        let queue = Queue::at(inv.broker_addr, name);
        let count = items.len();
        for item in items {
            queue.put(item).await;
        }
        Ok(json!(count))
    });

    // Pops one item from the queue named by arg(0) and returns it as the
    // task result (null on timeout, like the queue itself).
    r.register("queues:consume", |inv: TaskInvocation| async move {
        let name = inv
            .arg(0)
            .as_str()
            .ok_or_else(|| anyhow!("consume expects a queue name"))?
            .to_string();
        let timeout_ms = inv.kwarg("timeout_ms").as_u64().unwrap_or(2000);
        let queue = Queue::at(inv.broker_addr, name);
        let item = queue
            .get(Some(std::time::Duration::from_millis(timeout_ms)))
            .await;
        Ok(item.unwrap_or(Value::Null))
    });

    r
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts = WorkerOpts::from_args(std::env::args().skip(1))?;
    let code = run(&opts, &registry()).await?;
    std::process::exit(code);
}
