//! Process-wide broker instance.
//!
//! Explicit construction via [`Broker::start`] is the primary API; this
//! module keeps the "first caller creates it" convenience for code that has
//! nowhere natural to thread a handle through.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;

use spool_core::config::SpoolConfig;

use crate::server::Broker;

static GLOBAL: Mutex<Option<Arc<Broker>>> = Mutex::const_new(None);

/// The shared broker, started on first call with loaded (or default) config.
pub async fn ensure() -> Result<Arc<Broker>> {
    let mut slot = GLOBAL.lock().await;
    if let Some(broker) = slot.as_ref() {
        return Ok(broker.clone());
    }
    let config = SpoolConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        SpoolConfig::default()
    });
    let broker = Broker::start(config).await?;
    *slot = Some(broker.clone());
    Ok(broker)
}

/// Stop and drop the shared broker, if one is running. The next `ensure`
/// starts a fresh one.
pub async fn shutdown() {
    if let Some(broker) = GLOBAL.lock().await.take() {
        broker.shutdown();
    }
}
