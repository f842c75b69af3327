//! One-way run-status notifications. Delivery is best effort and fully
//! detached: a failing notifier is logged and never joined into the
//! orchestration result.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunScope {
    All,
    Single,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunEvent {
    Running {
        scope: RunScope,
    },
    Completed {
        scope: RunScope,
        saved: u64,
        updated: u64,
        deactivated: u64,
    },
    Failed {
        scope: RunScope,
        error: String,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: RunEvent) -> Result<()>;
}

/// Default sink: structured log lines only.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: RunEvent) -> Result<()> {
        info!(event = ?event, "run status");
        Ok(())
    }
}

/// Fire a notification without awaiting it from the caller's path.
pub fn notify_detached(notifier: Arc<dyn Notifier>, event: RunEvent) {
    tokio::spawn(async move {
        if let Err(err) = notifier.notify(event).await {
            warn!(?err, "notifier failed; ignoring");
        }
    });
}
