//! Dispatcher status state machine.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Coarse execution status exposed to the owner of a dispatcher.
///
/// ```text
/// idle ──dispatch──▶ running ──result──▶ idle
///                       │
///                       └──error/fault──▶ error ──dispatch──▶ running
/// any ──kill──▶ idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Nothing in flight; initial state and resting state after success.
    #[default]
    Idle,
    /// An invocation has been sent and not yet settled.
    Running,
    /// The last invocation failed.
    Error,
}

impl Status {
    /// Lowercase name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, observable status of one dispatcher.
///
/// Written by the dispatcher on dispatch/kill and by the reply pump of
/// whichever context holds this dispatcher's pending invocation.
#[derive(Debug, Clone)]
pub struct StatusCell {
    tx: Arc<watch::Sender<Status>>,
}

impl StatusCell {
    /// A new cell in the `Idle` state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Status::Idle);
        Self { tx: Arc::new(tx) }
    }

    /// Current status.
    pub fn get(&self) -> Status {
        *self.tx.borrow()
    }

    /// Set the status, notifying subscribers on change.
    pub fn set(&self, status: Status) {
        let previous = self.tx.send_replace(status);
        if previous != status {
            tracing::trace!(from = %previous, to = %status, "status transition");
        }
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.tx.subscribe()
    }

    /// Whether both cells belong to the same dispatcher.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}
