//! Ownership of the watch tasks
//!
//! Each source runs as its own tokio task returning a typed outcome. The
//! consumer learns about a fatal fault through the intake queue; the runtime
//! then waits here for that task to finish before exiting.

use crate::types::ResourceKind;
use crate::watch::source::{WatchError, WatchSource};
use std::collections::HashMap;
use tokio::task::JoinHandle;

/// Final state of a watch task
#[derive(Debug)]
pub enum WatchOutcome {
    /// Stopped because the intake queue closed
    Stopped,
    Failed(WatchError),
    /// Task panicked or was aborted
    Crashed(String),
}

#[derive(Default)]
pub struct Supervisor {
    tasks: HashMap<ResourceKind, JoinHandle<Result<(), WatchError>>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a watch source; a previous task for the same kind is aborted
    pub fn spawn(&mut self, source: WatchSource) {
        let kind = source.kind();
        let handle = tokio::spawn(source.run());
        if let Some(previous) = self.tasks.insert(kind, handle) {
            log::warn!("⚠️  Replacing running {} watcher", kind);
            previous.abort();
        }
        log::info!("   ├─ {} watcher spawned", kind);
    }

    pub fn is_running(&self, kind: ResourceKind) -> bool {
        self.tasks
            .get(&kind)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Wait for the task of `kind` to terminate and report how it ended
    pub async fn wait_for(&mut self, kind: ResourceKind) -> Option<WatchOutcome> {
        let handle = self.tasks.remove(&kind)?;
        let outcome = match handle.await {
            Ok(Ok(())) => WatchOutcome::Stopped,
            Ok(Err(e)) => WatchOutcome::Failed(e),
            Err(e) => WatchOutcome::Crashed(e.to_string()),
        };
        log::info!("🛑 {} watcher terminated: {:?}", kind, outcome);
        Some(outcome)
    }

    /// Abort every remaining task
    pub fn shutdown(&mut self) {
        for (kind, handle) in self.tasks.drain() {
            log::debug!("Aborting {} watcher", kind);
            handle.abort();
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
