//! Delivery targets for records and alerts
//!
//! Every sink implements the same [`Sink::handle`] contract and decides for
//! itself which [`Payload`] variants it acts on. Failures are returned, never
//! raised past the dispatcher.

pub mod console;
pub mod indexer;
pub mod jsonl;
pub mod notifier;

use crate::types::{AlertCandidate, ChangeItem};
use async_trait::async_trait;
use thiserror::Error;

pub use console::ConsoleSink;
pub use indexer::IndexerSink;
pub use jsonl::JsonlAuditSink;
pub use notifier::NotifierSink;

/// What the dispatcher hands to sinks
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    /// Unfiltered record as it came off the watch
    Record(&'a ChangeItem),
    /// Alert that passed filtering and convergence
    Alert(&'a AlertCandidate),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Rejected by {sink}: {reason}")]
    Rejected { sink: String, reason: String },
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[async_trait]
pub trait Sink: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Deliver a payload; ignoring variants the sink does not care about is success
    async fn handle(&self, payload: Payload<'_>) -> Result<(), SinkError>;
}
