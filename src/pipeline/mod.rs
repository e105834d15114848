//! # Ingestion-convergence-dispatch pipeline
//!
//! ```text
//! WatchSource(event) ─┐
//!                     ├─▶ intake ─▶ Consumer ─┬─▶ node_eval ───────────┐
//! WatchSource(node) ──┘                       └─▶ convergence ─────────┴─▶ Dispatcher ─▶ sinks
//! ```
//!
//! ## Module Organization
//!
//! - `intake` - bounded MPSC queue between watch sources and the consumer
//! - `fingerprint` - timestamp-free content digests
//! - `convergence` - per-fingerprint suppression schedule
//! - `node_eval` - anomalous node condition detection
//! - `dispatcher` - failure-isolated fan-out to sinks
//! - `consumer` - the single consumer loop
//! - `supervisor` - watch task ownership and outcomes

pub mod consumer;
pub mod convergence;
pub mod dispatcher;
pub mod fingerprint;
pub mod intake;
pub mod node_eval;
pub mod supervisor;

pub use consumer::{Consumer, ConsumerExit, ConsumerStats, EventFilter};
pub use convergence::{ConvergenceEngine, ConvergenceRecord, Verdict};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use fingerprint::Fingerprint;
pub use intake::{intake_channel, IntakeReceiver, IntakeSender};
pub use supervisor::{Supervisor, WatchOutcome};
