//! Cluster change-stream monitor
//!
//! Watches events and node conditions, filters and converges alert
//! candidates, and fans them out to notification sinks.

pub mod config;
pub mod pipeline;
pub mod runtime;
pub mod sinks;
pub mod types;
pub mod watch;
