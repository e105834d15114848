//! Change-stream contract between watch sources and the cluster API
//!
//! A [`ChangeStream`] opens one watch connection per call; the connection
//! yields [`WatchFrame`]s until the server closes it. Watch sources own the
//! reconnect policy, so implementations never retry on their own.

use crate::types::ResourceKind;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Resume position of a single watch source
///
/// `None` is the "from now" sentinel: the API starts a fresh watch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatcherCursor {
    last_resource_version: Option<String>,
}

impl WatcherCursor {
    pub fn from_now() -> Self {
        Self::default()
    }

    pub fn at(resource_version: impl Into<String>) -> Self {
        Self {
            last_resource_version: Some(resource_version.into()),
        }
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.last_resource_version.as_deref()
    }

    pub fn advance(&mut self, resource_version: &str) {
        if !resource_version.is_empty() {
            self.last_resource_version = Some(resource_version.to_string());
        }
    }

    pub fn reset(&mut self) {
        self.last_resource_version = None;
    }
}

impl fmt::Display for WatcherCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.last_resource_version {
            Some(rv) => write!(f, "resourceVersion={}", rv),
            None => write!(f, "now"),
        }
    }
}

/// One line of a watch response: `{"type": "...", "object": {...}}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WatchFrame {
    #[serde(rename = "type")]
    pub event_type: String,
    pub object: serde_json::Value,
}

impl WatchFrame {
    pub fn new(event_type: impl Into<String>, object: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            object,
        }
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    /// Could not reach the API server; worth retrying with backoff
    #[error("Connection error: {0}")]
    Connect(String),
    /// Established stream broke mid-read
    #[error("Stream disconnected: {0}")]
    Disconnected(String),
    /// API rejected the watch request
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// Requested resource version is no longer available (410 Gone)
    #[error("Resource version expired: {0}")]
    Expired(String),
    /// A single frame could not be parsed
    #[error("Malformed frame: {0}")]
    Decode(String),
    #[error("Client setup failed: {0}")]
    Setup(String),
}

impl StreamError {
    /// Failures worth retrying with backoff when opening a watch
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Connect(_) | StreamError::Disconnected(_) => true,
            StreamError::Http { status, .. } => *status >= 500 || *status == 429,
            StreamError::Expired(_) | StreamError::Decode(_) | StreamError::Setup(_) => false,
        }
    }
}

/// An open watch connection
#[async_trait]
pub trait WatchConnection: Send {
    /// Next frame, or `Ok(None)` once the server closed the stream
    async fn next_frame(&mut self) -> Result<Option<WatchFrame>, StreamError>;
}

/// Source of watch connections for a resource kind
#[async_trait]
pub trait ChangeStream: Send + Sync {
    async fn watch(
        &self,
        kind: ResourceKind,
        from: &WatcherCursor,
        read_timeout: Duration,
    ) -> Result<Box<dyn WatchConnection>, StreamError>;
}
