use crate::pipeline::intake::IntakeSender;
use crate::types::{ChangeItem, FatalError, ResourceKind};
use crate::watch::backoff::ExponentialBackoff;
use crate::watch::decode::{self, Decoded};
use crate::watch::stream::{ChangeStream, StreamError, WatchConnection, WatcherCursor};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Pause before reconnecting after a connection that made no progress
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("{kind} watch failed: {source}")]
    Stream {
        kind: ResourceKind,
        #[source]
        source: StreamError,
    },
    #[error("{kind} watch gave up reconnecting: {last_error}")]
    RetriesExhausted {
        kind: ResourceKind,
        last_error: StreamError,
    },
}

/// Why a single connection ended
enum ConnectionEnd {
    /// Reconnect from the current cursor; `progressed` is false when the
    /// connection produced no item, bookmark or malformed frame
    Reconnect { progressed: bool },
    /// Consumer is gone; stop quietly
    IntakeClosed,
    Fatal(StreamError),
}

/// Long-running watch loop for one resource kind
///
/// Owns the resume cursor exclusively. Transient faults (read timeout,
/// server-side close, mid-stream disconnect) reconnect from the cursor;
/// anything else is pushed onto the intake as a [`FatalError`] and returned.
pub struct WatchSource {
    kind: ResourceKind,
    stream: Arc<dyn ChangeStream>,
    cursor: WatcherCursor,
    read_timeout: Duration,
    intake: IntakeSender,
    backoff: ExponentialBackoff,
    reconnect_delay: Duration,
}

impl WatchSource {
    pub fn new(
        kind: ResourceKind,
        stream: Arc<dyn ChangeStream>,
        read_timeout: Duration,
        intake: IntakeSender,
    ) -> Self {
        Self {
            kind,
            stream,
            cursor: WatcherCursor::from_now(),
            read_timeout,
            intake,
            backoff: ExponentialBackoff::default(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_cursor(mut self, cursor: WatcherCursor) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn cursor(&self) -> &WatcherCursor {
        &self.cursor
    }

    /// Run until a fatal fault or until the intake queue closes
    pub async fn run(mut self) -> Result<(), WatchError> {
        log::info!("👀 Starting {} watcher (read timeout {:?})", self.kind, self.read_timeout);

        loop {
            let connection = match self
                .stream
                .watch(self.kind, &self.cursor, self.read_timeout)
                .await
            {
                Ok(connection) => connection,
                Err(StreamError::Expired(msg)) => {
                    log::warn!("⚠️  {} cursor {} expired ({}), restarting from now", self.kind, self.cursor, msg);
                    if self.cursor.resource_version().is_none() {
                        // Nothing left to reset; the server rejects a fresh watch
                        tokio::time::sleep(self.reconnect_delay).await;
                    }
                    self.cursor.reset();
                    continue;
                }
                Err(e) if e.is_retryable() => {
                    log::error!("❌ {} watch connection failed: {}", self.kind, e);
                    if self.backoff.sleep().await.is_err() {
                        let error = WatchError::RetriesExhausted {
                            kind: self.kind,
                            last_error: e,
                        };
                        return self.fail(error).await;
                    }
                    continue;
                }
                Err(e) => {
                    let error = WatchError::Stream {
                        kind: self.kind,
                        source: e,
                    };
                    return self.fail(error).await;
                }
            };

            match self.consume(connection).await {
                ConnectionEnd::Reconnect { progressed: true } => continue,
                ConnectionEnd::Reconnect { progressed: false } => {
                    log::debug!(
                        "{} watch ended without progress, waiting {:?} before reconnecting",
                        self.kind,
                        self.reconnect_delay
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                }
                ConnectionEnd::IntakeClosed => {
                    log::warn!("⚠️  Intake queue closed, stopping {} watcher", self.kind);
                    return Ok(());
                }
                ConnectionEnd::Fatal(e) => {
                    let error = WatchError::Stream {
                        kind: self.kind,
                        source: e,
                    };
                    return self.fail(error).await;
                }
            }
        }
    }

    async fn consume(&mut self, mut connection: Box<dyn WatchConnection>) -> ConnectionEnd {
        let mut progressed = false;
        loop {
            let frame = match tokio::time::timeout(self.read_timeout, connection.next_frame()).await {
                Err(_) => {
                    log::info!("⏱️  {} watch read timed out, reconnecting from {}", self.kind, self.cursor);
                    return ConnectionEnd::Reconnect { progressed };
                }
                Ok(Ok(None)) => {
                    log::info!("🔄 {} watch closed by server, reconnecting from {}", self.kind, self.cursor);
                    return ConnectionEnd::Reconnect { progressed };
                }
                Ok(Err(StreamError::Disconnected(msg))) => {
                    log::warn!("⚠️  {} watch disconnected ({}), reconnecting from {}", self.kind, msg, self.cursor);
                    return ConnectionEnd::Reconnect { progressed };
                }
                Ok(Err(StreamError::Decode(msg))) => {
                    log::error!("❌ Dropping unparseable {} frame: {}", self.kind, msg);
                    continue;
                }
                Ok(Err(e)) => return ConnectionEnd::Fatal(e),
                Ok(Ok(Some(frame))) => frame,
            };

            let decoded = decode::decode_frame(self.kind, &frame);
            if !progressed && !matches!(decoded, Err(StreamError::Expired(_))) {
                // Retry budget only refills once the stream is delivering
                progressed = true;
                self.backoff.reset();
            }

            match decoded {
                Ok(Decoded::Item(item)) => {
                    if let Some(rv) = item.resource_version() {
                        self.cursor.advance(rv);
                    }
                    if self.intake.send(item).await.is_err() {
                        return ConnectionEnd::IntakeClosed;
                    }
                }
                Ok(Decoded::Bookmark(rv)) => {
                    log::debug!("🔖 {} bookmark at {}", self.kind, rv);
                    self.cursor.advance(&rv);
                }
                Err(StreamError::Expired(msg)) => {
                    log::warn!("⚠️  {} cursor {} expired ({}), restarting from now", self.kind, self.cursor, msg);
                    self.cursor.reset();
                    return ConnectionEnd::Reconnect { progressed };
                }
                Err(StreamError::Decode(msg)) => {
                    // Keep the stream position even when the payload is unusable
                    if let Some(rv) = decode::resource_version(&frame) {
                        self.cursor.advance(&rv);
                    }
                    log::error!("❌ Dropping malformed {} item: {}", self.kind, msg);
                }
                Err(e) => return ConnectionEnd::Fatal(e),
            }
        }
    }

    async fn fail(self, error: WatchError) -> Result<(), WatchError> {
        log::error!("💥 {}", error);
        let fatal = FatalError {
            source: self.kind,
            message: error.to_string(),
        };
        if self.intake.send(ChangeItem::Fatal(fatal)).await.is_err() {
            log::warn!("⚠️  Intake queue closed before {} failure could be reported", self.kind);
        }
        Err(error)
    }
}
