//! HTTP watch client for the Kubernetes core/v1 API
//!
//! Watches are plain chunked GET requests (`?watch=1`) returning one JSON
//! object per line. The server closes the stream after `timeoutSeconds`,
//! which the watch source treats as a normal reconnect.

use crate::config::ApiConfig;
use crate::types::ResourceKind;
use crate::watch::stream::{ChangeStream, StreamError, WatchConnection, WatchFrame, WatcherCursor};
use async_trait::async_trait;
use std::time::Duration;

pub struct KubeClient {
    http: reqwest::Client,
    host: String,
    token: Option<String>,
}

impl KubeClient {
    /// Build a client from API settings
    ///
    /// The bearer token comes from `API_TOKEN` when set, otherwise from the
    /// service-account token file. A missing file is not an error (the API
    /// may allow anonymous access, e.g. through `kubectl proxy`).
    pub fn new(config: &ApiConfig) -> Result<Self, StreamError> {
        let token = match &config.token {
            Some(token) => Some(token.clone()),
            None => match std::fs::read_to_string(&config.token_file) {
                Ok(contents) => Some(contents.trim().to_string()),
                Err(e) => {
                    log::warn!(
                        "⚠️  No service account token at {} ({}), connecting without auth",
                        config.token_file,
                        e
                    );
                    None
                }
            },
        };

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_ssl)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| StreamError::Setup(e.to_string()))?;

        Ok(Self {
            http,
            host: config.host.clone(),
            token,
        })
    }

    fn watch_url(&self, kind: ResourceKind) -> String {
        format!("{}{}", self.host, kind.api_path())
    }
}

/// Query parameters of a watch request
pub fn watch_query(from: &WatcherCursor, read_timeout: Duration) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("watch", "1".to_string()),
        ("allowWatchBookmarks", "true".to_string()),
        ("timeoutSeconds", read_timeout.as_secs().max(1).to_string()),
    ];
    if let Some(rv) = from.resource_version() {
        query.push(("resourceVersion", rv.to_string()));
    }
    query
}

#[async_trait]
impl ChangeStream for KubeClient {
    async fn watch(
        &self,
        kind: ResourceKind,
        from: &WatcherCursor,
        read_timeout: Duration,
    ) -> Result<Box<dyn WatchConnection>, StreamError> {
        let mut request = self
            .http
            .get(self.watch_url(kind))
            .query(&watch_query(from, read_timeout));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 410 {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Expired(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Http {
                status: status.as_u16(),
                body,
            });
        }

        log::debug!("🔗 Watch opened: {} from {}", kind, from);
        Ok(Box::new(HttpWatchConnection::new(response)))
    }
}

/// Newline-delimited JSON reader over a streaming response body
pub struct HttpWatchConnection {
    response: reqwest::Response,
    lines: LineBuffer,
}

impl HttpWatchConnection {
    fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            lines: LineBuffer::default(),
        }
    }
}

#[async_trait]
impl WatchConnection for HttpWatchConnection {
    async fn next_frame(&mut self) -> Result<Option<WatchFrame>, StreamError> {
        loop {
            if let Some(line) = self.lines.next_line() {
                return parse_frame(&line).map(Some);
            }
            match self.response.chunk().await {
                Ok(Some(chunk)) => self.lines.push(&chunk),
                Ok(None) => {
                    return match self.lines.take_remainder() {
                        Some(line) => parse_frame(&line).map(Some),
                        None => Ok(None),
                    };
                }
                Err(e) => return Err(StreamError::Disconnected(e.to_string())),
            }
        }
    }
}

fn parse_frame(line: &[u8]) -> Result<WatchFrame, StreamError> {
    serde_json::from_slice(line).map_err(|e| StreamError::Decode(e.to_string()))
}

/// Splits a byte stream into non-empty lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                return Some(line);
            }
        }
        None
    }

    pub fn take_remainder(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(rest)
        }
    }
}
