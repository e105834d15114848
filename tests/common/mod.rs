//! Scripted change stream and recording sink shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use eventer::sinks::{Payload, Sink, SinkError};
use eventer::types::{ChangeItem, ResourceKind};
use eventer::watch::{ChangeStream, StreamError, WatchConnection, WatchFrame, WatcherCursor};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// One step of a scripted connection
pub enum Step {
    Frame(WatchFrame),
    /// Never yields; trips the read timeout
    Hang,
    Error(StreamError),
}

/// Outcome of one `watch` call
pub enum Script {
    Connect(Vec<Step>),
    Refuse(StreamError),
}

/// Replays scripts per resource kind and records every watch call
///
/// Once a kind runs out of scripts, further `watch` calls never return.
#[derive(Default)]
pub struct ScriptedStream {
    scripts: Mutex<HashMap<ResourceKind, VecDeque<Script>>>,
    calls: Mutex<Vec<(ResourceKind, Option<String>)>>,
}

impl ScriptedStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, kind: ResourceKind, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(script);
        self
    }

    /// Cursors passed to `watch` for `kind`, in call order
    pub fn cursors(&self, kind: ResourceKind) -> Vec<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, rv)| rv.clone())
            .collect()
    }
}

struct ScriptedConnection {
    steps: VecDeque<Step>,
}

#[async_trait]
impl WatchConnection for ScriptedConnection {
    async fn next_frame(&mut self) -> Result<Option<WatchFrame>, StreamError> {
        match self.steps.pop_front() {
            Some(Step::Frame(frame)) => Ok(Some(frame)),
            Some(Step::Hang) => {
                std::future::pending::<()>().await;
                Ok(None)
            }
            Some(Step::Error(e)) => Err(e),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ChangeStream for ScriptedStream {
    async fn watch(
        &self,
        kind: ResourceKind,
        from: &WatcherCursor,
        _read_timeout: Duration,
    ) -> Result<Box<dyn WatchConnection>, StreamError> {
        self.calls
            .lock()
            .unwrap()
            .push((kind, from.resource_version().map(str::to_string)));

        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(|queue| queue.pop_front());

        match next {
            Some(Script::Connect(steps)) => Ok(Box::new(ScriptedConnection {
                steps: steps.into(),
            })),
            Some(Script::Refuse(e)) => Err(e),
            None => {
                std::future::pending::<()>().await;
                Err(StreamError::Connect("script exhausted".to_string()))
            }
        }
    }
}

/// Warning event frame; identical content apart from timestamp and version
pub fn event_frame(rv: u64, timestamp: i64) -> Step {
    let ts = chrono::DateTime::from_timestamp(timestamp, 0)
        .unwrap()
        .to_rfc3339();
    Step::Frame(WatchFrame::new(
        "ADDED",
        json!({
            "metadata": {"name": "api-7d9f.17b", "namespace": "shop", "resourceVersion": rv.to_string()},
            "type": "Warning",
            "reason": "Unhealthy",
            "message": "Readiness probe failed: connection refused",
            "lastTimestamp": ts,
            "involvedObject": {"kind": "Pod", "name": "api-7d9f"}
        }),
    ))
}

/// Node frame with a single Ready condition
pub fn node_frame(rv: u64, ready: &str) -> Step {
    Step::Frame(WatchFrame::new(
        "MODIFIED",
        json!({
            "metadata": {"name": "worker-1", "resourceVersion": rv.to_string()},
            "status": {"conditions": [
                {"type": "Ready", "status": ready, "reason": "KubeletReady", "message": "kubelet status"},
                {"type": "MemoryPressure", "status": "False"}
            ]}
        }),
    ))
}

/// Sink that remembers everything it is handed
#[derive(Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<ChangeItem>>,
    pub alerts: Mutex<Vec<eventer::types::AlertCandidate>>,
}

impl RecordingSink {
    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn handle(&self, payload: Payload<'_>) -> Result<(), SinkError> {
        match payload {
            Payload::Record(item) => self.records.lock().unwrap().push(item.clone()),
            Payload::Alert(alert) => self.alerts.lock().unwrap().push(alert.clone()),
        }
        Ok(())
    }
}

/// Always-failing sink
pub struct BrokenSink;

#[async_trait]
impl Sink for BrokenSink {
    fn name(&self) -> &str {
        "broken"
    }

    async fn handle(&self, _payload: Payload<'_>) -> Result<(), SinkError> {
        Err(SinkError::Rejected {
            sink: "broken".to_string(),
            reason: "webhook returned 500".to_string(),
        })
    }
}

/// Poll `condition` every 10ms for up to 5s
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
