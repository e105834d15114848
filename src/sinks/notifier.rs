//! Robot-webhook notifier (DingTalk text message format)
//!
//! Request body:
//! ```json
//! {"msgtype": "text", "text": {"content": "..."}, "at": {"atMobiles": [], "isAtAll": false}}
//! ```
//! A delivery succeeds on HTTP 2xx with `errcode == 0` (when the body carries one).

use super::{Payload, Sink, SinkError};
use crate::types::{AlertCandidate, AlertOrigin};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RobotMessage {
    pub msgtype: String,
    pub text: RobotText,
    pub at: RobotAt,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RobotText {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RobotAt {
    #[serde(rename = "atMobiles")]
    pub at_mobiles: Vec<String>,
    #[serde(rename = "isAtAll")]
    pub is_at_all: bool,
}

#[derive(Debug, Deserialize)]
struct RobotResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// Per-origin broadcast switches
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastFlags {
    pub event_at_all: bool,
    pub node_at_all: bool,
}

pub struct NotifierSink {
    client: reqwest::Client,
    endpoint: String,
    cluster_name: String,
    broadcast: BroadcastFlags,
}

impl NotifierSink {
    pub fn new(
        endpoint: impl Into<String>,
        cluster_name: impl Into<String>,
        broadcast: BroadcastFlags,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            cluster_name: cluster_name.into(),
            broadcast,
        })
    }

    /// Message body for an alert
    pub fn build_message(&self, alert: &AlertCandidate) -> RobotMessage {
        let is_at_all = match alert.origin {
            AlertOrigin::Event => self.broadcast.event_at_all,
            AlertOrigin::NodeCondition => self.broadcast.node_at_all,
        };
        RobotMessage {
            msgtype: "text".to_string(),
            text: RobotText {
                content: format!("{}\n{}", self.cluster_name, alert.render()),
            },
            at: RobotAt {
                at_mobiles: Vec::new(),
                is_at_all,
            },
        }
    }

    pub async fn notify(&self, alert: &AlertCandidate) -> Result<(), SinkError> {
        let message = self.build_message(alert);
        let response = self.client.post(&self.endpoint).json(&message).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected {
                sink: self.name().to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        let body = response.text().await?;
        if let Ok(reply) = serde_json::from_str::<RobotResponse>(&body) {
            if reply.errcode != 0 {
                return Err(SinkError::Rejected {
                    sink: self.name().to_string(),
                    reason: format!("errcode {}: {}", reply.errcode, reply.errmsg),
                });
            }
        }

        log::debug!("📨 Notified: {}", alert.title);
        Ok(())
    }
}

#[async_trait]
impl Sink for NotifierSink {
    fn name(&self) -> &str {
        "notifier"
    }

    async fn handle(&self, payload: Payload<'_>) -> Result<(), SinkError> {
        match payload {
            Payload::Alert(alert) => self.notify(alert).await,
            Payload::Record(_) => Ok(()),
        }
    }
}
