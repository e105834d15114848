//! Core data structures flowing through the monitor
//!
//! Items are classified into a closed [`ChangeItem`] variant at ingestion,
//! so the consumer matches exhaustively instead of probing raw objects.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource kinds the monitor watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Event,
    Node,
}

impl ResourceKind {
    /// Collection path on the core/v1 API
    pub fn api_path(&self) -> &'static str {
        match self {
            ResourceKind::Event => "/api/v1/events",
            ResourceKind::Node => "/api/v1/nodes",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Event => write!(f, "event"),
            ResourceKind::Node => write!(f, "node"),
        }
    }
}

/// A workload lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub namespace: String,
    pub name: String,
    pub message: String,
    pub reason: String,
    /// Event `type` as reported by the API ("Normal", "Warning")
    pub level: String,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub involved_kind: Option<String>,
    pub involved_name: Option<String>,
    pub count: Option<i64>,
    pub resource_version: String,
}

/// A single node condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub condition_type: String,
    pub status: String,
    pub message: String,
    pub reason: String,
    pub last_heartbeat_time: Option<DateTime<Utc>>,
}

/// A node and its current health conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub conditions: Vec<Condition>,
    pub resource_version: String,
}

/// Terminal failure of a watch source
#[derive(Debug, Clone, PartialEq)]
pub struct FatalError {
    pub source: ResourceKind,
    pub message: String,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} watcher failed: {}", self.source, self.message)
    }
}

/// Item carried by the intake queue
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeItem {
    Event(EventRecord),
    Node(NodeRecord),
    Fatal(FatalError),
}

impl ChangeItem {
    /// Resume cursor for non-error items
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            ChangeItem::Event(event) => Some(&event.resource_version),
            ChangeItem::Node(node) => Some(&node.resource_version),
            ChangeItem::Fatal(_) => None,
        }
    }
}

/// Where an alert candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertOrigin {
    Event,
    NodeCondition,
}

/// One labelled line of an alert
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertField {
    pub label: String,
    pub value: String,
}

impl AlertField {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Normalized alert ready for convergence and dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCandidate {
    pub origin: AlertOrigin,
    pub title: String,
    pub severity: String,
    /// Ordered label → value pairs, rendered in this order
    pub fields: Vec<AlertField>,
    pub rendered_timestamp: String,
    /// Unix seconds of the underlying occurrence
    pub occurred_at: Option<i64>,
    pub suppressible: bool,
}

impl AlertCandidate {
    /// Build the candidate for an event record
    pub fn from_event(event: &EventRecord, offset: FixedOffset) -> Self {
        let mut fields = vec![
            AlertField::new("Level", event.level.as_str()),
            AlertField::new("Namespace", event.namespace.as_str()),
            AlertField::new("Name", event.name.as_str()),
            AlertField::new("Message", event.message.as_str()),
            AlertField::new("Reason", event.reason.as_str()),
        ];
        if let (Some(kind), Some(name)) = (&event.involved_kind, &event.involved_name) {
            fields.push(AlertField::new("Object", format!("{}/{}", kind, name)));
        }

        Self {
            origin: AlertOrigin::Event,
            title: format!("{} {}/{}", event.reason, event.namespace, event.name),
            severity: event.level.clone(),
            fields,
            rendered_timestamp: render_timestamp(event.last_timestamp, offset),
            occurred_at: event.last_timestamp.map(|ts| ts.timestamp()),
            suppressible: true,
        }
    }

    /// Build the candidate for an anomalous node condition
    pub fn from_condition(node: &str, condition: &Condition, offset: FixedOffset) -> Self {
        Self {
            origin: AlertOrigin::NodeCondition,
            title: format!("Node {} {}={}", node, condition.condition_type, condition.status),
            severity: "Critical".to_string(),
            fields: vec![
                AlertField::new("Node", node),
                AlertField::new("Condition", condition.condition_type.as_str()),
                AlertField::new("Status", condition.status.as_str()),
                AlertField::new("Reason", condition.reason.as_str()),
                AlertField::new("Message", condition.message.as_str()),
            ],
            rendered_timestamp: render_timestamp(condition.last_heartbeat_time, offset),
            occurred_at: condition.last_heartbeat_time.map(|ts| ts.timestamp()),
            suppressible: false,
        }
    }

    /// Human-readable multi-line body including the timestamp
    pub fn render(&self) -> String {
        let mut out = self.title.clone();
        for field in &self.fields {
            out.push_str(&format!("\n{}: {}", field.label, field.value));
        }
        out.push_str(&format!("\nTimestamp: {}", self.rendered_timestamp));
        out
    }
}

/// Format a timestamp for display, shifted by `offset`
pub fn render_timestamp(ts: Option<DateTime<Utc>>, offset: FixedOffset) -> String {
    match ts {
        Some(ts) => ts.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

/// Current Unix timestamp in seconds
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event() -> EventRecord {
        EventRecord {
            namespace: "default".to_string(),
            name: "web-1.17a".to_string(),
            message: "Back-off restarting failed container".to_string(),
            reason: "BackOff".to_string(),
            level: "Warning".to_string(),
            last_timestamp: Some(Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap()),
            involved_kind: Some("Pod".to_string()),
            involved_name: Some("web-1".to_string()),
            count: Some(3),
            resource_version: "100".to_string(),
        }
    }

    #[test]
    fn test_event_candidate_render() {
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        let candidate = AlertCandidate::from_event(&event(), offset);

        assert!(candidate.suppressible);
        assert_eq!(candidate.rendered_timestamp, "2024-03-01 12:00:00");
        let rendered = candidate.render();
        assert!(rendered.starts_with("BackOff default/web-1.17a"));
        assert!(rendered.contains("\nLevel: Warning"));
        assert!(rendered.contains("\nObject: Pod/web-1"));
        assert!(rendered.ends_with("Timestamp: 2024-03-01 12:00:00"));
    }

    #[test]
    fn test_missing_timestamp_renders_placeholder() {
        let offset = FixedOffset::east_opt(0).unwrap();
        assert_eq!(render_timestamp(None, offset), "-");
    }
}
