//! Decoding of Kubernetes watch frames into [`ChangeItem`]s
//!
//! Only the fields the monitor uses are modelled; everything else in the
//! API objects is ignored by serde.

use crate::types::{ChangeItem, Condition, EventRecord, NodeRecord, ResourceKind};
use crate::watch::stream::{StreamError, WatchFrame};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    #[serde(default)]
    name: String,
    namespace: Option<String>,
    resource_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectReference {
    kind: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventObject {
    metadata: ObjectMeta,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(rename = "type", default)]
    level: Option<String>,
    last_timestamp: Option<DateTime<Utc>>,
    event_time: Option<DateTime<Utc>>,
    first_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    involved_object: ObjectReference,
    count: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeCondition {
    #[serde(rename = "type")]
    condition_type: String,
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    last_heartbeat_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct NodeStatus {
    #[serde(default)]
    conditions: Vec<NodeCondition>,
}

#[derive(Debug, Deserialize)]
struct NodeObject {
    metadata: ObjectMeta,
    #[serde(default)]
    status: NodeStatus,
}

#[derive(Debug, Default, Deserialize)]
struct Status {
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

/// What a watch frame means to its source
#[derive(Debug, PartialEq)]
pub enum Decoded {
    /// ADDED / MODIFIED / DELETED object
    Item(ChangeItem),
    /// Progress marker carrying only a resource version
    Bookmark(String),
}

/// Resource version of any frame object, if present
pub fn resource_version(frame: &WatchFrame) -> Option<String> {
    frame
        .object
        .get("metadata")
        .and_then(|meta| meta.get("resourceVersion"))
        .and_then(|rv| rv.as_str())
        .map(str::to_string)
}

/// Decode a frame for the given resource kind
///
/// `ERROR` frames come back as errors: [`StreamError::Expired`] for 410 Gone,
/// [`StreamError::Http`] for anything else the server reports.
pub fn decode_frame(kind: ResourceKind, frame: &WatchFrame) -> Result<Decoded, StreamError> {
    match frame.event_type.as_str() {
        "ERROR" => {
            let status: Status = serde_json::from_value(frame.object.clone())
                .map_err(|e| StreamError::Decode(e.to_string()))?;
            match status.code {
                Some(410) => Err(StreamError::Expired(status.message)),
                Some(code) => Err(StreamError::Http {
                    status: code,
                    body: status.message,
                }),
                None => Err(StreamError::Decode(format!(
                    "watch error without status code: {}",
                    status.message
                ))),
            }
        }
        "BOOKMARK" => resource_version(frame)
            .map(Decoded::Bookmark)
            .ok_or_else(|| StreamError::Decode("bookmark without resourceVersion".to_string())),
        "ADDED" | "MODIFIED" | "DELETED" => {
            let item = match kind {
                ResourceKind::Event => ChangeItem::Event(decode_event(&frame.object)?),
                ResourceKind::Node => ChangeItem::Node(decode_node(&frame.object)?),
            };
            Ok(Decoded::Item(item))
        }
        other => Err(StreamError::Decode(format!("unknown watch type {}", other))),
    }
}

fn decode_event(object: &serde_json::Value) -> Result<EventRecord, StreamError> {
    let event: EventObject =
        serde_json::from_value(object.clone()).map_err(|e| StreamError::Decode(e.to_string()))?;

    Ok(EventRecord {
        namespace: event.metadata.namespace.unwrap_or_default(),
        name: event.metadata.name,
        message: event.message.unwrap_or_default(),
        reason: event.reason.unwrap_or_default(),
        level: event.level.unwrap_or_default(),
        last_timestamp: event
            .last_timestamp
            .or(event.event_time)
            .or(event.first_timestamp),
        involved_kind: event.involved_object.kind,
        involved_name: event.involved_object.name,
        count: event.count,
        resource_version: event.metadata.resource_version.unwrap_or_default(),
    })
}

fn decode_node(object: &serde_json::Value) -> Result<NodeRecord, StreamError> {
    let node: NodeObject =
        serde_json::from_value(object.clone()).map_err(|e| StreamError::Decode(e.to_string()))?;

    Ok(NodeRecord {
        name: node.metadata.name,
        conditions: node
            .status
            .conditions
            .into_iter()
            .map(|c| Condition {
                condition_type: c.condition_type,
                status: c.status,
                message: c.message.unwrap_or_default(),
                reason: c.reason.unwrap_or_default(),
                last_heartbeat_time: c.last_heartbeat_time,
            })
            .collect(),
        resource_version: node.metadata.resource_version.unwrap_or_default(),
    })
}
