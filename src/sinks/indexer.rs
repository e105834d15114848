//! Search-index sink
//!
//! Each delivered alert becomes one document in a daily index
//! (`{prefix}-YYYY.MM.DD`), written through the `_doc` endpoint.

use super::{Payload, Sink, SinkError};
use crate::types::AlertCandidate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::time::Duration;

pub struct IndexerSink {
    client: reqwest::Client,
    endpoint: String,
    index_prefix: String,
    cluster_name: String,
}

impl IndexerSink {
    pub fn new(
        endpoint: impl Into<String>,
        index_prefix: impl Into<String>,
        cluster_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            index_prefix: index_prefix.into(),
            cluster_name: cluster_name.into(),
        })
    }

    pub fn index_name(&self, at: DateTime<Utc>) -> String {
        format!("{}-{}", self.index_prefix, at.format("%Y.%m.%d"))
    }

    /// Alert fields plus cluster label and record timestamp
    pub fn build_document(&self, alert: &AlertCandidate, at: DateTime<Utc>) -> Value {
        let mut doc = Map::new();
        for field in &alert.fields {
            doc.insert(field.label.to_lowercase(), Value::String(field.value.clone()));
        }
        doc.insert("title".to_string(), Value::String(alert.title.clone()));
        doc.insert("severity".to_string(), Value::String(alert.severity.clone()));
        doc.insert(
            "origin".to_string(),
            serde_json::to_value(alert.origin).unwrap_or(Value::Null),
        );
        doc.insert("timestamp".to_string(), Value::String(alert.rendered_timestamp.clone()));
        doc.insert("cluster".to_string(), Value::String(self.cluster_name.clone()));
        doc.insert("@timestamp".to_string(), Value::String(at.to_rfc3339()));
        Value::Object(doc)
    }

    pub async fn index(&self, document: &Value, at: DateTime<Utc>) -> Result<(), SinkError> {
        let url = format!("{}/{}/_doc", self.endpoint, self.index_name(at));
        let response = self.client.post(&url).json(document).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                sink: self.name().to_string(),
                reason: format!("HTTP {}: {}", status, body),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for IndexerSink {
    fn name(&self) -> &str {
        "indexer"
    }

    async fn handle(&self, payload: Payload<'_>) -> Result<(), SinkError> {
        let Payload::Alert(alert) = payload else {
            return Ok(());
        };
        let now = Utc::now();
        let document = self.build_document(alert, now);
        self.index(&document, now).await
    }
}
