use super::{Payload, Sink, SinkError};
use crate::types::ChangeItem;
use async_trait::async_trait;

/// Human-readable tail of everything the monitor sees, on stdout
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

/// One-line summary of a payload
pub fn format_payload(payload: &Payload<'_>) -> String {
    match payload {
        Payload::Record(ChangeItem::Event(event)) => format!(
            "[event] {} {}/{} {}: {}",
            event.level, event.namespace, event.name, event.reason, event.message
        ),
        Payload::Record(ChangeItem::Node(node)) => {
            let conditions: Vec<String> = node
                .conditions
                .iter()
                .map(|c| format!("{}={}", c.condition_type, c.status))
                .collect();
            format!("[node] {} {}", node.name, conditions.join(" "))
        }
        Payload::Record(ChangeItem::Fatal(fatal)) => format!("[fatal] {}", fatal),
        Payload::Alert(alert) => format!(
            "[alert] {} {} @ {}",
            alert.severity, alert.title, alert.rendered_timestamp
        ),
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn handle(&self, payload: Payload<'_>) -> Result<(), SinkError> {
        println!("{}", format_payload(&payload));
        Ok(())
    }
}
