//! Intake queue shared by the watch sources and the consumer loop
//!
//! Multi-producer, single-consumer FIFO. Order is preserved per producer;
//! interleaving across producers is arrival order.

use crate::types::ChangeItem;
use tokio::sync::mpsc;

/// Producer handle, one clone per watch source
#[derive(Debug, Clone)]
pub struct IntakeSender {
    tx: mpsc::Sender<ChangeItem>,
}

/// The single consumer end
#[derive(Debug)]
pub struct IntakeReceiver {
    rx: mpsc::Receiver<ChangeItem>,
    capacity: usize,
}

/// Create a bounded intake queue
///
/// Producers wait when the queue is full, pushing backpressure onto the
/// watch connections instead of growing memory.
pub fn intake_channel(capacity: usize) -> (IntakeSender, IntakeReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (IntakeSender { tx }, IntakeReceiver { rx, capacity })
}

impl IntakeSender {
    /// Push an item; fails only when the consumer has gone away
    pub async fn send(&self, item: ChangeItem) -> Result<(), mpsc::error::SendError<ChangeItem>> {
        self.tx.send(item).await
    }
}

impl IntakeReceiver {
    /// Next item in receipt order, `None` once every producer is dropped
    pub async fn recv(&mut self) -> Option<ChangeItem> {
        self.rx.recv().await
    }

    /// Items currently waiting
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FatalError, NodeRecord, ResourceKind};

    fn node(rv: &str) -> ChangeItem {
        ChangeItem::Node(NodeRecord {
            name: "node-a".to_string(),
            conditions: vec![],
            resource_version: rv.to_string(),
        })
    }

    #[tokio::test]
    async fn test_per_producer_order_preserved() {
        let (tx, mut rx) = intake_channel(16);
        let tx_other = tx.clone();

        let producer = tokio::spawn(async move {
            for i in 0..5 {
                tx.send(node(&i.to_string())).await.unwrap();
            }
        });
        let other = tokio::spawn(async move {
            tx_other
                .send(ChangeItem::Fatal(FatalError {
                    source: ResourceKind::Event,
                    message: "boom".to_string(),
                }))
                .await
                .unwrap();
        });
        producer.await.unwrap();
        other.await.unwrap();

        let mut versions = Vec::new();
        let mut fatal_seen = false;
        while let Some(item) = rx.recv().await {
            match item {
                ChangeItem::Fatal(_) => fatal_seen = true,
                other => versions.push(other.resource_version().unwrap().to_string()),
            }
        }

        assert!(fatal_seen);
        assert_eq!(versions, vec!["0", "1", "2", "3", "4"]);
    }
}
