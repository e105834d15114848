//! Fan-out of payloads to every registered sink
//!
//! Sinks run one after another in registration order. Each call is bounded
//! by a timeout; errors and timeouts are logged here and go no further.

use crate::sinks::{Payload, Sink, SinkError};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one dispatch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Names of sinks that failed, in call order
    pub failed: Vec<String>,
}

pub struct Dispatcher {
    sinks: Vec<Arc<dyn Sink>>,
    sink_timeout: Duration,
}

impl Dispatcher {
    pub fn new(sink_timeout: Duration) -> Self {
        Self {
            sinks: Vec::new(),
            sink_timeout,
        }
    }

    pub fn register(&mut self, sink: Arc<dyn Sink>) {
        log::info!("   ├─ Sink registered: {}", sink.name());
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.register(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub async fn dispatch(&self, payload: Payload<'_>) -> DispatchReport {
        let mut report = DispatchReport::default();

        for sink in &self.sinks {
            let result = match tokio::time::timeout(self.sink_timeout, sink.handle(payload)).await {
                Ok(result) => result,
                Err(_) => Err(SinkError::Timeout(self.sink_timeout)),
            };

            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    log::error!("❌ Sink {} failed: {}", sink.name(), e);
                    report.failed.push(sink.name().to_string());
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlertCandidate, AlertField, AlertOrigin};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FailingSink;

    #[async_trait]
    impl Sink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn handle(&self, _payload: Payload<'_>) -> Result<(), SinkError> {
            Err(SinkError::Rejected {
                sink: "failing".to_string(),
                reason: "always".to_string(),
            })
        }
    }

    struct HangingSink;

    #[async_trait]
    impl Sink for HangingSink {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn handle(&self, _payload: Payload<'_>) -> Result<(), SinkError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingSink {
        name: String,
        titles: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Sink for CountingSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, payload: Payload<'_>) -> Result<(), SinkError> {
            if let Payload::Alert(alert) = payload {
                self.titles.lock().unwrap().push(alert.title.clone());
            }
            Ok(())
        }
    }

    fn alert() -> AlertCandidate {
        AlertCandidate {
            origin: AlertOrigin::NodeCondition,
            title: "Node node-a Ready=False".to_string(),
            severity: "Critical".to_string(),
            fields: vec![AlertField::new("Node", "node-a")],
            rendered_timestamp: "-".to_string(),
            occurred_at: None,
            suppressible: false,
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_sinks() {
        let second = Arc::new(CountingSink {
            name: "second".to_string(),
            ..Default::default()
        });
        let third = Arc::new(CountingSink {
            name: "third".to_string(),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(Duration::from_secs(1))
            .with_sink(Arc::new(FailingSink))
            .with_sink(second.clone())
            .with_sink(third.clone());

        let report = dispatcher.dispatch(Payload::Alert(&alert())).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, vec!["failing".to_string()]);
        assert_eq!(second.titles.lock().unwrap().len(), 1);
        assert_eq!(third.titles.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hanging_sink_times_out() {
        let after = Arc::new(CountingSink {
            name: "after".to_string(),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(Duration::from_millis(50))
            .with_sink(Arc::new(HangingSink))
            .with_sink(after.clone());

        let report = dispatcher.dispatch(Payload::Alert(&alert())).await;

        assert_eq!(report.failed, vec!["hanging".to_string()]);
        assert_eq!(after.titles.lock().unwrap().len(), 1);
    }
}
