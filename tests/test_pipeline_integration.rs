//! End-to-end tests: scripted watch streams through intake, consumer,
//! convergence and dispatch.
//!
//! Key integration points tested:
//! - Repeated identical warnings converge to a bounded number of alerts
//! - Node transitions alert once per anomalous observation
//! - A fatal source stops the monitor with exit status 1
//! - A failing sink does not starve the sinks after it

mod common;

#[cfg(test)]
mod pipeline_integration_tests {
    use super::common::{
        event_frame, node_frame, wait_until, BrokenSink, RecordingSink, Script, ScriptedStream,
    };
    use chrono::FixedOffset;
    use eventer::config::{ConvergenceConfig, MonitorConfig};
    use eventer::pipeline::{
        intake_channel, Consumer, ConsumerExit, ConvergenceEngine, Dispatcher, EventFilter,
    };
    use eventer::runtime::run_monitor;
    use eventer::sinks::Payload;
    use eventer::types::{ChangeItem, ResourceKind};
    use eventer::watch::{StreamError, WatchSource};
    use std::sync::Arc;
    use std::time::Duration;

    const BASE: i64 = 1_700_000_000;

    fn consumer(sink: Arc<RecordingSink>, times: u32) -> Consumer {
        Consumer::new_with_timestamp_fn(
            EventFilter {
                level: "Warning".to_string(),
                max_age_secs: 60,
            },
            FixedOffset::east_opt(8 * 3600).unwrap(),
            ConvergenceEngine::new(ConvergenceConfig {
                times,
                interval_secs: 180,
                eviction_multiplier: 10,
            }),
            Dispatcher::new(Duration::from_secs(1)).with_sink(sink),
            Box::new(|| BASE + 50),
        )
    }

    fn monitor_config() -> MonitorConfig {
        MonitorConfig::from_lookup(|key| match key {
            "CLUSTER_NAME" => Some("test-cluster".to_string()),
            "DING_ROBOT" => Some("http://127.0.0.1:9/robot/send".to_string()),
            "INTAKE_BUFFER" => Some("64".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_repeated_warnings_converge() {
        // 1. Twelve identical warnings, one second apart, in a single connection
        let frames = (0..12).map(|i| event_frame(100 + i as u64, BASE + i)).collect();
        let stream = Arc::new(
            ScriptedStream::new().script(ResourceKind::Event, Script::Connect(frames)),
        );

        // 2. Source feeds the intake; the consumer runs with a frozen clock
        let (tx, mut rx) = intake_channel(64);
        let source = tokio::spawn(
            WatchSource::new(ResourceKind::Event, stream, Duration::from_secs(5), tx).run(),
        );
        let sink = Arc::new(RecordingSink::default());
        let mut consumer = consumer(sink.clone(), 10);

        let probe = sink.clone();
        let exit = consumer
            .run(&mut rx, async move {
                wait_until(|| probe.record_count() == 12).await;
            })
            .await;
        source.abort();

        // 3. First, confirmation, then release once ten were suppressed
        assert_eq!(exit, ConsumerExit::Shutdown);
        assert_eq!(sink.record_count(), 12);
        assert_eq!(sink.alert_count(), 3);
        assert_eq!(consumer.stats().alerts_suppressed, 9);
        assert_eq!(consumer.engine().len(), 1);

        let alerts = sink.alerts.lock().unwrap();
        assert!(alerts.iter().all(|a| a.title == "Unhealthy shop/api-7d9f.17b"));
        // Occurrences 1, 2 and 12 carry their own timestamps
        let times: Vec<_> = alerts.iter().map(|a| a.rendered_timestamp.clone()).collect();
        assert_eq!(
            times,
            vec!["2023-11-15 06:13:20", "2023-11-15 06:13:21", "2023-11-15 06:13:31"]
        );
    }

    #[tokio::test]
    async fn test_node_flap_alerts_once() {
        let stream = Arc::new(ScriptedStream::new().script(
            ResourceKind::Node,
            Script::Connect(vec![
                node_frame(1, "True"),
                node_frame(2, "False"),
                node_frame(3, "True"),
            ]),
        ));

        let (tx, mut rx) = intake_channel(16);
        let source = tokio::spawn(
            WatchSource::new(ResourceKind::Node, stream, Duration::from_secs(5), tx).run(),
        );
        let sink = Arc::new(RecordingSink::default());
        let mut consumer = consumer(sink.clone(), 10);

        let probe = sink.clone();
        consumer
            .run(&mut rx, async move {
                wait_until(|| probe.record_count() == 3).await;
            })
            .await;
        source.abort();

        assert_eq!(sink.record_count(), 3);
        assert_eq!(sink.alert_count(), 1);
        let alerts = sink.alerts.lock().unwrap();
        assert_eq!(alerts[0].title, "Node worker-1 Ready=False");
        assert_eq!(alerts[0].severity, "Critical");
        // Node alerts never enter the convergence table
        assert!(consumer.engine().is_empty());
    }

    #[tokio::test]
    async fn test_fatal_source_exits_with_failure() {
        let stream = Arc::new(ScriptedStream::new().script(
            ResourceKind::Node,
            Script::Refuse(StreamError::Http {
                status: 401,
                body: "Unauthorized".to_string(),
            }),
        ));
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(Duration::from_secs(1)).with_sink(sink.clone());

        let code = tokio::time::timeout(
            Duration::from_secs(5),
            run_monitor(&monitor_config(), stream, dispatcher, std::future::pending()),
        )
        .await
        .expect("monitor should stop on a fatal source");

        assert_eq!(code, 1);
        assert_eq!(sink.record_count(), 0);
        assert_eq!(sink.alert_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_exits_cleanly() {
        let stream = Arc::new(ScriptedStream::new());
        let dispatcher = Dispatcher::new(Duration::from_secs(1));

        let code = run_monitor(&monitor_config(), stream, dispatcher, async {}).await;
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_monitor_dispatches_until_shutdown() {
        let now = chrono::Utc::now().timestamp();
        let stream = Arc::new(
            ScriptedStream::new()
                .script(
                    ResourceKind::Event,
                    Script::Connect(vec![event_frame(10, now), event_frame(11, now)]),
                )
                .script(ResourceKind::Node, Script::Connect(vec![node_frame(20, "Unknown")])),
        );
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(Duration::from_secs(1)).with_sink(sink.clone());

        let probe = sink.clone();
        let code = run_monitor(&monitor_config(), stream, dispatcher, async move {
            wait_until(|| probe.record_count() == 3).await;
        })
        .await;

        assert_eq!(code, 0);
        assert_eq!(sink.record_count(), 3);
        // Two event deliveries (first + confirm) and one node alert
        assert_eq!(sink.alert_count(), 3);
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let second = Arc::new(RecordingSink::default());
        let third = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(Duration::from_secs(1))
            .with_sink(Arc::new(BrokenSink))
            .with_sink(second.clone())
            .with_sink(third.clone());

        let item = ChangeItem::Fatal(eventer::types::FatalError {
            source: ResourceKind::Event,
            message: "probe".to_string(),
        });
        let report = dispatcher.dispatch(Payload::Record(&item)).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, vec!["broken".to_string()]);
        assert_eq!(second.record_count(), 1);
        assert_eq!(third.record_count(), 1);
    }
}
