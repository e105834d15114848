//! Process wiring: config → client → watch sources → consumer → sinks
//!
//! Exit status: 0 after a termination signal, 1 when a watch source dies.

use crate::config::MonitorConfig;
use crate::pipeline::{
    intake_channel, Consumer, ConsumerExit, ConvergenceEngine, Dispatcher, EventFilter, Supervisor,
};
use crate::sinks::notifier::BroadcastFlags;
use crate::sinks::{ConsoleSink, IndexerSink, JsonlAuditSink, NotifierSink, SinkError};
use crate::types::ResourceKind;
use crate::watch::{ChangeStream, KubeClient, WatchSource};
use std::sync::Arc;

/// Register the sinks enabled by `config`, in delivery order
pub fn build_dispatcher(config: &MonitorConfig) -> Result<Dispatcher, SinkError> {
    let mut dispatcher = Dispatcher::new(config.sink_timeout);

    if config.console_output {
        dispatcher.register(Arc::new(ConsoleSink::new()));
    }

    dispatcher.register(Arc::new(NotifierSink::new(
        config.ding_robot.clone(),
        config.cluster_name.clone(),
        BroadcastFlags {
            event_at_all: config.event_at_all,
            node_at_all: config.node_at_all,
        },
        config.sink_timeout,
    )?));

    if let Some(es_url) = &config.es_url {
        dispatcher.register(Arc::new(IndexerSink::new(
            es_url.clone(),
            config.es_index_prefix.clone(),
            config.cluster_name.clone(),
            config.sink_timeout,
        )?));
    }

    if let Some(path) = &config.audit_log_path {
        dispatcher.register(Arc::new(JsonlAuditSink::open(path, config.cluster_name.clone())?));
    }

    Ok(dispatcher)
}

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => log::info!("⚠️  Received CTRL+C"),
                    _ = term.recv() => log::info!("⚠️  Received SIGTERM"),
                }
            }
            Err(e) => {
                log::error!("❌ Failed to listen for SIGTERM: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    log::error!("❌ Failed to listen for CTRL+C: {}", e);
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("❌ Failed to listen for CTRL+C: {}", e);
        }
    }
}

/// Run the monitor against `stream` until shutdown or a fatal source fault
///
/// Returns the process exit code.
pub async fn run_monitor<S>(
    config: &MonitorConfig,
    stream: Arc<dyn ChangeStream>,
    dispatcher: Dispatcher,
    shutdown: S,
) -> i32
where
    S: std::future::Future<Output = ()>,
{
    let (tx, mut rx) = intake_channel(config.intake_buffer);
    log::info!("✅ Intake queue created (buffer: {})", config.intake_buffer);

    let mut supervisor = Supervisor::new();
    for kind in [ResourceKind::Event, ResourceKind::Node] {
        supervisor.spawn(WatchSource::new(
            kind,
            stream.clone(),
            config.api.watch_timeout,
            tx.clone(),
        ));
    }
    // Only the sources hold producers from here on
    drop(tx);

    let mut consumer = Consumer::new(
        EventFilter {
            level: config.level.clone(),
            max_age_secs: config.event_max_age_secs,
        },
        config.timestamp_offset,
        ConvergenceEngine::new(config.convergence),
        dispatcher,
    );

    let exit = consumer.run(&mut rx, shutdown).await;

    match &exit {
        ConsumerExit::SourceFailed(fatal) => {
            // Let the failed task finish before the process goes down
            supervisor.wait_for(fatal.source).await;
            supervisor.shutdown();
        }
        ConsumerExit::Shutdown | ConsumerExit::IntakeClosed => supervisor.shutdown(),
    }

    let stats = consumer.stats();
    log::info!(
        "✅ Monitor stopped: records={} delivered={} suppressed={} (exit {})",
        stats.records,
        stats.alerts_delivered,
        stats.alerts_suppressed,
        exit.exit_code()
    );
    exit.exit_code()
}

/// Full production run from configuration
pub async fn run(config: MonitorConfig) -> Result<i32, Box<dyn std::error::Error>> {
    log::info!("🚀 Cluster monitor starting...");
    log::info!("📊 Configuration:");
    log::info!("   ├─ Cluster: {}", config.cluster_name);
    log::info!("   ├─ API host: {}", config.api.host);
    log::info!("   ├─ Alert level: {}", config.level);
    log::info!(
        "   ├─ Convergence: times={} interval={}s",
        config.convergence.times,
        config.convergence.interval_secs
    );
    log::info!(
        "   ├─ Broadcast: events={} nodes={}",
        config.event_at_all,
        config.node_at_all
    );
    log::info!(
        "   └─ Indexer: {}",
        config.es_url.as_deref().unwrap_or("disabled")
    );

    let client = KubeClient::new(&config.api)?;
    let dispatcher = build_dispatcher(&config)?;
    log::info!("✅ {} sinks registered", dispatcher.len());
    log::info!("🔄 Press CTRL+C to shutdown gracefully");

    Ok(run_monitor(&config, Arc::new(client), dispatcher, shutdown_signal()).await)
}
