//! Consumer loop - the single reader of the intake queue
//!
//! ```text
//! WAITING ──recv──▶ PROCESSING ──▶ WAITING
//!                        │
//!                   FatalError ──▶ stop (source failed)
//! ```
//!
//! Every record is dispatched unfiltered first. Events at the configured
//! level that are fresh enough go through convergence; node conditions go
//! straight to the sinks.

use super::convergence::{ConvergenceEngine, Verdict};
use super::dispatcher::Dispatcher;
use super::intake::IntakeReceiver;
use super::node_eval::evaluate_node;
use crate::sinks::Payload;
use crate::types::{current_timestamp, AlertCandidate, ChangeItem, EventRecord, FatalError};
use chrono::FixedOffset;
use std::future::Future;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Event filtering applied before convergence
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Event type that raises alerts (e.g. "Warning")
    pub level: String,
    /// Maximum event age in seconds (0 = no limit)
    pub max_age_secs: i64,
}

/// Why the consumer loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumerExit {
    /// Termination signal received
    Shutdown,
    /// A watch source reported a fatal fault
    SourceFailed(FatalError),
    /// Every producer went away without reporting
    IntakeClosed,
}

impl ConsumerExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            ConsumerExit::Shutdown => 0,
            ConsumerExit::SourceFailed(_) | ConsumerExit::IntakeClosed => 1,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub records: u64,
    pub alerts_delivered: u64,
    pub alerts_suppressed: u64,
    pub stale_events: u64,
    pub sink_failures: u64,
}

pub struct Consumer {
    filter: EventFilter,
    offset: FixedOffset,
    engine: ConvergenceEngine,
    dispatcher: Dispatcher,
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
    stats: ConsumerStats,
}

impl Consumer {
    pub fn new(
        filter: EventFilter,
        offset: FixedOffset,
        engine: ConvergenceEngine,
        dispatcher: Dispatcher,
    ) -> Self {
        Self::new_with_timestamp_fn(filter, offset, engine, dispatcher, Box::new(current_timestamp))
    }

    /// Consumer with a custom clock (Unix seconds), used for deterministic tests
    pub fn new_with_timestamp_fn(
        filter: EventFilter,
        offset: FixedOffset,
        engine: ConvergenceEngine,
        dispatcher: Dispatcher,
        now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        Self {
            filter,
            offset,
            engine,
            dispatcher,
            now_fn,
            stats: ConsumerStats::default(),
        }
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    pub fn engine(&self) -> &ConvergenceEngine {
        &self.engine
    }

    /// Pull items until shutdown, a fatal source fault, or queue closure
    pub async fn run<S>(&mut self, intake: &mut IntakeReceiver, shutdown: S) -> ConsumerExit
    where
        S: Future<Output = ()>,
    {
        log::info!("🚀 Consumer loop started, waiting for items...");

        tokio::pin!(shutdown);
        let mut stats_timer = interval(Duration::from_secs(60));
        stats_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        stats_timer.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("⚠️  Shutdown requested, stopping consumer");
                    return ConsumerExit::Shutdown;
                }
                item = intake.recv() => {
                    let Some(item) = item else {
                        log::warn!("⚠️  Intake queue closed, stopping consumer");
                        return ConsumerExit::IntakeClosed;
                    };
                    if let Err(fatal) = self.process(item).await {
                        log::error!("💥 {}", fatal);
                        return ConsumerExit::SourceFailed(fatal);
                    }
                }
                _ = stats_timer.tick() => {
                    log::info!(
                        "📊 records={} delivered={} suppressed={} stale={} sink_failures={} | fingerprints={} | intake: {}/{}",
                        self.stats.records,
                        self.stats.alerts_delivered,
                        self.stats.alerts_suppressed,
                        self.stats.stale_events,
                        self.stats.sink_failures,
                        self.engine.len(),
                        intake.len(),
                        intake.capacity()
                    );
                }
            }
        }
    }

    /// Handle one item; a fatal item is returned without being dispatched
    pub async fn process(&mut self, item: ChangeItem) -> Result<(), FatalError> {
        match &item {
            ChangeItem::Fatal(fatal) => return Err(fatal.clone()),
            ChangeItem::Event(event) => {
                self.record(&item).await;
                if let Some(candidate) = self.event_candidate(event) {
                    let verdict = self.engine.evaluate(&candidate, (self.now_fn)());
                    if verdict.is_deliver() {
                        log::info!("🚨 {:?}: {}", verdict, candidate.title);
                        self.alert(&candidate).await;
                    } else {
                        log::debug!("🔇 Suppressed: {}", candidate.title);
                        self.stats.alerts_suppressed += 1;
                    }
                }
            }
            ChangeItem::Node(node) => {
                self.record(&item).await;
                for candidate in evaluate_node(node, self.offset) {
                    log::info!("🚨 {:?}: {}", Verdict::Bypass, candidate.title);
                    self.alert(&candidate).await;
                }
            }
        }
        Ok(())
    }

    fn event_candidate(&mut self, event: &EventRecord) -> Option<AlertCandidate> {
        if event.level != self.filter.level {
            return None;
        }

        if self.filter.max_age_secs > 0 {
            if let Some(ts) = event.last_timestamp {
                let age = (self.now_fn)() - ts.timestamp();
                if age > self.filter.max_age_secs {
                    log::debug!(
                        "⏭️  Skipping stale event {}/{} ({}s old)",
                        event.namespace,
                        event.name,
                        age
                    );
                    self.stats.stale_events += 1;
                    return None;
                }
            }
        }

        Some(AlertCandidate::from_event(event, self.offset))
    }

    async fn record(&mut self, item: &ChangeItem) {
        self.stats.records += 1;
        let report = self.dispatcher.dispatch(Payload::Record(item)).await;
        self.stats.sink_failures += report.failed.len() as u64;
    }

    async fn alert(&mut self, candidate: &AlertCandidate) {
        self.stats.alerts_delivered += 1;
        let report = self.dispatcher.dispatch(Payload::Alert(candidate)).await;
        self.stats.sink_failures += report.failed.len() as u64;
    }
}
