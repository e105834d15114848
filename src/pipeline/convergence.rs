//! Convergence engine - content-based alert suppression
//!
//! Schedule per fingerprint:
//!
//! ```text
//! occurrence 1            → deliver (first signal)
//! occurrence 2            → deliver (confirmation)
//! later occurrences       → suppress, unless `times` occurrences were
//!                           suppressed since the last delivery or
//!                           `interval` elapsed since it → deliver
//! ```
//!
//! A release puts the fingerprint back at occurrence 1, so the occurrence
//! right after it is delivered again as a confirmation.
//!
//! The engine is owned by the consumer task and never shared, so the record
//! map needs no lock. Parallel classification would have to put it behind a
//! mutex or shard it by fingerprint.

use super::fingerprint::Fingerprint;
use crate::config::ConvergenceConfig;
use crate::types::AlertCandidate;
use std::collections::HashMap;

/// Occurrence count of a fully confirmed fingerprint with nothing suppressed
const CONFIRMED: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceRecord {
    /// Occurrences counted in the current window (1 = first seen or just released, 2 = confirmed)
    pub count: u32,
    pub last_sent_at: i64,
    pub last_seen_at: i64,
}

impl ConvergenceRecord {
    /// Occurrences suppressed since the last delivery
    pub fn suppressed(&self) -> u32 {
        self.count.saturating_sub(CONFIRMED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Fingerprint not seen before
    First,
    /// Second occurrence
    Confirm,
    /// Periodic re-notification of an ongoing problem
    Release,
    Suppress,
    /// Candidate is not suppressible
    Bypass,
}

impl Verdict {
    pub fn is_deliver(&self) -> bool {
        !matches!(self, Verdict::Suppress)
    }
}

pub struct ConvergenceEngine {
    config: ConvergenceConfig,
    records: HashMap<Fingerprint, ConvergenceRecord>,
    last_sweep: Option<i64>,
}

impl ConvergenceEngine {
    pub fn new(config: ConvergenceConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
            last_sweep: None,
        }
    }

    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    /// Whether `candidate` should reach the sinks at time `now` (Unix seconds)
    pub fn should_deliver(&mut self, candidate: &AlertCandidate, now: i64) -> bool {
        self.evaluate(candidate, now).is_deliver()
    }

    /// Record one occurrence of `candidate` and decide its fate
    pub fn evaluate(&mut self, candidate: &AlertCandidate, now: i64) -> Verdict {
        if !candidate.suppressible {
            return Verdict::Bypass;
        }

        self.maybe_sweep(now);

        let fingerprint = Fingerprint::of(candidate);
        let times = self.config.times;
        let interval = self.config.interval_secs;

        let Some(record) = self.records.get_mut(&fingerprint) else {
            self.records.insert(
                fingerprint,
                ConvergenceRecord {
                    count: 1,
                    last_sent_at: now,
                    last_seen_at: now,
                },
            );
            log::debug!("🆕 New alert fingerprint {}", fingerprint);
            return Verdict::First;
        };

        record.last_seen_at = now;

        if record.count == 1 {
            record.count = CONFIRMED;
            record.last_sent_at = now;
            return Verdict::Confirm;
        }

        record.count += 1;
        if record.suppressed() >= times || now - record.last_sent_at >= interval {
            log::debug!(
                "🔁 Releasing {} after {} suppressed occurrences ({}s since last send)",
                fingerprint,
                record.suppressed(),
                now - record.last_sent_at
            );
            record.count = 1;
            record.last_sent_at = now;
            return Verdict::Release;
        }

        Verdict::Suppress
    }

    pub fn record(&self, candidate: &AlertCandidate) -> Option<&ConvergenceRecord> {
        self.records.get(&Fingerprint::of(candidate))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop fingerprints idle for `eviction_multiplier * interval`, at most once per interval
    fn maybe_sweep(&mut self, now: i64) {
        if self.config.eviction_multiplier <= 0 {
            return;
        }
        match self.last_sweep {
            Some(last) if now - last < self.config.interval_secs => return,
            None => {
                self.last_sweep = Some(now);
                return;
            }
            Some(_) => {}
        }
        self.last_sweep = Some(now);

        let ttl = self
            .config
            .interval_secs
            .saturating_mul(self.config.eviction_multiplier);
        let before = self.records.len();
        self.records.retain(|_, record| now - record.last_seen_at < ttl);
        let evicted = before - self.records.len();
        if evicted > 0 {
            log::debug!("🧹 Evicted {} idle fingerprints ({} remain)", evicted, self.records.len());
        }
    }
}
