//! Liveness evaluation: infers that an instance is gone from the absence
//! of heartbeats.
//!
//! A record promised a heartbeat every `updateIntervalSeconds`. Once
//! `time + interval + grace` has passed with no newer heartbeat, the record
//! is stale and is flipped offline through the ordinary upsert path.
//!
//! Evaluation is a point-in-time sweep driven by the caller with an explicit
//! `now`; nothing here runs on a timer.

use pulse_core::config::DEFAULT_GRACE_PERIOD_SECS;
use serde::Serialize;

use crate::record::ServiceRecord;
use crate::store::RecordStore;

/// Staleness verdict for one record at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Liveness {
    /// Next heartbeat is not yet overdue.
    Fresh { deadline: f64 },
    /// Deadline passed `overdue` seconds ago.
    Stale { deadline: f64, overdue: f64 },
    /// The record's time could not be read; no verdict.
    Unknown,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    /// Records past their deadline, whether or not they were already offline.
    pub stale: usize,
    /// Records this sweep moved from online to offline.
    pub went_offline: usize,
    /// Records skipped because their time was unreadable.
    pub unevaluable: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivenessEvaluator {
    grace_period_secs: f64,
}

impl Default for LivenessEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_PERIOD_SECS)
    }
}

impl LivenessEvaluator {
    pub fn new(grace_period_secs: f64) -> Self {
        Self { grace_period_secs }
    }

    pub fn grace_period_secs(&self) -> f64 {
        self.grace_period_secs
    }

    /// Latest instant (epoch seconds) at which the record still counts as online.
    pub fn deadline(&self, record: &ServiceRecord) -> Option<f64> {
        let reported = record.heartbeat.time.as_epoch_secs()?;
        let interval = record.heartbeat.metrics.update_interval_seconds;
        Some(reported + (interval + self.grace_period_secs))
    }

    pub fn evaluate(&self, record: &ServiceRecord, now: f64) -> Liveness {
        match self.deadline(record) {
            Some(deadline) if now > deadline => Liveness::Stale {
                deadline,
                overdue: now - deadline,
            },
            Some(deadline) => Liveness::Fresh { deadline },
            None => Liveness::Unknown,
        }
    }

    pub fn is_stale(&self, record: &ServiceRecord, now: f64) -> bool {
        matches!(self.evaluate(record, now), Liveness::Stale { .. })
    }

    /// Evaluate every record at `now` and mark the stale ones offline.
    ///
    /// The scan and the resulting updates run under one store lock, so a
    /// heartbeat can't slip in between the verdict and the write.
    pub fn sweep(&self, store: &RecordStore, now: f64) -> SweepReport {
        let mut report = SweepReport::default();
        let mut guard = store.lock();

        let mut offline = Vec::new();
        for record in guard.iter() {
            report.examined += 1;
            match self.evaluate(record, now) {
                Liveness::Fresh { deadline } => {
                    tracing::trace!(
                        service = record.service_name(),
                        key = %record.key(),
                        deadline,
                        now,
                        "record fresh"
                    );
                }
                Liveness::Stale { deadline, overdue } => {
                    report.stale += 1;
                    if record.online {
                        report.went_offline += 1;
                        tracing::info!(
                            service = record.service_name(),
                            key = %record.key(),
                            deadline,
                            overdue,
                            "service went offline"
                        );
                    }
                    let mut copy = record.clone();
                    copy.online = false;
                    offline.push(copy);
                }
                Liveness::Unknown => {
                    report.unevaluable += 1;
                    tracing::warn!(
                        key = %record.key(),
                        time = ?record.heartbeat.time,
                        "record time is unreadable, skipping liveness check"
                    );
                }
            }
        }

        for record in offline {
            if let Err(e) = guard.upsert(record) {
                tracing::warn!(error = %e, "failed to mark record offline");
            }
        }

        report
    }
}
