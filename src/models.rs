//! Data models for the fan-in aggregator.
//!
//! This module contains the typed completion signals exchanged between
//! producers and the coordinator, and the summary a run reports when it ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a producer within one run (`0..N`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProducerId(usize);

impl ProducerId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "producer-{}", self.0)
    }
}

/// Completion signal sent exactly once by every producer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The producer emitted its whole sequence.
    Finished { producer: ProducerId, emitted: u64 },
    /// The producer stopped because the run was halted.
    Cancelled { producer: ProducerId, emitted: u64 },
    /// The producer returned an error or panicked.
    Faulted { producer: ProducerId, reason: String },
}

impl Completion {
    pub fn producer(&self) -> ProducerId {
        match self {
            Completion::Finished { producer, .. }
            | Completion::Cancelled { producer, .. }
            | Completion::Faulted { producer, .. } => *producer,
        }
    }
}

/// What the coordinator does with the other producers once one faults.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum FaultPolicy {
    /// Halt every remaining producer on the first fault.
    #[default]
    FailFast,
    /// Let the remaining producers finish, then report the fault.
    Drain,
}

impl fmt::Display for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultPolicy::FailFast => write!(f, "fail-fast"),
            FaultPolicy::Drain => write!(f, "drain"),
        }
    }
}

/// Outcome of one aggregator run, assembled by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Compact timestamp identifying the run.
    pub run_id: String,
    /// Number of producers spawned.
    pub producers: usize,
    /// Producers that emitted their whole sequence.
    pub finished: usize,
    /// Producers that stopped early because the run was halted.
    pub cancelled: usize,
    /// Producers that returned an error or panicked.
    pub faulted: usize,
    /// Producers aborted after the shutdown grace period.
    pub aborted: usize,
    /// Values accepted by the output channel across all producers.
    pub values_emitted: u64,
    /// First fault observed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_fault: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub(crate) fn new(run_id: String, producers: usize) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            producers,
            finished: 0,
            cancelled: 0,
            faulted: 0,
            aborted: 0,
            values_emitted: 0,
            first_fault: None,
            started_at: now,
            finished_at: now,
        }
    }

    /// Tallies one completion signal.
    pub(crate) fn record(&mut self, completion: &Completion) {
        match completion {
            Completion::Finished { .. } => self.finished += 1,
            Completion::Cancelled { .. } => self.cancelled += 1,
            Completion::Faulted { producer, reason } => {
                self.faulted += 1;
                if self.first_fault.is_none() {
                    self.first_fault = Some(format!("{}: {}", producer, reason));
                }
            }
        }
    }

    /// Number of producers whose completion was observed.
    pub fn completed(&self) -> usize {
        self.finished + self.cancelled + self.faulted
    }

    /// True when every producer emitted its whole sequence.
    pub fn is_clean(&self) -> bool {
        self.finished == self.producers && self.aborted == 0
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_id_display() {
        assert_eq!(ProducerId::new(3).to_string(), "producer-3");
        assert_eq!(ProducerId::new(3).index(), 3);
    }

    #[test]
    fn test_completion_producer() {
        let c = Completion::Faulted {
            producer: ProducerId::new(1),
            reason: "x".to_string(),
        };
        assert_eq!(c.producer(), ProducerId::new(1));
    }

    #[test]
    fn test_summary_record() {
        let mut summary = RunSummary::new("20260101000000".to_string(), 3);
        summary.record(&Completion::Finished {
            producer: ProducerId::new(0),
            emitted: 10,
        });
        summary.record(&Completion::Faulted {
            producer: ProducerId::new(1),
            reason: "boom".to_string(),
        });
        summary.record(&Completion::Faulted {
            producer: ProducerId::new(2),
            reason: "later".to_string(),
        });

        assert_eq!(summary.finished, 1);
        assert_eq!(summary.faulted, 2);
        assert_eq!(summary.completed(), 3);
        assert_eq!(summary.first_fault.as_deref(), Some("producer-1: boom"));
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_fault_policy_serde() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: FaultPolicy,
        }

        let w: Wrapper = toml::from_str(r#"policy = "fail-fast""#).unwrap();
        assert_eq!(w.policy, FaultPolicy::FailFast);
        let w: Wrapper = toml::from_str(r#"policy = "drain""#).unwrap();
        assert_eq!(w.policy, FaultPolicy::Drain);
        assert_eq!(FaultPolicy::default().to_string(), "fail-fast");
    }
}
