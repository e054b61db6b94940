//! Stock producers.
//!
//! `count_up` is the counting producer behind [`crate::run`]. The fault
//! plan variant injects a failure into one chosen producer, which the CLI
//! and the tests use to exercise fault propagation.

use crate::aggregator::Emitter;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How an injected fault manifests.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum FaultKind {
    /// The producer returns an error.
    #[default]
    Error,
    /// The producer panics.
    Panic,
}

/// Makes one producer fail part-way through its sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPlan {
    /// Index of the producer that fails.
    pub producer: usize,
    /// Values emitted before the failure.
    pub after: i64,
    pub kind: FaultKind,
}

impl FaultPlan {
    pub fn new(producer: usize, after: i64, kind: FaultKind) -> Self {
        Self {
            producer,
            after,
            kind,
        }
    }
}

/// Emits `0..count` in order.
pub async fn count_up(mut emitter: Emitter<i64>, count: i64) -> Result<()> {
    for value in 0..count {
        emitter.emit(value).await?;
    }
    debug!(producer = %emitter.producer(), count, "Producer emitted full sequence");
    Ok(())
}

/// Like [`count_up`], but fails as planned when the plan targets this producer.
pub async fn count_up_with_fault(
    mut emitter: Emitter<i64>,
    count: i64,
    plan: Option<FaultPlan>,
) -> Result<()> {
    let plan = plan.filter(|p| p.producer == emitter.producer().index());

    for value in 0..count {
        if let Some(plan) = plan {
            if value == plan.after {
                return trip(&emitter, plan);
            }
        }
        emitter.emit(value).await?;
    }

    // A plan past the end of the sequence still fires, once everything is out.
    match plan {
        Some(plan) if plan.after >= count => trip(&emitter, plan),
        _ => Ok(()),
    }
}

fn trip(emitter: &Emitter<i64>, plan: FaultPlan) -> Result<()> {
    let reason = format!("injected fault after {} values", plan.after);
    match plan.kind {
        FaultKind::Error => Err(emitter.fault(reason)),
        FaultKind::Panic => panic!("{}", reason),
    }
}
