//! Fan-in entry points: spawning producers and the coordinator.

use super::coordinator::Coordinator;
use super::emitter::Emitter;
use super::stream::FanInStream;
use crate::error::{FanInError, Result};
use crate::models::{Completion, FaultPolicy, ProducerId, RunSummary};
use crate::producers::{count_up, count_up_with_fault, FaultPlan};
use crate::timestamp;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Tuning for a fan-in run.
#[derive(Debug, Clone)]
pub struct FanInConfig {
    /// Output channel capacity (producers -> consumer).
    pub buffer: usize,
    /// How long halted producers get to exit before they are aborted.
    pub grace: Duration,
    /// Reaction to the first producer fault.
    pub fault_policy: FaultPolicy,
}

impl Default for FanInConfig {
    fn default() -> Self {
        Self {
            buffer: 16,
            grace: Duration::from_secs(2),
            fault_policy: FaultPolicy::FailFast,
        }
    }
}

impl FanInConfig {
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.buffer == 0 {
            return Err(FanInError::invalid("buffer", 0, "must be at least 1"));
        }
        Ok(())
    }
}

/// Builder for fan-in runs.
///
/// Every run gets its own channels, tokens and counters, so any number of
/// runs can be in flight at once.
#[derive(Debug, Clone, Default)]
pub struct FanIn {
    config: FanInConfig,
    parent: Option<CancellationToken>,
}

impl FanIn {
    pub fn new(config: FanInConfig) -> Self {
        Self {
            config,
            parent: None,
        }
    }

    /// Ties runs to an external token; cancelling it cancels the run.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.parent = Some(token);
        self
    }

    pub fn config(&self) -> &FanInConfig {
        &self.config
    }

    /// Runs `producers` counting producers, each emitting `0..count`.
    ///
    /// Negative arguments are rejected before anything is spawned.
    pub fn run(&self, producers: i64, count: i64) -> Result<FanInStream<i64>> {
        let n = non_negative("producers", producers)?;
        if count < 0 {
            return Err(FanInError::invalid("count", count, "must be non-negative"));
        }

        self.spawn(n, move |_, emitter| count_up(emitter, count))
    }

    /// Like [`FanIn::run`], with a fault injected as described by `plan`.
    pub fn run_with_fault(
        &self,
        producers: i64,
        count: i64,
        plan: Option<FaultPlan>,
    ) -> Result<FanInStream<i64>> {
        let n = non_negative("producers", producers)?;
        if count < 0 {
            return Err(FanInError::invalid("count", count, "must be non-negative"));
        }

        self.spawn(n, move |_, emitter| count_up_with_fault(emitter, count, plan))
    }

    /// Spawns `producers` tasks running `producer` and merges their output.
    ///
    /// The producer receives its id and its own [`Emitter`]. It should return
    /// any error from [`Emitter::emit`] unchanged. A returned error or a panic
    /// is reported as a fault.
    pub fn spawn<T, F, Fut>(&self, producers: usize, producer: F) -> Result<FanInStream<T>>
    where
        T: Send + 'static,
        F: Fn(ProducerId, Emitter<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| FanInError::NoRuntime)?;

        let cancel = match &self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let halt = cancel.child_token();
        let closed = CancellationToken::new();

        let (output_tx, output_rx) = mpsc::channel(self.config.buffer);
        let (done_tx, done_rx) = mpsc::channel(producers.max(1));
        let total = Arc::new(AtomicU64::new(0));
        let producer = Arc::new(producer);
        let run_id = timestamp::now_utc();

        info!(
            run_id = %run_id,
            producers,
            buffer = self.config.buffer,
            fault_policy = %self.config.fault_policy,
            "Starting fan-in run"
        );

        let mut tasks = JoinSet::new();
        for index in 0..producers {
            let id = ProducerId::new(index);
            let emitted = Arc::new(AtomicU64::new(0));
            let emitter = Emitter::new(
                id,
                output_tx.clone(),
                halt.clone(),
                Arc::clone(&emitted),
                Arc::clone(&total),
            );
            let producer = Arc::clone(&producer);
            let done_tx = done_tx.clone();

            tasks.spawn_on(
                async move {
                    let work = async move { (*producer)(id, emitter).await };
                    let completion = supervise(id, emitted, work).await;
                    // Capacity covers one signal per producer, so this never waits.
                    let _ = done_tx.send(completion).await;
                },
                &runtime,
            );
        }
        drop(done_tx);

        let coordinator = Coordinator {
            producers: tasks,
            completions: done_rx,
            output: output_tx,
            halt: halt.clone(),
            closed: closed.clone(),
            grace: self.config.grace,
            policy: self.config.fault_policy,
            total,
            summary: RunSummary::new(run_id, producers),
        };
        let handle = runtime.spawn(coordinator.run());

        Ok(FanInStream::new(
            output_rx,
            cancel,
            halt,
            closed,
            handle,
            self.config.grace,
        ))
    }
}

/// Runs `producers` counting producers with the default configuration.
pub fn run(producers: i64, count: i64) -> Result<FanInStream<i64>> {
    FanIn::default().run(producers, count)
}

/// Drives one producer future and turns its outcome into a completion signal.
///
/// `work` must build the producer's future lazily, so a panic while calling
/// the producer closure is caught here too.
///
/// The future, and the emitter it owns, are dropped before this returns, so
/// the producer can no longer write once its completion is sent.
async fn supervise<Fut>(producer: ProducerId, emitted: Arc<AtomicU64>, work: Fut) -> Completion
where
    Fut: Future<Output = Result<()>>,
{
    let outcome = {
        let guarded = AssertUnwindSafe(work).catch_unwind();
        guarded.await
    };
    let emitted = emitted.load(Ordering::Relaxed);

    match outcome {
        Ok(Ok(())) => Completion::Finished { producer, emitted },
        Ok(Err(FanInError::Cancelled)) => Completion::Cancelled { producer, emitted },
        Ok(Err(FanInError::ProducerFault { reason, .. })) => {
            Completion::Faulted { producer, reason }
        }
        Ok(Err(e)) => Completion::Faulted {
            producer,
            reason: e.to_string(),
        },
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            debug!(%producer, %reason, "Producer panicked");
            Completion::Faulted {
                producer,
                reason: format!("panicked: {}", reason),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn non_negative(name: &'static str, value: i64) -> Result<usize> {
    if value < 0 {
        return Err(FanInError::invalid(name, value, "must be non-negative"));
    }
    usize::try_from(value).map_err(|_| FanInError::invalid(name, value, "too large"))
}
