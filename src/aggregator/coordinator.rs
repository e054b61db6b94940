//! The single task that owns closing the output channel.

use super::emitter::OutputSender;
use crate::error::FanInError;
use crate::models::{Completion, FaultPolicy, ProducerId, RunSummary};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// State handed to the coordinator when a run starts.
pub(crate) struct Coordinator<T> {
    pub producers: JoinSet<()>,
    pub completions: mpsc::Receiver<Completion>,
    pub output: OutputSender<T>,
    pub halt: CancellationToken,
    /// Cancelled once the run is over and the consumer should see the end.
    pub closed: CancellationToken,
    pub grace: Duration,
    pub policy: FaultPolicy,
    pub total: Arc<AtomicU64>,
    pub summary: RunSummary,
}

/// Which producers have reported so far.
struct Outstanding {
    remaining: usize,
    reported: Vec<bool>,
    first_fault: Option<FanInError>,
}

impl Outstanding {
    fn new(producers: usize) -> Self {
        Self {
            remaining: producers,
            reported: vec![false; producers],
            first_fault: None,
        }
    }

    fn missing(&self) -> Vec<ProducerId> {
        self.reported
            .iter()
            .enumerate()
            .filter(|(_, reported)| !**reported)
            .map(|(index, _)| ProducerId::new(index))
            .collect()
    }
}

impl<T: Send + 'static> Coordinator<T> {
    /// Waits for every producer's completion signal, then closes the output.
    ///
    /// The output sender held here is the last one a finished producer can
    /// have left behind. Before dropping it the coordinator halts the run, so
    /// an emitter that escaped its producer can no longer write, and signals
    /// `closed` so the consumer ends even while such an emitter is alive.
    pub async fn run(mut self) -> RunSummary {
        let expected = self.summary.producers;
        let mut outstanding = Outstanding::new(expected);
        let mut deadline: Option<Instant> = None;
        let mut timed_out = false;

        debug!(producers = expected, "Coordinator waiting for completions");

        while outstanding.remaining > 0 {
            tokio::select! {
                biased;
                completion = self.completions.recv() => match completion {
                    Some(completion) => self.record(&mut outstanding, completion),
                    None => {
                        // Every signal sender is gone; nobody left can report.
                        for producer in outstanding.missing() {
                            self.record(&mut outstanding, Completion::Faulted {
                                producer,
                                reason: "exited without signalling completion".to_string(),
                            });
                        }
                    }
                },
                _ = self.halt.cancelled(), if deadline.is_none() => {
                    debug!(
                        remaining = outstanding.remaining,
                        grace_ms = self.grace.as_millis() as u64,
                        "Run halted, waiting for producers"
                    );
                    deadline = Some(Instant::now() + self.grace);
                }
                _ = sleep_until(deadline), if deadline.is_some() => {
                    warn!(remaining = outstanding.remaining, "Producers did not stop within grace period, aborting");
                    self.producers.abort_all();
                    timed_out = true;
                    break;
                }
            }
        }

        while let Some(joined) = self.producers.join_next().await {
            match joined {
                Ok(()) => {}
                Err(e) if e.is_panic() => {
                    error!(error = %e, "Producer task panicked outside supervision");
                    if outstanding.first_fault.is_none() {
                        outstanding.first_fault =
                            Some(FanInError::Coordinator(format!("producer task panicked: {}", e)));
                    }
                }
                Err(e) => debug!(error = %e, "Producer task aborted"),
            }
        }

        if timed_out {
            // Signals sent while the deadline fired still count.
            while let Ok(completion) = self.completions.try_recv() {
                self.record(&mut outstanding, completion);
            }
            self.summary.aborted = outstanding.remaining;
        }

        self.summary.values_emitted = self.total.load(Ordering::Relaxed);
        self.summary.finished_at = Utc::now();
        self.halt.cancel();

        if let Some(fault) = outstanding.first_fault.take() {
            // The consumer may already be gone; a failed send means nobody is listening.
            if self.output.send(Err(fault)).await.is_err() {
                debug!("Consumer gone before the fault could be delivered");
            }
        }

        info!(
            producers = expected,
            finished = self.summary.finished,
            cancelled = self.summary.cancelled,
            faulted = self.summary.faulted,
            aborted = self.summary.aborted,
            values = self.summary.values_emitted,
            "Fan-in run complete"
        );

        drop(self.output);
        self.closed.cancel();
        self.summary
    }

    fn record(&mut self, outstanding: &mut Outstanding, completion: Completion) {
        match outstanding.reported.get_mut(completion.producer().index()) {
            Some(reported) if !*reported => *reported = true,
            _ => {
                warn!(producer = %completion.producer(), "Ignoring unexpected completion signal");
                return;
            }
        }
        outstanding.remaining -= 1;
        self.summary.record(&completion);

        let remaining = outstanding.remaining;
        match completion {
            Completion::Faulted { producer, reason } => {
                warn!(%producer, %reason, "Producer faulted");
                if outstanding.first_fault.is_none() {
                    outstanding.first_fault = Some(FanInError::ProducerFault { producer, reason });
                    if self.policy == FaultPolicy::FailFast {
                        self.halt.cancel();
                    }
                }
            }
            Completion::Finished { producer, emitted } => {
                debug!(%producer, emitted, remaining, "Producer finished");
            }
            Completion::Cancelled { producer, emitted } => {
                debug!(%producer, emitted, remaining, "Producer cancelled");
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
