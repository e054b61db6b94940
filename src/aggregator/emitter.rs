//! Write handle given to each producer.

use crate::error::FanInError;
use crate::models::ProducerId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) type OutputSender<T> = mpsc::Sender<Result<T, FanInError>>;

/// A producer's handle onto the shared output channel.
///
/// Emitters are not `Clone`: each producer owns exactly one, and it is
/// dropped when the producer's future completes. The coordinator relies on
/// this to know that no producer can still write once it has seen the
/// producer's completion signal. An emitter moved out of its producer stops
/// accepting values once the run is over.
pub struct Emitter<T> {
    producer: ProducerId,
    tx: OutputSender<T>,
    halt: CancellationToken,
    emitted: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
}

impl<T> Emitter<T> {
    pub(crate) fn new(
        producer: ProducerId,
        tx: OutputSender<T>,
        halt: CancellationToken,
        emitted: Arc<AtomicU64>,
        total: Arc<AtomicU64>,
    ) -> Self {
        Self {
            producer,
            tx,
            halt,
            emitted,
            total,
        }
    }

    /// Sends one value to the consumer.
    ///
    /// Waits while the output channel is full. Returns
    /// [`FanInError::Cancelled`] if the run is halted while waiting or the
    /// consumer has gone away; producers should return that error as-is.
    pub async fn emit(&mut self, value: T) -> Result<(), FanInError> {
        tokio::select! {
            biased;
            _ = self.halt.cancelled() => Err(FanInError::Cancelled),
            sent = self.tx.send(Ok(value)) => {
                sent.map_err(|_| FanInError::Cancelled)?;
                self.emitted.fetch_add(1, Ordering::Relaxed);
                self.total.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    pub fn producer(&self) -> ProducerId {
        self.producer
    }

    /// Values this producer has emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// True once the run has been halted.
    pub fn is_halted(&self) -> bool {
        self.halt.is_cancelled()
    }

    /// Builds a fault error attributed to this producer.
    pub fn fault(&self, reason: impl Into<String>) -> FanInError {
        FanInError::ProducerFault {
            producer: self.producer,
            reason: reason.into(),
        }
    }
}
