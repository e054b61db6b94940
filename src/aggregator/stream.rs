//! Consumer side of a fan-in run.

use crate::error::{FanInError, Result};
use crate::models::RunSummary;
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const SHUTDOWN_SLACK: Duration = Duration::from_secs(1);

/// The merged output of every producer in a run.
///
/// Yields `Ok(value)` for each emitted value. A run that ends because a
/// producer faulted, or because the caller cancelled it, ends with exactly
/// one `Err` item; after that (or after the output closes) the stream
/// returns `None`. The stream also ends once the coordinator has closed the
/// run, even if an emitter is still alive somewhere.
///
/// Dropping the stream before it ends halts the producers.
pub struct FanInStream<T> {
    rx: Option<mpsc::Receiver<std::result::Result<T, FanInError>>>,
    cancel: CancellationToken,
    halt: CancellationToken,
    cancelled: BoxFuture<'static, ()>,
    closed: BoxFuture<'static, ()>,
    coordinator: Option<JoinHandle<RunSummary>>,
    grace: Duration,
    done: bool,
}

impl<T> FanInStream<T> {
    pub(crate) fn new(
        rx: mpsc::Receiver<std::result::Result<T, FanInError>>,
        cancel: CancellationToken,
        halt: CancellationToken,
        closed: CancellationToken,
        coordinator: JoinHandle<RunSummary>,
        grace: Duration,
    ) -> Self {
        let cancelled = cancel.clone().cancelled_owned().boxed();
        Self {
            rx: Some(rx),
            cancel,
            halt,
            cancelled,
            closed: closed.cancelled_owned().boxed(),
            coordinator: Some(coordinator),
            grace,
            done: false,
        }
    }

    /// Cancels the run. The stream ends with [`FanInError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this run when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Halts the producers, stops consuming, and waits for every task to exit.
    ///
    /// Producers get the configured grace period before the coordinator
    /// aborts them; the coordinator itself gets a further second to wind down.
    pub async fn shutdown(mut self) -> Result<RunSummary> {
        self.halt.cancel();
        self.rx = None;

        let Some(handle) = self.coordinator.take() else {
            return Err(FanInError::Coordinator("already shut down".to_string()));
        };
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.grace + SHUTDOWN_SLACK, handle).await {
            Ok(Ok(summary)) => Ok(summary),
            Ok(Err(e)) => Err(FanInError::Coordinator(e.to_string())),
            Err(_) => {
                warn!("Coordinator did not stop in time, aborting");
                abort.abort();
                Err(FanInError::Coordinator(
                    "timed out waiting for coordinator".to_string(),
                ))
            }
        }
    }

    /// Reads the run to the end.
    ///
    /// Returns every value, or the terminal error if the run faulted or was
    /// cancelled.
    pub async fn drain(mut self) -> Result<Vec<T>> {
        let mut values = Vec::new();
        while let Some(item) = self.next().await {
            values.push(item?);
        }
        Ok(values)
    }
}

impl<T> Unpin for FanInStream<T> {}

impl<T> Stream for FanInStream<T> {
    type Item = std::result::Result<T, FanInError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        if this.cancelled.poll_unpin(cx).is_ready() {
            debug!("Consumer observed cancellation");
            this.done = true;
            this.rx = None;
            return Poll::Ready(Some(Err(FanInError::Cancelled)));
        }

        let Some(rx) = this.rx.as_mut() else {
            this.done = true;
            return Poll::Ready(None);
        };

        match rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(value))) => Poll::Ready(Some(Ok(value))),
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => {
                if this.closed.poll_unpin(cx).is_pending() {
                    return Poll::Pending;
                }
                // The coordinator is done; only what it already queued remains.
                match rx.try_recv() {
                    Ok(item) => {
                        this.done = item.is_err();
                        Poll::Ready(Some(item))
                    }
                    Err(_) => {
                        debug!("Run closed by the coordinator");
                        this.done = true;
                        this.rx = None;
                        Poll::Ready(None)
                    }
                }
            }
        }
    }
}

impl<T> Drop for FanInStream<T> {
    fn drop(&mut self) {
        // Abandoning the stream halts producers still blocked on a send.
        self.halt.cancel();
    }
}
