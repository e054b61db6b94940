//! Error types for the fan-in aggregator.

use crate::models::ProducerId;
use thiserror::Error;

/// Errors surfaced by the aggregator, its producers and its output stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FanInError {
    /// An argument was rejected before any task was spawned.
    #[error("invalid argument `{name}`: {value} ({reason})")]
    InvalidArgument {
        name: &'static str,
        value: i64,
        reason: &'static str,
    },

    /// A producer returned an error or panicked.
    #[error("{producer} faulted: {reason}")]
    ProducerFault { producer: ProducerId, reason: String },

    /// The run was cancelled by the caller or abandoned by the consumer.
    #[error("run cancelled")]
    Cancelled,

    /// No Tokio runtime is available to spawn tasks on.
    #[error("no tokio runtime available; call from within a runtime context")]
    NoRuntime,

    /// The coordinator task failed or did not stop in time.
    #[error("coordinator error: {0}")]
    Coordinator(String),
}

impl FanInError {
    pub(crate) fn invalid(name: &'static str, value: i64, reason: &'static str) -> Self {
        Self::InvalidArgument {
            name,
            value,
            reason,
        }
    }

    /// Returns true for the error a halted producer sees from `emit`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if the error came from a producer fault.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::ProducerFault { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, FanInError>;
