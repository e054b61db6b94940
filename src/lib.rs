//! fanin - bounded fan-in aggregator with coordinated shutdown.
//!
//! Spawns N producers that write into one bounded channel and hands the
//! merged output to a single consumer as a stream. One coordinator task
//! owns closing the channel, producer faults become a terminal error on the
//! stream, and every blocking send can be cancelled.
//!
//! ```no_run
//! # async fn demo() -> fanin::Result<()> {
//! let values = fanin::run(2, 10)?.drain().await?;
//! assert_eq!(values.len(), 20);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod config;
pub mod error;
pub mod models;
pub mod producers;
pub mod report;
pub mod timestamp;

pub use aggregator::{run, Emitter, FanIn, FanInConfig, FanInStream};
pub use error::{FanInError, Result};
pub use models::{Completion, FaultPolicy, ProducerId, RunSummary};
pub use tokio_util::sync::CancellationToken;
