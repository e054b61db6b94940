//! Bounded fan-in aggregator with coordinated shutdown.
//!
//! N producer tasks write into one bounded output channel. Each producer
//! sends a typed completion signal when it stops, and a single coordinator
//! task counts those signals and closes the output once all of them have
//! arrived. The consumer reads the output as a [`FanInStream`].

mod coordinator;
mod emitter;
mod fan_in;
mod stream;


pub use emitter::Emitter;
pub use fan_in::{run, FanIn, FanInConfig};
pub use stream::FanInStream;
