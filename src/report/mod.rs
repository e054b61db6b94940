//! Rendering of run results.

pub mod generator;

pub use generator::*;
