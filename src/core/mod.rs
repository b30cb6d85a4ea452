//! Core agent logic
//!
//! `cluster` holds the pass itself; `logging` sets up tracing for the binary.

pub mod cluster;
pub mod logging;

pub use cluster::{AgentDriver, AgentPhase, PassReport};
