//! Anvil cluster agent
//!
//! Periodic monitor for a two-node Pacemaker pair. Each pass collects the
//! cluster state, reconciles it against the last persisted snapshot, raises
//! deduplicated alerts and keeps the fence-delay preference pointed at the
//! node that is carrying the load.

pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod infrastructure;

// Re-export commonly used types
pub use error::{AppError, Result};
