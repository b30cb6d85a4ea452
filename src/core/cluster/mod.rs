//! Cluster monitoring for an HA node pair
//!
//! Collection, reconciliation against the persisted snapshot, alert
//! deduplication and the fence-delay protocol, driven once per pass by
//! [`AgentDriver`].

pub mod agent;
pub mod cib;
pub mod collector;
pub mod fence_delay;
pub mod hysteresis;
pub mod reconciler;

pub use agent::{AgentDriver, AgentPhase, DriverOptions, PassReport, PrivilegeCheck, ProcSelfPrivilege};
pub use collector::{PcsStateCollector, StateCollector};
pub use fence_delay::{CoordinationOutcome, FenceDecision, FenceDelayCoordinator, HoldReason};
pub use hysteresis::HysteresisGate;
pub use reconciler::{FieldChange, ReconcileOutcome, Reconciler};
