//! Cluster repository interfaces
//!
//! This module defines the collaborator interfaces the cluster agent depends
//! on: the persistence store for snapshots, fence-delay preferences and alert
//! gates, the workload registry and the alert sink.

use async_trait::async_trait;

use crate::domain::entities::{
    Alert, ClusterSnapshot, FenceDelayPreference, GateKey, PairId, StateChanges, WorkloadCensus,
};
use crate::error::Result;

/// Persistence store with current-row plus append-only history semantics.
///
/// Reads are plain lookups; every write goes through `commit`, which applies a
/// whole `StateChanges` atomically. Durability across process restarts is
/// required, gate state in particular, since deduplication must hold across
/// independent agent invocations.
#[async_trait]
pub trait ClusterStateRepository: Send + Sync {
    /// Check connectivity to the store
    async fn ping(&self) -> Result<()>;

    /// Load the current snapshot of a pair
    async fn load_current(&self, pair_id: &str) -> Result<Option<ClusterSnapshot>>;

    /// Number of history rows recorded for a pair
    async fn history_count(&self, pair_id: &str) -> Result<u64>;

    /// Load the fence-delay preference of a pair
    async fn load_fence_preference(&self, pair_id: &str) -> Result<Option<FenceDelayPreference>>;

    /// Whether the gate is active; an absent record is inactive
    async fn load_gate(&self, key: &GateKey) -> Result<bool>;

    /// Apply every change or none: replace the current snapshot and append it
    /// to the history, replace the fence-delay preference, raise or clear
    /// gates. A cleared gate leaves no record behind.
    async fn commit(&self, changes: &StateChanges) -> Result<()>;
}

/// Read-only view of the workloads running on a pair
#[async_trait]
pub trait WorkloadRegistry: Send + Sync {
    async fn census(&self, pair_id: &PairId) -> Result<WorkloadCensus>;
}

/// Fire-and-forget alert delivery. Implementations swallow and log their own
/// delivery failures.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, alert: Alert);
}
