//! Volatile implementations of the collaborator interfaces for unit tests.
//!
//! Same semantics as the MongoDB backends, without durability. Write
//! counters and fault injection make the effects of a step observable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::domain::entities::{
    Alert, ClusterSnapshot, FenceDelayPreference, GateKey, PairId, StateChanges, WorkloadCensus,
};
use crate::domain::repositories::{AlertSink, ClusterStateRepository, WorkloadRegistry};
use crate::error::{AppError, Result};

#[derive(Default)]
pub struct InMemoryClusterStore {
    current: RwLock<HashMap<PairId, ClusterSnapshot>>,
    history: RwLock<Vec<(DateTime<Utc>, ClusterSnapshot)>>,
    preferences: RwLock<HashMap<PairId, FenceDelayPreference>>,
    gates: RwLock<HashMap<GateKey, bool>>,
    snapshot_writes: AtomicUsize,
    preference_writes: AtomicUsize,
    gate_writes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_gate_writes: AtomicBool,
    unreachable: AtomicBool,
}

impl InMemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a current snapshot (with one history row) without counting a write.
    pub async fn seed_snapshot(&self, snapshot: ClusterSnapshot) {
        self.history.write().await.push((Utc::now(), snapshot.clone()));
        self.current
            .write()
            .await
            .insert(snapshot.pair_id.clone(), snapshot);
    }

    /// Install a fence-delay preference without counting a write.
    pub async fn seed_preference(&self, preference: FenceDelayPreference) {
        self.preferences
            .write()
            .await
            .insert(preference.pair_id.clone(), preference);
    }

    /// Make every subsequent write fail with a persistence failure.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent commit that touches a gate fail as a whole.
    pub fn set_fail_gate_writes(&self, fail: bool) {
        self.fail_gate_writes.store(fail, Ordering::SeqCst);
    }

    /// Make connectivity checks fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn snapshot_writes(&self) -> usize {
        self.snapshot_writes.load(Ordering::SeqCst)
    }

    pub fn preference_writes(&self) -> usize {
        self.preference_writes.load(Ordering::SeqCst)
    }

    pub fn gate_writes(&self) -> usize {
        self.gate_writes.load(Ordering::SeqCst)
    }

    fn check_writable(&self, changes: &StateChanges) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::PersistenceFailure(
                "in-memory store is rejecting writes".to_string(),
            ));
        }
        if !changes.gates.is_empty() && self.fail_gate_writes.load(Ordering::SeqCst) {
            return Err(AppError::PersistenceFailure(
                "in-memory store is rejecting gate writes".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterStateRepository for InMemoryClusterStore {
    async fn ping(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::PersistenceFailure(
                "in-memory store is unreachable".to_string(),
            ));
        }
        Ok(())
    }

    async fn load_current(&self, pair_id: &str) -> Result<Option<ClusterSnapshot>> {
        Ok(self.current.read().await.get(pair_id).cloned())
    }

    async fn history_count(&self, pair_id: &str) -> Result<u64> {
        Ok(self
            .history
            .read()
            .await
            .iter()
            .filter(|(_, s)| s.pair_id == pair_id)
            .count() as u64)
    }

    async fn load_fence_preference(&self, pair_id: &str) -> Result<Option<FenceDelayPreference>> {
        Ok(self.preferences.read().await.get(pair_id).cloned())
    }

    async fn load_gate(&self, key: &GateKey) -> Result<bool> {
        Ok(self.gates.read().await.get(key).copied().unwrap_or(false))
    }

    async fn commit(&self, changes: &StateChanges) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        self.check_writable(changes)?;

        let mut current = self.current.write().await;
        let mut history = self.history.write().await;
        let mut preferences = self.preferences.write().await;
        let mut gates = self.gates.write().await;

        if let Some(snapshot) = &changes.snapshot {
            current.insert(snapshot.pair_id.clone(), snapshot.clone());
            history.push((Utc::now(), snapshot.clone()));
            self.snapshot_writes.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(preference) = &changes.preference {
            preferences.insert(preference.pair_id.clone(), preference.clone());
            self.preference_writes.fetch_add(1, Ordering::SeqCst);
        }
        for (key, active) in &changes.gates {
            if *active {
                gates.insert(key.clone(), true);
            } else {
                gates.remove(key);
            }
            self.gate_writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Workload registry answering with a fixed census, or failing
#[derive(Default)]
pub struct StaticWorkloadRegistry {
    census: Option<WorkloadCensus>,
}

impl StaticWorkloadRegistry {
    pub fn new(census: WorkloadCensus) -> Self {
        Self {
            census: Some(census),
        }
    }

    /// A registry whose census is unavailable.
    pub fn unavailable() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkloadRegistry for StaticWorkloadRegistry {
    async fn census(&self, pair_id: &PairId) -> Result<WorkloadCensus> {
        self.census.clone().ok_or_else(|| {
            AppError::CensusUnavailable(format!("no census recorded for pair {}", pair_id))
        })
    }
}

/// Alert sink that keeps every alert it is handed
#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: RwLock<Vec<Alert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }

    pub async fn message_keys(&self) -> Vec<String> {
        self.alerts
            .read()
            .await
            .iter()
            .map(|a| a.message_key.clone())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.alerts.read().await.len()
    }

    pub async fn clear(&self) {
        self.alerts.write().await.clear();
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn notify(&self, alert: Alert) {
        self.alerts.write().await.push(alert);
    }
}
