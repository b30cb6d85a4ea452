//! In-memory collaborators for pass-level tests

use anvil_cluster_agent::{
    domain::{
        entities::{
            Alert, ClusterSnapshot, FenceDelayPreference, GateKey, PairId, StateChanges,
            WorkloadCensus,
        },
        repositories::{AlertSink, ClusterStateRepository, WorkloadRegistry},
    },
    error::{AppError, Result},
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    current: HashMap<PairId, ClusterSnapshot>,
    history: Vec<ClusterSnapshot>,
    preferences: HashMap<PairId, FenceDelayPreference>,
    gates: HashSet<GateKey>,
}

/// Store with write counters and switchable write failures
#[derive(Default)]
pub struct InMemoryClusterStore {
    state: RwLock<State>,
    snapshot_writes: AtomicUsize,
    preference_writes: AtomicUsize,
    gate_writes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_gate_writes: AtomicBool,
}

impl InMemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a current snapshot and its history row without counting a write.
    pub async fn seed_snapshot(&self, snapshot: ClusterSnapshot) {
        let mut state = self.state.write().await;
        state.history.push(snapshot.clone());
        state.current.insert(snapshot.pair_id.clone(), snapshot);
    }

    pub async fn seed_preference(&self, preference: FenceDelayPreference) {
        self.state
            .write()
            .await
            .preferences
            .insert(preference.pair_id.clone(), preference);
    }

    pub async fn gate_active(&self, key: &GateKey) -> bool {
        self.state.read().await.gates.contains(key)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Reject, as a whole, any commit that raises or clears a gate.
    pub fn set_fail_gate_writes(&self, fail: bool) {
        self.fail_gate_writes.store(fail, Ordering::SeqCst);
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
}

#[async_trait]
impl ClusterStateRepository for InMemoryClusterStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn load_current(&self, pair_id: &str) -> Result<Option<ClusterSnapshot>> {
        Ok(self.state.read().await.current.get(pair_id).cloned())
    }

    async fn history_count(&self, pair_id: &str) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state.history.iter().filter(|s| s.pair_id == pair_id).count() as u64)
    }

    async fn load_fence_preference(&self, pair_id: &str) -> Result<Option<FenceDelayPreference>> {
        Ok(self.state.read().await.preferences.get(pair_id).cloned())
    }

    async fn load_gate(&self, key: &GateKey) -> Result<bool> {
        Ok(self.gate_active(key).await)
    }

    async fn commit(&self, changes: &StateChanges) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let gate_failure = !changes.gates.is_empty() && self.fail_gate_writes.load(Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) || gate_failure {
            return Err(AppError::PersistenceFailure("store rejected the commit".to_string()));
        }

        let mut state = self.state.write().await;
        if let Some(snapshot) = &changes.snapshot {
            state.current.insert(snapshot.pair_id.clone(), snapshot.clone());
            state.history.push(snapshot.clone());
            self.snapshot_writes.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(preference) = &changes.preference {
            state
                .preferences
                .insert(preference.pair_id.clone(), preference.clone());
            self.preference_writes.fetch_add(1, Ordering::SeqCst);
        }
        for (key, active) in &changes.gates {
            if *active {
                state.gates.insert(key.clone());
            } else {
                state.gates.remove(key);
            }
            self.gate_writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Registry with a replaceable census; `None` means unavailable
pub struct StaticWorkloadRegistry {
    census: RwLock<Option<WorkloadCensus>>,
}

impl StaticWorkloadRegistry {
    pub fn new(census: WorkloadCensus) -> Self {
        Self {
            census: RwLock::new(Some(census)),
        }
    }

    pub async fn set_census(&self, census: Option<WorkloadCensus>) {
        *self.census.write().await = census;
    }
}

#[async_trait]
impl WorkloadRegistry for StaticWorkloadRegistry {
    async fn census(&self, pair_id: &PairId) -> Result<WorkloadCensus> {
        self.census
            .read()
            .await
            .clone()
            .ok_or_else(|| AppError::CensusUnavailable(format!("no census for pair {}", pair_id)))
    }
}

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
