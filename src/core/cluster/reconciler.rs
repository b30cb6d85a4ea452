//! Reconciliation of observed cluster state against the persisted snapshot
//!
//! One call per pass. The observed snapshot (or the collection failure) is
//! compared with the current row for the pair; differences and gate edges are
//! persisted in a single commit and announced through the alert sink.
//! Notifications go out only after the writes they describe succeeded.

use similar::TextDiff;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::hysteresis::HysteresisGate;
use crate::domain::entities::{
    alert_keys, AgentIdentity, Alert, AlertLevel, ClusterSnapshot, GateKey, NodeState,
    StateChanges,
};
use crate::domain::repositories::{AlertSink, ClusterStateRepository};
use crate::error::{CollectionFailure, Result};

/// Gate raised once per pair on first discovery
pub const GATE_CLUSTER_NEW: &str = "cluster-new";
/// Gate held while the local host has lost cluster membership
pub const GATE_MEMBERSHIP_LOST: &str = "membership-lost";
/// Gate held while fencing is disabled on the pair
pub const GATE_STONITH_DISABLED: &str = "stonith-disabled";

/// One detected difference between the persisted and observed snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange {
    Cluster {
        field: &'static str,
        old: String,
        new: String,
    },
    NodeAdded(NodeState),
    NodeRemoved(NodeState),
    Node {
        host_id: String,
        node_name: String,
        field: &'static str,
        old: String,
        new: String,
        /// New value of a boolean field
        flag: Option<bool>,
    },
    /// Only the opaque configuration changed
    Config { diff: String },
}

fn cluster_change<T: ToString + PartialEq>(
    changes: &mut Vec<FieldChange>,
    field: &'static str,
    old: &T,
    new: &T,
) {
    if old != new {
        changes.push(FieldChange::Cluster {
            field,
            old: old.to_string(),
            new: new.to_string(),
        });
    }
}

fn node_changes(old: &NodeState, new: &NodeState, changes: &mut Vec<FieldChange>) {
    let mut push = |field: &'static str, old_value: String, new_value: String, flag: Option<bool>| {
        if old_value != new_value {
            changes.push(FieldChange::Node {
                host_id: new.host_id.clone(),
                node_name: new.node_name.clone(),
                field,
                old: old_value,
                new: new_value,
                flag,
            });
        }
    };

    push("node_name", old.node_name.clone(), new.node_name.clone(), None);
    push(
        "scheduler_internal_id",
        old.scheduler_internal_id.clone(),
        new.scheduler_internal_id.clone(),
        None,
    );
    let flags = [
        ("in_membership", old.in_membership, new.in_membership),
        ("is_daemon_member", old.is_daemon_member, new.is_daemon_member),
        ("is_cluster_joined", old.is_cluster_joined, new.is_cluster_joined),
        ("maintenance_mode", old.maintenance_mode, new.maintenance_mode),
    ];
    for (field, old_flag, new_flag) in flags {
        push(field, old_flag.to_string(), new_flag.to_string(), Some(new_flag));
    }
}

/// Unified diff of two configuration blobs.
pub fn config_diff(old: &str, new: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header("previous", "current")
        .to_string()
}

/// Compare two snapshots of the same pair.
///
/// Each differing structured field yields one change. A configuration blob
/// change is reported on its own only when no structured field differs.
/// Output order is deterministic: cluster fields, then nodes by `host_id`.
pub fn diff_snapshots(old: &ClusterSnapshot, new: &ClusterSnapshot) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    cluster_change(&mut changes, "cluster_name", &old.cluster_name, &new.cluster_name);
    cluster_change(&mut changes, "stonith_enabled", &old.stonith_enabled, &new.stonith_enabled);
    cluster_change(
        &mut changes,
        "stonith_max_attempts",
        &old.stonith_max_attempts,
        &new.stonith_max_attempts,
    );

    for host_id in new.sorted_host_ids() {
        let observed = &new.nodes[host_id];
        match old.node(host_id) {
            None => changes.push(FieldChange::NodeAdded(observed.clone())),
            Some(persisted) => node_changes(persisted, observed, &mut changes),
        }
    }
    for host_id in old.sorted_host_ids() {
        if new.node(host_id).is_none() {
            changes.push(FieldChange::NodeRemoved(old.nodes[host_id].clone()));
        }
    }

    if changes.is_empty() && old.raw_config_blob != new.raw_config_blob {
        changes.push(FieldChange::Config {
            diff: config_diff(&old.raw_config_blob, &new.raw_config_blob),
        });
    }

    changes
}

/// Result of one reconciliation
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// First observation of the pair; snapshot inserted
    Bootstrapped(ClusterSnapshot),
    /// Nothing differed; nothing written
    Unchanged(ClusterSnapshot),
    /// Differences were persisted
    Updated {
        snapshot: ClusterSnapshot,
        changes: usize,
    },
    /// Collection failed; the local host is not a cluster member this pass
    NotClusterMember { failure: CollectionFailure },
}

impl ReconcileOutcome {
    /// Freshly reconciled snapshot, when collection succeeded.
    pub fn snapshot(&self) -> Option<&ClusterSnapshot> {
        match self {
            ReconcileOutcome::Bootstrapped(snapshot)
            | ReconcileOutcome::Unchanged(snapshot)
            | ReconcileOutcome::Updated { snapshot, .. } => Some(snapshot),
            ReconcileOutcome::NotClusterMember { .. } => None,
        }
    }

    pub fn wrote_snapshot(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Bootstrapped(_) | ReconcileOutcome::Updated { .. }
        )
    }
}

/// Writes and notifications planned by one reconciliation
#[derive(Default)]
struct Plan {
    changes: StateChanges,
    alerts: Vec<Alert>,
}

impl Plan {
    fn gate(&mut self, change: Option<(GateKey, bool)>, alert: impl FnOnce() -> Alert) {
        if let Some(change) = change {
            self.changes.gates.push(change);
            self.alerts.push(alert());
        }
    }
}

pub struct Reconciler {
    store: Arc<dyn ClusterStateRepository>,
    gate: HysteresisGate,
    alerts: Arc<dyn AlertSink>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ClusterStateRepository>, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            gate: HysteresisGate::new(store.clone()),
            store,
            alerts,
        }
    }

    /// Reconcile one observation against the current row of the pair.
    /// Returns the number of alerts sent along with the outcome.
    pub async fn reconcile(
        &self,
        identity: &AgentIdentity,
        observed: std::result::Result<ClusterSnapshot, CollectionFailure>,
    ) -> Result<(ReconcileOutcome, usize)> {
        let persisted = self.store.load_current(&identity.pair_id).await?;
        self.reconcile_with(identity, persisted, observed).await
    }

    /// Reconcile against a current row the caller already loaded. Every write
    /// of the pass (snapshot, history row, gates) is committed at once, and
    /// alerts go out only after that commit succeeded.
    pub async fn reconcile_with(
        &self,
        identity: &AgentIdentity,
        persisted: Option<ClusterSnapshot>,
        observed: std::result::Result<ClusterSnapshot, CollectionFailure>,
    ) -> Result<(ReconcileOutcome, usize)> {
        let (outcome, plan) = match observed {
            Err(failure) => self.membership_lost(identity, persisted.as_ref(), failure).await?,
            Ok(observed) => {
                let (outcome, mut plan) = match persisted {
                    None => self.bootstrap(identity, observed).await?,
                    Some(persisted) => Self::apply_diff(identity, &persisted, observed),
                };
                if let Some(snapshot) = outcome.snapshot() {
                    self.membership_regained(identity, snapshot, &mut plan).await?;
                    self.watch_stonith(identity, snapshot, &mut plan).await?;
                }
                (outcome, plan)
            }
        };

        self.store.commit(&plan.changes).await?;
        if let Some(snapshot) = &plan.changes.snapshot {
            info!(
                pair_id = %snapshot.pair_id,
                nodes = snapshot.node_count(),
                gates = plan.changes.gates.len(),
                "Persisted cluster state"
            );
        }

        let sent = plan.alerts.len();
        for alert in plan.alerts {
            self.alerts.notify(alert).await;
        }
        Ok((outcome, sent))
    }

    fn gate_key(identity: &AgentIdentity, locator: &str, name: &str) -> GateKey {
        GateKey::new(identity.agent_name.clone(), locator, name)
    }

    fn alert(identity: &AgentIdentity, level: AlertLevel, key: &str, locator: &str) -> Alert {
        Alert::new(level, key, identity.agent_name.clone(), locator)
    }

    async fn bootstrap(
        &self,
        identity: &AgentIdentity,
        observed: ClusterSnapshot,
    ) -> Result<(ReconcileOutcome, Plan)> {
        info!(
            pair_id = %observed.pair_id,
            cluster_name = %observed.cluster_name,
            nodes = observed.node_count(),
            "Discovered new cluster"
        );

        let mut plan = Plan::default();
        plan.changes.snapshot = Some(observed.clone());
        let key = Self::gate_key(identity, &observed.pair_id, GATE_CLUSTER_NEW);
        plan.gate(self.gate.transition(&key, true).await?, || {
            Self::alert(identity, AlertLevel::Notice, alert_keys::CLUSTER_NEW, &observed.pair_id)
                .with_var("cluster_name", &observed.cluster_name)
                .with_var("node_count", observed.node_count())
        });
        Ok((ReconcileOutcome::Bootstrapped(observed), plan))
    }

    fn apply_diff(
        identity: &AgentIdentity,
        persisted: &ClusterSnapshot,
        observed: ClusterSnapshot,
    ) -> (ReconcileOutcome, Plan) {
        let changes = diff_snapshots(persisted, &observed);
        if changes.is_empty() {
            debug!(pair_id = %observed.pair_id, "Cluster state unchanged");
            return (ReconcileOutcome::Unchanged(observed), Plan::default());
        }
        debug!(pair_id = %observed.pair_id, changes = changes.len(), "Cluster state changed");

        let plan = Plan {
            changes: StateChanges {
                snapshot: Some(observed.clone()),
                ..Default::default()
            },
            alerts: changes
                .iter()
                .map(|change| Self::change_alert(identity, &observed.pair_id, change))
                .collect(),
        };
        (
            ReconcileOutcome::Updated {
                snapshot: observed,
                changes: changes.len(),
            },
            plan,
        )
    }

    fn change_alert(identity: &AgentIdentity, pair_id: &str, change: &FieldChange) -> Alert {
        match change {
            FieldChange::Cluster { field, old, new } => {
                let level = if *field == "stonith_enabled" {
                    AlertLevel::Warning
                } else {
                    AlertLevel::Notice
                };
                Self::alert(identity, level, alert_keys::CLUSTER_FIELD_CHANGED, pair_id)
                    .with_var("field", field)
                    .with_var("old", old)
                    .with_var("new", new)
            }
            FieldChange::Config { diff } => {
                Self::alert(identity, AlertLevel::Notice, alert_keys::CLUSTER_CONFIG_CHANGED, pair_id)
                    .with_var("diff", diff)
            }
            FieldChange::NodeAdded(node) => {
                Self::alert(identity, AlertLevel::Notice, alert_keys::NODE_ADDED, &node.host_id)
                    .with_var("host_id", &node.host_id)
                    .with_var("node_name", &node.node_name)
                    .with_var("scheduler_internal_id", &node.scheduler_internal_id)
                    .with_var("in_membership", node.in_membership)
                    .with_var("is_daemon_member", node.is_daemon_member)
                    .with_var("is_cluster_joined", node.is_cluster_joined)
                    .with_var("maintenance_mode", node.maintenance_mode)
            }
            FieldChange::NodeRemoved(node) => {
                Self::alert(identity, AlertLevel::Warning, alert_keys::NODE_REMOVED, &node.host_id)
                    .with_var("host_id", &node.host_id)
                    .with_var("node_name", &node.node_name)
            }
            FieldChange::Node {
                host_id,
                node_name,
                field,
                old,
                new,
                flag,
            } => {
                // losing membership, the daemon or the join is a warning
                let level = match flag {
                    Some(false) if *field != "maintenance_mode" => AlertLevel::Warning,
                    _ => AlertLevel::Notice,
                };
                Self::alert(identity, level, alert_keys::NODE_FIELD_CHANGED, host_id)
                    .with_var("host_id", host_id)
                    .with_var("node_name", node_name)
                    .with_var("field", field)
                    .with_var("old", old)
                    .with_var("new", new)
            }
        }
    }

    /// Collection failed. The local row is flipped to not-a-member unless a
    /// previous pass already recorded that, and the membership-lost gate is
    /// raised whenever it is not yet, so an earlier failed pass is finished.
    async fn membership_lost(
        &self,
        identity: &AgentIdentity,
        persisted: Option<&ClusterSnapshot>,
        failure: CollectionFailure,
    ) -> Result<(ReconcileOutcome, Plan)> {
        warn!(
            pair_id = %identity.pair_id,
            host_id = %identity.host_id,
            error = %failure,
            "Local host is not a cluster member"
        );

        let mut plan = Plan::default();
        let Some(snapshot) = persisted else {
            return Ok((ReconcileOutcome::NotClusterMember { failure }, plan));
        };
        let Some(local) = snapshot.node(&identity.host_id) else {
            return Ok((ReconcileOutcome::NotClusterMember { failure }, plan));
        };
        let node_name = local.node_name.clone();

        if local.is_member() {
            let mut flipped = snapshot.clone();
            if let Some(local) = flipped.node_mut(&identity.host_id) {
                local.is_daemon_member = false;
                local.is_cluster_joined = false;
            }
            plan.changes.snapshot = Some(flipped);
        } else {
            debug!(host_id = %identity.host_id, "Membership loss already recorded");
        }

        let key = Self::gate_key(identity, &identity.host_id, GATE_MEMBERSHIP_LOST);
        plan.gate(self.gate.transition(&key, true).await?, || {
            Self::alert(identity, AlertLevel::Warning, alert_keys::MEMBERSHIP_LOST, &identity.host_id)
                .with_var("node_name", node_name)
                .with_var("reason", failure.to_string())
        });
        Ok((ReconcileOutcome::NotClusterMember { failure }, plan))
    }

    async fn membership_regained(
        &self,
        identity: &AgentIdentity,
        snapshot: &ClusterSnapshot,
        plan: &mut Plan,
    ) -> Result<()> {
        let key = Self::gate_key(identity, &identity.host_id, GATE_MEMBERSHIP_LOST);
        let change = self.gate.transition(&key, false).await?;
        if change.is_some() {
            info!(host_id = %identity.host_id, "Cluster membership regained");
        }
        plan.gate(change, || {
            let node_name = snapshot
                .node(&identity.host_id)
                .map(|n| n.node_name.as_str())
                .unwrap_or_else(|| identity.node_name_of(&identity.host_id));
            Self::alert(identity, AlertLevel::Notice, alert_keys::MEMBERSHIP_REGAINED, &identity.host_id)
                .with_var("node_name", node_name)
        });
        Ok(())
    }

    async fn watch_stonith(
        &self,
        identity: &AgentIdentity,
        snapshot: &ClusterSnapshot,
        plan: &mut Plan,
    ) -> Result<()> {
        let key = Self::gate_key(identity, &snapshot.pair_id, GATE_STONITH_DISABLED);
        let change = self.gate.transition(&key, !snapshot.stonith_enabled).await?;
        plan.gate(change, || {
            let (level, message_key) = if snapshot.stonith_enabled {
                (AlertLevel::Notice, alert_keys::STONITH_ENABLED)
            } else {
                (AlertLevel::Critical, alert_keys::STONITH_DISABLED)
            };
            Self::alert(identity, level, message_key, &snapshot.pair_id)
                .with_var("cluster_name", &snapshot.cluster_name)
        });
        Ok(())
    }
}
