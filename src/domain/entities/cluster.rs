//! Cluster domain entities and types
//!
//! This module defines the typed records the agent observes, persists and
//! coordinates on for one HA pair ("Anvil"): the cluster snapshot, per-node
//! membership state, the fence-delay preference and the workload census.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable identifier of a host, independent of its cluster node name
pub type HostId = String;

/// Identifier of an HA pair
pub type PairId = String;

/// Membership and maintenance state of one cluster member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    /// Stable host identity, the key of the node set
    pub host_id: HostId,
    /// Cluster node name (`uname`); may change independently of `host_id`
    pub node_name: String,
    /// The scheduler's internal node id
    pub scheduler_internal_id: String,
    /// Node is part of the corosync membership
    pub in_membership: bool,
    /// Node's controller daemon is online
    pub is_daemon_member: bool,
    /// Node has fully joined the cluster
    pub is_cluster_joined: bool,
    /// Node is in maintenance mode
    pub maintenance_mode: bool,
}

impl NodeState {
    /// Whether this node is recorded as a cluster member.
    pub fn is_member(&self) -> bool {
        self.is_daemon_member || self.is_cluster_joined
    }
}

/// Point-in-time view of one pair's cluster, as reported by the resource manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Pair this cluster belongs to
    pub pair_id: PairId,
    /// Cluster name
    pub cluster_name: String,
    /// Whether fencing is enabled
    pub stonith_enabled: bool,
    /// How many times fencing is retried before giving up
    pub stonith_max_attempts: u32,
    /// Verbatim resource-manager configuration, kept for diffing and audit
    pub raw_config_blob: String,
    /// Members keyed by `host_id`
    pub nodes: HashMap<HostId, NodeState>,
}

impl ClusterSnapshot {
    pub fn node(&self, host_id: &str) -> Option<&NodeState> {
        self.nodes.get(host_id)
    }

    pub fn node_mut(&mut self, host_id: &str) -> Option<&mut NodeState> {
        self.nodes.get_mut(host_id)
    }

    /// Replace the node set, keying each node by its `host_id`.
    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = NodeState>) -> Self {
        self.nodes = nodes
            .into_iter()
            .map(|node| (node.host_id.clone(), node))
            .collect();
        self
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Host ids in a stable order, for deterministic alert ordering.
    pub fn sorted_host_ids(&self) -> Vec<&HostId> {
        let mut ids: Vec<&HostId> = self.nodes.keys().collect();
        ids.sort();
        ids
    }
}

/// Which node of a pair is preferred when fence requests race
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FenceDelayPreference {
    pub pair_id: PairId,
    pub preferred_node_id: HostId,
    pub updated_at: DateTime<Utc>,
}

impl FenceDelayPreference {
    pub fn new(pair_id: impl Into<PairId>, preferred_node_id: impl Into<HostId>) -> Self {
        Self {
            pair_id: pair_id.into(),
            preferred_node_id: preferred_node_id.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Key of a persisted alert-activation record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GateKey {
    /// Agent that owns the record
    pub set_by: String,
    /// Record the condition is about (a pair id or a host id)
    pub record_locator: String,
    /// Condition name
    pub name: String,
}

impl GateKey {
    pub fn new(
        set_by: impl Into<String>,
        record_locator: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            set_by: set_by.into(),
            record_locator: record_locator.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for GateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.set_by, self.record_locator, self.name)
    }
}

/// Writes planned by one step of a pass, applied all-or-nothing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateChanges {
    /// New current row; also appended to the history
    pub snapshot: Option<ClusterSnapshot>,
    pub preference: Option<FenceDelayPreference>,
    /// Gate records to raise (`true`) or clear (`false`)
    pub gates: Vec<(GateKey, bool)>,
}

impl StateChanges {
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_none() && self.preference.is_none() && self.gates.is_empty()
    }
}

/// Workload figures for one node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeWorkload {
    pub running_workload_count: u32,
    pub any_workload_migrating: bool,
}

/// Read-only view of the workloads hosted by a pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadCensus {
    pub nodes: HashMap<HostId, NodeWorkload>,
}

impl WorkloadCensus {
    pub fn with_node(mut self, host_id: impl Into<HostId>, workload: NodeWorkload) -> Self {
        self.nodes.insert(host_id.into(), workload);
        self
    }

    /// Workload for a node; a node absent from the census hosts nothing.
    pub fn for_node(&self, host_id: &str) -> NodeWorkload {
        self.nodes.get(host_id).copied().unwrap_or_default()
    }

    pub fn any_migrating(&self) -> bool {
        self.nodes.values().any(|w| w.any_workload_migrating)
    }
}

/// Who this agent is, read once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    /// Name recorded as `set_by` on gates and alerts
    pub agent_name: String,
    pub host_id: HostId,
    pub pair_id: PairId,
    pub peer_host_id: HostId,
    /// Cluster node name of each known host
    pub node_names: HashMap<HostId, String>,
}

impl AgentIdentity {
    /// Resolve a cluster node name to the host that carries it.
    pub fn resolve_host(&self, node_name: &str) -> Option<HostId> {
        self.node_names
            .iter()
            .find(|(_, name)| name.as_str() == node_name)
            .map(|(host_id, _)| host_id.clone())
    }

    /// Display name for a host, falling back to the host id.
    pub fn node_name_of<'a>(&'a self, host_id: &'a str) -> &'a str {
        self.node_names
            .get(host_id)
            .map(String::as_str)
            .unwrap_or(host_id)
    }
}
