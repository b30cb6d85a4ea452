//! Alert entities raised by the cluster agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Critical,
    Warning,
    Notice,
    Info,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AlertLevel::Critical => "critical",
            AlertLevel::Warning => "warning",
            AlertLevel::Notice => "notice",
            AlertLevel::Info => "info",
        };
        f.write_str(label)
    }
}

/// Stable message keys understood by alert consumers
pub mod keys {
    pub const CLUSTER_NEW: &str = "cluster.new";
    pub const CLUSTER_FIELD_CHANGED: &str = "cluster.field_changed";
    pub const CLUSTER_CONFIG_CHANGED: &str = "cluster.config_changed";
    pub const NODE_ADDED: &str = "node.added";
    pub const NODE_REMOVED: &str = "node.removed";
    pub const NODE_FIELD_CHANGED: &str = "node.field_changed";
    pub const MEMBERSHIP_LOST: &str = "membership.lost";
    pub const MEMBERSHIP_REGAINED: &str = "membership.regained";
    pub const STONITH_DISABLED: &str = "stonith.disabled";
    pub const STONITH_ENABLED: &str = "stonith.enabled";
    pub const FENCE_DELAY_ASSERTED: &str = "fence_delay.asserted";
    pub const FENCE_DELAY_PEER_UNVERIFIED: &str = "fence_delay.peer_unverified";
    pub const FENCE_DELAY_PEER_VERIFIED: &str = "fence_delay.peer_verified";
}

/// One notification handed to the alert sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message_key: String,
    /// Agent that raised the alert
    pub set_by: String,
    /// Pair or host the alert is about
    pub record_locator: String,
    pub variables: BTreeMap<String, String>,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        level: AlertLevel,
        message_key: &str,
        set_by: impl Into<String>,
        record_locator: impl Into<String>,
    ) -> Self {
        Self {
            level,
            message_key: message_key.to_string(),
            set_by: set_by.into(),
            record_locator: record_locator.into(),
            variables: BTreeMap::new(),
            raised_at: Utc::now(),
        }
    }

    pub fn with_var(mut self, name: &str, value: impl ToString) -> Self {
        self.variables.insert(name.to_string(), value.to_string());
        self
    }

    pub fn var(&self, name: &str) -> &str {
        self.variables.get(name).map(String::as_str).unwrap_or("")
    }

    /// Human readable rendering of the alert.
    pub fn message(&self) -> String {
        match self.message_key.as_str() {
            keys::CLUSTER_NEW => format!(
                "new cluster discovered: {} ({} nodes)",
                self.var("cluster_name"),
                self.var("node_count")
            ),
            keys::CLUSTER_FIELD_CHANGED => format!(
                "{} changed: {} -> {}",
                self.var("field").replace('_', " "),
                self.var("old"),
                self.var("new")
            ),
            keys::CLUSTER_CONFIG_CHANGED => {
                format!("cluster configuration changed:\n{}", self.var("diff"))
            }
            keys::NODE_ADDED => format!(
                "node added: {} ({}), membership={} daemon={} joined={} maintenance={}",
                self.var("node_name"),
                self.var("host_id"),
                self.var("in_membership"),
                self.var("is_daemon_member"),
                self.var("is_cluster_joined"),
                self.var("maintenance_mode")
            ),
            keys::NODE_REMOVED => format!(
                "node removed: {} ({})",
                self.var("node_name"),
                self.var("host_id")
            ),
            keys::NODE_FIELD_CHANGED => format!(
                "node {} {} changed: {} -> {}",
                self.var("node_name"),
                self.var("field").replace('_', " "),
                self.var("old"),
                self.var("new")
            ),
            keys::MEMBERSHIP_LOST => format!(
                "lost cluster membership on {}: {}",
                self.var("node_name"),
                self.var("reason")
            ),
            keys::MEMBERSHIP_REGAINED => {
                format!("regained cluster membership on {}", self.var("node_name"))
            }
            keys::STONITH_DISABLED => format!(
                "fencing is disabled on cluster {}",
                self.var("cluster_name")
            ),
            keys::STONITH_ENABLED => format!(
                "fencing is enabled again on cluster {}",
                self.var("cluster_name")
            ),
            keys::FENCE_DELAY_ASSERTED => format!(
                "fence delay preference assigned to {} (previously {})",
                self.var("node_name"),
                self.var("previous")
            ),
            keys::FENCE_DELAY_PEER_UNVERIFIED => format!(
                "peer {} is not joined to the cluster; fence delay decided from local facts only",
                self.var("node_name")
            ),
            keys::FENCE_DELAY_PEER_VERIFIED => {
                format!("peer {} is joined to the cluster again", self.var("node_name"))
            }
            other => format!("{} {:?}", other, self.variables),
        }
    }
}
