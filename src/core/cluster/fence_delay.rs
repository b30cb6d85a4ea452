//! Fence-delay self-assertion
//!
//! Each peer runs this once per pass and may only ever name itself as the
//! preferred fencing survivor. No node writes a preference on behalf of its
//! peer, so the two sides cannot contradict each other under partition: the
//! worst case is a stale record that a later pass corrects. Concurrent
//! assertions from both peers resolve by last write wins; either result is
//! safe.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::hysteresis::HysteresisGate;
use crate::domain::entities::{
    alert_keys, AgentIdentity, Alert, AlertLevel, ClusterSnapshot, FenceDelayPreference, GateKey,
    StateChanges, WorkloadCensus,
};
use crate::domain::repositories::{AlertSink, ClusterStateRepository, WorkloadRegistry};
use crate::error::Result;

/// Gate held while the peer cannot be verified as a joined member
pub const GATE_PEER_UNVERIFIED: &str = "fence-delay-peer-unverified";

/// Why no assertion was made this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    /// A workload is migrating somewhere in the pair
    WorkloadMigrating,
    /// The local node is already the preferred node
    AlreadyPreferred,
    /// Neither node runs a workload
    NothingRunning,
    /// Both nodes run workloads
    BothRunning,
    /// Only the peer runs workloads; asserting is the peer's job
    PeerResponsible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceDecision {
    Hold(HoldReason),
    AssertLocal,
}

/// Decide what the local node should do about the fence-delay preference.
pub fn decide(
    local_host_id: &str,
    peer_host_id: &str,
    preferred_node_id: Option<&str>,
    peer_joined: bool,
    census: &WorkloadCensus,
) -> FenceDecision {
    if census.any_migrating() {
        return FenceDecision::Hold(HoldReason::WorkloadMigrating);
    }

    let locally_preferred = preferred_node_id == Some(local_host_id);
    let assert_unless_preferred = || {
        if locally_preferred {
            FenceDecision::Hold(HoldReason::AlreadyPreferred)
        } else {
            FenceDecision::AssertLocal
        }
    };

    if !peer_joined {
        return assert_unless_preferred();
    }

    let local_running = census.for_node(local_host_id).running_workload_count;
    let peer_running = census.for_node(peer_host_id).running_workload_count;
    match (local_running > 0, peer_running > 0) {
        (false, false) => FenceDecision::Hold(HoldReason::NothingRunning),
        (true, true) => FenceDecision::Hold(HoldReason::BothRunning),
        (true, false) => assert_unless_preferred(),
        (false, true) => FenceDecision::Hold(HoldReason::PeerResponsible),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinationOutcome {
    Held(HoldReason),
    /// The local node wrote itself in as preferred
    Asserted { previous: Option<String> },
    /// The workload registry could not answer; nothing was decided
    CensusUnavailable,
}

pub struct FenceDelayCoordinator {
    store: Arc<dyn ClusterStateRepository>,
    gate: HysteresisGate,
    registry: Arc<dyn WorkloadRegistry>,
    alerts: Arc<dyn AlertSink>,
}

impl FenceDelayCoordinator {
    pub fn new(
        store: Arc<dyn ClusterStateRepository>,
        registry: Arc<dyn WorkloadRegistry>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            gate: HysteresisGate::new(store.clone()),
            store,
            registry,
            alerts,
        }
    }

    /// Run the protocol against the snapshot reconciled this pass. Returns the
    /// outcome and the number of alerts sent.
    pub async fn coordinate(
        &self,
        identity: &AgentIdentity,
        snapshot: &ClusterSnapshot,
    ) -> Result<(CoordinationOutcome, usize)> {
        let census = match self.registry.census(&identity.pair_id).await {
            Ok(census) => census,
            Err(e) => {
                warn!(
                    pair_id = %identity.pair_id,
                    error = %e,
                    "Skipping fence delay coordination"
                );
                return Ok((CoordinationOutcome::CensusUnavailable, 0));
            }
        };

        let preference = self.store.load_fence_preference(&identity.pair_id).await?;
        let previous = preference.map(|p| p.preferred_node_id);
        let peer_joined = snapshot
            .node(&identity.peer_host_id)
            .map(|peer| peer.is_cluster_joined)
            .unwrap_or(false);

        let decision = decide(
            &identity.host_id,
            &identity.peer_host_id,
            previous.as_deref(),
            peer_joined,
            &census,
        );

        let mut changes = StateChanges::default();
        let mut pending = Vec::new();
        let outcome = match decision {
            FenceDecision::Hold(reason) => {
                debug!(pair_id = %identity.pair_id, ?reason, "Fence delay preference left as is");
                CoordinationOutcome::Held(reason)
            }
            FenceDecision::AssertLocal => {
                changes.preference = Some(FenceDelayPreference::new(
                    &identity.pair_id,
                    &identity.host_id,
                ));
                pending.push(
                    Alert::new(
                        AlertLevel::Notice,
                        alert_keys::FENCE_DELAY_ASSERTED,
                        identity.agent_name.clone(),
                        &identity.pair_id,
                    )
                    .with_var("node_name", identity.node_name_of(&identity.host_id))
                    .with_var(
                        "previous",
                        previous
                            .as_deref()
                            .map(|id| identity.node_name_of(id))
                            .unwrap_or("none"),
                    ),
                );
                CoordinationOutcome::Asserted {
                    previous: previous.clone(),
                }
            }
        };

        let key = GateKey::new(
            identity.agent_name.clone(),
            &identity.peer_host_id,
            GATE_PEER_UNVERIFIED,
        );
        if let Some(change) = self.gate.transition(&key, !peer_joined).await? {
            let (level, message_key) = if peer_joined {
                (AlertLevel::Notice, alert_keys::FENCE_DELAY_PEER_VERIFIED)
            } else {
                (AlertLevel::Warning, alert_keys::FENCE_DELAY_PEER_UNVERIFIED)
            };
            changes.gates.push(change);
            pending.push(
                Alert::new(level, message_key, identity.agent_name.clone(), &identity.peer_host_id)
                    .with_var("node_name", identity.node_name_of(&identity.peer_host_id)),
            );
        }

        self.store.commit(&changes).await?;
        if changes.preference.is_some() {
            info!(
                pair_id = %identity.pair_id,
                host_id = %identity.host_id,
                previous = previous.as_deref().unwrap_or("none"),
                "Asserted local node as fence delay preference"
            );
        }

        let sent = pending.len();
        for alert in pending {
            self.alerts.notify(alert).await;
        }
        Ok((outcome, sent))
    }
}
