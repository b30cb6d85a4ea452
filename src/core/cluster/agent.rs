//! One agent pass
//!
//! `Init -> Collecting -> Reconciling -> Coordinating -> Done`, leaving early
//! for `NotClusterMember` when collection fails and for `Fatal` when the
//! privilege check or any persistence step fails. Steps run strictly in
//! sequence and nothing is retried; the external scheduler re-invokes.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::collector::StateCollector;
use super::fence_delay::{CoordinationOutcome, FenceDelayCoordinator};
use super::reconciler::{ReconcileOutcome, Reconciler};
use crate::domain::entities::AgentIdentity;
use crate::domain::repositories::{AlertSink, ClusterStateRepository, WorkloadRegistry};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Init,
    Collecting,
    Reconciling,
    Coordinating,
    Done,
    NotClusterMember,
    Fatal,
}

impl fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AgentPhase::Init => "init",
            AgentPhase::Collecting => "collecting",
            AgentPhase::Reconciling => "reconciling",
            AgentPhase::Coordinating => "coordinating",
            AgentPhase::Done => "done",
            AgentPhase::NotClusterMember => "not_cluster_member",
            AgentPhase::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

/// Decides whether this process may run cluster logic.
pub trait PrivilegeCheck: Send + Sync {
    fn is_privileged(&self) -> Result<bool>;
}

/// Treats the owner of `/proc/self` (the effective uid) being root as privileged.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcSelfPrivilege;

impl PrivilegeCheck for ProcSelfPrivilege {
    fn is_privileged(&self) -> Result<bool> {
        use std::os::unix::fs::MetadataExt;
        let metadata = std::fs::metadata("/proc/self")?;
        Ok(metadata.uid() == 0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DriverOptions {
    pub require_root: bool,
    /// Exit code for a pass that found the host outside the cluster (0 or 2)
    pub non_member_exit_code: i32,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            require_root: true,
            non_member_exit_code: 0,
        }
    }
}

/// Summary of a pass, logged when it ends
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    /// Correlates the log lines of one pass
    pub pass_id: Uuid,
    pub phase: AgentPhase,
    pub exit_code: i32,
    pub alerts_sent: usize,
    pub snapshot_written: bool,
    pub preference_written: bool,
    pub reconcile: Option<ReconcileOutcome>,
    pub coordination: Option<CoordinationOutcome>,
    pub error: Option<String>,
}

impl PassReport {
    fn new() -> Self {
        Self {
            pass_id: Uuid::new_v4(),
            phase: AgentPhase::Init,
            exit_code: 0,
            alerts_sent: 0,
            snapshot_written: false,
            preference_written: false,
            reconcile: None,
            coordination: None,
            error: None,
        }
    }

    fn enter(&mut self, phase: AgentPhase) {
        debug!(pass_id = %self.pass_id, from = %self.phase, to = %phase, "Agent phase transition");
        self.phase = phase;
    }

    fn fail(mut self, err: AppError) -> Self {
        error!(pass_id = %self.pass_id, phase = %self.phase, error = %err, "Agent pass aborted");
        self.exit_code = err.exit_code().max(1);
        self.error = Some(err.to_string());
        self.enter(AgentPhase::Fatal);
        self
    }
}

pub struct AgentDriver {
    identity: AgentIdentity,
    options: DriverOptions,
    collector: Arc<dyn StateCollector>,
    store: Arc<dyn ClusterStateRepository>,
    privilege: Arc<dyn PrivilegeCheck>,
    reconciler: Reconciler,
    coordinator: FenceDelayCoordinator,
}

impl AgentDriver {
    pub fn new(
        identity: AgentIdentity,
        options: DriverOptions,
        collector: Arc<dyn StateCollector>,
        store: Arc<dyn ClusterStateRepository>,
        registry: Arc<dyn WorkloadRegistry>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            identity,
            options,
            collector,
            reconciler: Reconciler::new(store.clone(), alerts.clone()),
            coordinator: FenceDelayCoordinator::new(store.clone(), registry, alerts),
            store,
            privilege: Arc::new(ProcSelfPrivilege),
        }
    }

    pub fn with_privilege_check(mut self, privilege: Arc<dyn PrivilegeCheck>) -> Self {
        self.privilege = privilege;
        self
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    /// Run one pass to a terminal phase. Never returns an error; failures are
    /// folded into the report and its exit code.
    pub async fn run_pass(&self) -> PassReport {
        let mut report = PassReport::new();

        if let Err(e) = self.init().await {
            return self.finish(report.fail(e));
        }

        report.enter(AgentPhase::Collecting);
        let persisted = match self.store.load_current(&self.identity.pair_id).await {
            Ok(persisted) => persisted,
            Err(e) => return self.finish(report.fail(e)),
        };
        let observed = self.collector.collect(&self.identity, persisted.as_ref()).await;
        if let Err(failure) = &observed {
            warn!(host_id = %self.identity.host_id, error = %failure, "Cluster state unavailable");
        }

        report.enter(AgentPhase::Reconciling);
        let reconciled = self
            .reconciler
            .reconcile_with(&self.identity, persisted, observed)
            .await;
        let (outcome, sent) = match reconciled {
            Ok(result) => result,
            Err(e) => return self.finish(report.fail(e)),
        };
        report.alerts_sent += sent;
        report.snapshot_written = outcome.wrote_snapshot();

        let snapshot = match outcome.snapshot() {
            Some(snapshot) => snapshot.clone(),
            None => {
                report.reconcile = Some(outcome);
                report.enter(AgentPhase::NotClusterMember);
                report.exit_code = self.options.non_member_exit_code;
                return self.finish(report);
            }
        };
        report.reconcile = Some(outcome);

        report.enter(AgentPhase::Coordinating);
        match self.coordinator.coordinate(&self.identity, &snapshot).await {
            Ok((coordination, sent)) => {
                report.alerts_sent += sent;
                report.preference_written =
                    matches!(coordination, CoordinationOutcome::Asserted { .. });
                report.coordination = Some(coordination);
            }
            Err(e) => return self.finish(report.fail(e)),
        }

        report.enter(AgentPhase::Done);
        self.finish(report)
    }

    async fn init(&self) -> Result<()> {
        if self.options.require_root && !self.privilege.is_privileged()? {
            return Err(AppError::StartupFailure(
                "the cluster agent must run as root".to_string(),
            ));
        }
        self.store
            .ping()
            .await
            .map_err(|e| AppError::StartupFailure(format!("persistence unreachable: {}", e)))
    }

    fn finish(&self, report: PassReport) -> PassReport {
        info!(
            pass_id = %report.pass_id,
            host_id = %self.identity.host_id,
            pair_id = %self.identity.pair_id,
            phase = %report.phase,
            exit_code = report.exit_code,
            alerts = report.alerts_sent,
            snapshot_written = report.snapshot_written,
            preference_written = report.preference_written,
            "Agent pass finished"
        );
        report
    }
}
