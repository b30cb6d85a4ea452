#![allow(dead_code)]

use anvil_cluster_agent::{
    core::cluster::{AgentDriver, DriverOptions, PassReport, StateCollector},
    domain::entities::{
        AgentIdentity, ClusterSnapshot, FenceDelayPreference, NodeState, NodeWorkload,
        WorkloadCensus,
    },
    error::{CollectionFailure, CollectionFailureKind},
};
use std::collections::HashMap;
use std::sync::Arc;

pub mod mocks;
pub mod store;

pub use mocks::*;
pub use store::*;

pub const PAIR: &str = "P1";
pub const LOCAL: &str = "n1";
pub const PEER: &str = "n2";

pub fn identity() -> AgentIdentity {
    AgentIdentity {
        agent_name: "scan-cluster".to_string(),
        host_id: LOCAL.to_string(),
        pair_id: PAIR.to_string(),
        peer_host_id: PEER.to_string(),
        node_names: HashMap::from([
            (LOCAL.to_string(), "an-a01n01".to_string()),
            (PEER.to_string(), "an-a01n02".to_string()),
        ]),
    }
}

pub fn node(host_id: &str) -> NodeState {
    NodeState {
        host_id: host_id.to_string(),
        node_name: identity().node_name_of(host_id).to_string(),
        scheduler_internal_id: if host_id == LOCAL { "1" } else { "2" }.to_string(),
        in_membership: true,
        is_daemon_member: true,
        is_cluster_joined: true,
        maintenance_mode: false,
    }
}

pub fn snapshot(nodes: impl IntoIterator<Item = NodeState>) -> ClusterSnapshot {
    ClusterSnapshot {
        pair_id: PAIR.to_string(),
        cluster_name: "prod-pair".to_string(),
        stonith_enabled: true,
        stonith_max_attempts: 10,
        raw_config_blob: "<configuration>\n  <resources/>\n</configuration>".to_string(),
        nodes: HashMap::new(),
    }
    .with_nodes(nodes)
}

/// Both nodes present and joined
pub fn healthy_pair() -> ClusterSnapshot {
    snapshot([node(LOCAL), node(PEER)])
}

pub fn peer_down() -> ClusterSnapshot {
    let mut peer = node(PEER);
    peer.in_membership = false;
    peer.is_daemon_member = false;
    peer.is_cluster_joined = false;
    snapshot([node(LOCAL), peer])
}

pub fn not_member() -> CollectionFailure {
    CollectionFailure::new(CollectionFailureKind::NotMember, "pcs exited with status 1")
}

/// CIB document for the pair with both nodes joined, the peer named `peer_name`
pub fn cib_xml(peer_name: &str) -> String {
    format!(
        r#"<cib epoch="12" num_updates="0" admin_epoch="0">
  <configuration>
    <crm_config>
      <cluster_property_set id="cib-bootstrap-options">
        <nvpair id="opt-cluster-name" name="cluster-name" value="prod-pair"/>
        <nvpair id="opt-stonith-enabled" name="stonith-enabled" value="true"/>
      </cluster_property_set>
    </crm_config>
    <nodes>
      <node id="1" uname="an-a01n01"/>
      <node id="2" uname="{peer}"/>
    </nodes>
  </configuration>
  <status>
    <node_state id="1" uname="an-a01n01" in_ccm="true" crmd="online" join="member"/>
    <node_state id="2" uname="{peer}" in_ccm="true" crmd="online" join="member"/>
  </status>
</cib>"#,
        peer = peer_name
    )
}

pub fn census(local: u32, peer: u32) -> WorkloadCensus {
    let workload = |running| NodeWorkload {
        running_workload_count: running,
        any_workload_migrating: false,
    };
    WorkloadCensus::default()
        .with_node(LOCAL, workload(local))
        .with_node(PEER, workload(peer))
}

pub fn migrating(local: u32, peer: u32, on: &str) -> WorkloadCensus {
    let mut census = census(local, peer);
    census.nodes.entry(on.to_string()).or_default().any_workload_migrating = true;
    census
}

/// An agent wired to in-memory collaborators
pub struct TestAgent {
    pub store: Arc<InMemoryClusterStore>,
    pub registry: Arc<StaticWorkloadRegistry>,
    pub alerts: Arc<RecordingAlertSink>,
    pub collector: Arc<ScriptedCollector>,
    pub driver: AgentDriver,
}

impl TestAgent {
    pub fn new(census: WorkloadCensus) -> Self {
        Self::with_options(
            census,
            DriverOptions {
                require_root: false,
                non_member_exit_code: 0,
            },
        )
    }

    pub fn with_options(census: WorkloadCensus, options: DriverOptions) -> Self {
        let collector = Arc::new(ScriptedCollector::new());
        Self::wired(census, options, collector.clone(), collector)
    }

    /// Agent reading cluster state from `source` instead of the script
    pub fn with_collector(census: WorkloadCensus, source: Arc<dyn StateCollector>) -> Self {
        let options = DriverOptions {
            require_root: false,
            non_member_exit_code: 0,
        };
        Self::wired(census, options, Arc::new(ScriptedCollector::new()), source)
    }

    fn wired(
        census: WorkloadCensus,
        options: DriverOptions,
        collector: Arc<ScriptedCollector>,
        source: Arc<dyn StateCollector>,
    ) -> Self {
        let store = Arc::new(InMemoryClusterStore::new());
        let registry = Arc::new(StaticWorkloadRegistry::new(census));
        let alerts = Arc::new(RecordingAlertSink::new());
        let driver = AgentDriver::new(
            identity(),
            options,
            source,
            store.clone(),
            registry.clone(),
            alerts.clone(),
        );
        Self {
            store,
            registry,
            alerts,
            collector,
            driver,
        }
    }

    pub async fn prefer(&self, host_id: &str) {
        self.store
            .seed_preference(FenceDelayPreference::new(PAIR, host_id))
            .await;
    }

    pub async fn observe(&self, snapshot: ClusterSnapshot) {
        self.collector.push(Ok(snapshot)).await;
    }

    pub async fn fail_collection(&self) {
        self.collector.push(Err(not_member())).await;
    }

    pub async fn pass(&self) -> PassReport {
        self.driver.run_pass().await
    }

    pub async fn preferred(&self) -> Option<String> {
        use anvil_cluster_agent::domain::repositories::ClusterStateRepository;
        self.store
            .load_fence_preference(PAIR)
            .await
            .expect("in-memory reads do not fail")
            .map(|p| p.preferred_node_id)
    }
}
