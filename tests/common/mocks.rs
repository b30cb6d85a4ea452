use anvil_cluster_agent::{
    core::cluster::{cib::parse_cib, PrivilegeCheck, StateCollector},
    domain::entities::{AgentIdentity, ClusterSnapshot},
    error::{CollectionFailure, Result},
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

type Observation = std::result::Result<ClusterSnapshot, CollectionFailure>;

/// Collector that replays queued observations; the last one repeats.
pub struct ScriptedCollector {
    script: Mutex<VecDeque<Observation>>,
    last: Mutex<Option<Observation>>,
    calls: AtomicUsize,
}

impl ScriptedCollector {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub async fn push(&self, observation: Observation) {
        self.script.lock().await.push_back(observation);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateCollector for ScriptedCollector {
    async fn collect(
        &self,
        _identity: &AgentIdentity,
        _previous: Option<&ClusterSnapshot>,
    ) -> Observation {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().await;
        if let Some(next) = self.script.lock().await.pop_front() {
            *last = Some(next);
        }
        last.clone()
            .unwrap_or_else(|| Err(CollectionFailure::malformed("no observation scripted")))
    }
}

/// Collector that parses a fixed CIB document, like the resource-manager
/// collector does with the tool's output
pub struct CibCollector {
    xml: Mutex<String>,
}

impl CibCollector {
    pub fn new(xml: impl Into<String>) -> Self {
        Self {
            xml: Mutex::new(xml.into()),
        }
    }

    pub async fn set(&self, xml: impl Into<String>) {
        *self.xml.lock().await = xml.into();
    }
}

#[async_trait]
impl StateCollector for CibCollector {
    async fn collect(
        &self,
        identity: &AgentIdentity,
        previous: Option<&ClusterSnapshot>,
    ) -> Observation {
        parse_cib(&self.xml.lock().await, identity, previous)
    }
}

/// Privilege check with a fixed answer
pub struct FixedPrivilege(pub bool);

impl PrivilegeCheck for FixedPrivilege {
    fn is_privileged(&self) -> Result<bool> {
        Ok(self.0)
    }
}
