use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, Collection};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        entities::{HostId, PairId, WorkloadCensus},
        repositories::WorkloadRegistry,
    },
    error::{AppError, Result},
    infrastructure::database::{db, DatabaseManager},
};

/// A hosted server as recorded by the workload scanner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDocument {
    pub pair_id: PairId,
    pub host_id: HostId,
    pub state: String,
}

impl ServerDocument {
    fn is_running(&self) -> bool {
        matches!(self.state.as_str(), "running" | "migrating")
    }

    fn is_migrating(&self) -> bool {
        self.state == "migrating"
    }
}

/// Fold server records into per-node counts. Servers in any other state
/// (shut off, crashed, paused) do not count.
pub fn census_from(servers: &[ServerDocument]) -> WorkloadCensus {
    let mut census = WorkloadCensus::default();
    for server in servers {
        let node = census.nodes.entry(server.host_id.clone()).or_default();
        if server.is_running() {
            node.running_workload_count += 1;
        }
        if server.is_migrating() {
            node.any_workload_migrating = true;
        }
    }
    census
}

pub struct MongoWorkloadRegistry {
    collection: Collection<ServerDocument>,
}

impl MongoWorkloadRegistry {
    pub fn new(manager: &DatabaseManager) -> Self {
        Self {
            collection: manager.collection(db::SERVERS),
        }
    }
}

#[async_trait]
impl WorkloadRegistry for MongoWorkloadRegistry {
    async fn census(&self, pair_id: &PairId) -> Result<WorkloadCensus> {
        let servers: Vec<ServerDocument> = self
            .collection
            .find(doc! { "pair_id": pair_id }, None)
            .await
            .map_err(|e| AppError::CensusUnavailable(format!("Failed to query servers: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| AppError::CensusUnavailable(format!("Failed to read servers: {}", e)))?;
        Ok(census_from(&servers))
    }
}
