use async_trait::async_trait;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime},
    options::{IndexOptions, ReplaceOptions},
    Client, Collection, IndexModel,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{
    domain::{
        entities::{
            ClusterSnapshot, FenceDelayPreference, GateKey, NodeState, PairId, StateChanges,
        },
        repositories::ClusterStateRepository,
    },
    error::{AppError, Result},
    infrastructure::database::{db, DatabaseManager},
};

/// Stored form of a snapshot, shared by the current and history collections.
/// Nodes are kept as an array so host ids never become BSON field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub pair_id: PairId,
    pub cluster_name: String,
    pub stonith_enabled: bool,
    pub stonith_max_attempts: u32,
    pub raw_config_blob: String,
    pub nodes: Vec<NodeState>,
    pub recorded_at: BsonDateTime,
}

impl SnapshotDocument {
    fn from_snapshot(snapshot: &ClusterSnapshot) -> Self {
        let nodes = snapshot
            .sorted_host_ids()
            .into_iter()
            .filter_map(|host_id| snapshot.node(host_id).cloned())
            .collect();
        Self {
            id: None,
            pair_id: snapshot.pair_id.clone(),
            cluster_name: snapshot.cluster_name.clone(),
            stonith_enabled: snapshot.stonith_enabled,
            stonith_max_attempts: snapshot.stonith_max_attempts,
            raw_config_blob: snapshot.raw_config_blob.clone(),
            nodes,
            recorded_at: BsonDateTime::now(),
        }
    }

    fn into_snapshot(self) -> ClusterSnapshot {
        ClusterSnapshot {
            pair_id: self.pair_id,
            cluster_name: self.cluster_name,
            stonith_enabled: self.stonith_enabled,
            stonith_max_attempts: self.stonith_max_attempts,
            raw_config_blob: self.raw_config_blob,
            nodes: Default::default(),
        }
        .with_nodes(self.nodes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDocument {
    pub set_by: String,
    pub record_locator: String,
    pub name: String,
    pub raised_at: BsonDateTime,
}

impl GateDocument {
    fn raised(key: &GateKey) -> Self {
        Self {
            set_by: key.set_by.clone(),
            record_locator: key.record_locator.clone(),
            name: key.name.clone(),
            raised_at: BsonDateTime::now(),
        }
    }
}

/// MongoDB implementation of the cluster state repository
pub struct MongoClusterStateRepository {
    manager: DatabaseManager,
    current: Collection<SnapshotDocument>,
    history: Collection<SnapshotDocument>,
    preferences: Collection<FenceDelayPreference>,
    gates: Collection<GateDocument>,
}

impl MongoClusterStateRepository {
    pub async fn new(manager: &DatabaseManager) -> Result<Self> {
        let repo = Self {
            manager: manager.clone(),
            current: manager.collection(db::CURRENT_SNAPSHOTS),
            history: manager.collection(db::SNAPSHOT_HISTORY),
            preferences: manager.collection(db::FENCE_DELAY_PREFERENCES),
            gates: manager.collection(db::ALERT_GATES),
        };
        repo.create_indexes().await?;
        Ok(repo)
    }

    async fn create_indexes(&self) -> Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.current
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "pair_id": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await
            .map_err(|e| AppError::PersistenceFailure(format!("Failed to create indexes: {}", e)))?;

        self.history
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "pair_id": 1, "recorded_at": -1 })
                    .build(),
                None,
            )
            .await
            .map_err(|e| AppError::PersistenceFailure(format!("Failed to create indexes: {}", e)))?;

        self.preferences
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "pair_id": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await
            .map_err(|e| AppError::PersistenceFailure(format!("Failed to create indexes: {}", e)))?;

        self.gates
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "set_by": 1, "record_locator": 1, "name": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await
            .map_err(|e| AppError::PersistenceFailure(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    fn client(&self) -> &Client {
        &self.manager.client
    }
}

fn upsert() -> ReplaceOptions {
    ReplaceOptions::builder().upsert(true).build()
}

fn gate_filter(key: &GateKey) -> mongodb::bson::Document {
    doc! {
        "set_by": &key.set_by,
        "record_locator": &key.record_locator,
        "name": &key.name,
    }
}

#[async_trait]
impl ClusterStateRepository for MongoClusterStateRepository {
    async fn ping(&self) -> Result<()> {
        self.manager.ping().await
    }

    async fn load_current(&self, pair_id: &str) -> Result<Option<ClusterSnapshot>> {
        let document = self
            .current
            .find_one(doc! { "pair_id": pair_id }, None)
            .await
            .map_err(|e| {
                AppError::PersistenceFailure(format!("Failed to load current snapshot: {}", e))
            })?;
        Ok(document.map(SnapshotDocument::into_snapshot))
    }

    async fn history_count(&self, pair_id: &str) -> Result<u64> {
        self.history
            .count_documents(doc! { "pair_id": pair_id }, None)
            .await
            .map_err(|e| AppError::PersistenceFailure(format!("Failed to count history: {}", e)))
    }

    async fn load_fence_preference(&self, pair_id: &str) -> Result<Option<FenceDelayPreference>> {
        self.preferences
            .find_one(doc! { "pair_id": pair_id }, None)
            .await
            .map_err(|e| {
                AppError::PersistenceFailure(format!("Failed to load fence preference: {}", e))
            })
    }

    async fn load_gate(&self, key: &GateKey) -> Result<bool> {
        let found = self
            .gates
            .find_one(gate_filter(key), None)
            .await
            .map_err(|e| AppError::PersistenceFailure(format!("Failed to load gate {}: {}", key, e)))?;
        Ok(found.is_some())
    }

    async fn commit(&self, changes: &StateChanges) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut session = self.client().start_session(None).await.map_err(|e| {
            AppError::PersistenceFailure(format!("Failed to start session: {}", e))
        })?;
        session.start_transaction(None).await.map_err(|e| {
            AppError::PersistenceFailure(format!("Failed to start transaction: {}", e))
        })?;

        let writes = async {
            if let Some(snapshot) = &changes.snapshot {
                let document = SnapshotDocument::from_snapshot(snapshot);
                self.current
                    .replace_one_with_session(
                        doc! { "pair_id": &snapshot.pair_id },
                        &document,
                        upsert(),
                        &mut session,
                    )
                    .await?;
                self.history
                    .insert_one_with_session(&document, None, &mut session)
                    .await?;
            }
            if let Some(preference) = &changes.preference {
                self.preferences
                    .replace_one_with_session(
                        doc! { "pair_id": &preference.pair_id },
                        preference,
                        upsert(),
                        &mut session,
                    )
                    .await?;
            }
            for (key, active) in &changes.gates {
                if *active {
                    self.gates
                        .replace_one_with_session(
                            gate_filter(key),
                            GateDocument::raised(key),
                            upsert(),
                            &mut session,
                        )
                        .await?;
                } else {
                    self.gates
                        .delete_one_with_session(gate_filter(key), None, &mut session)
                        .await?;
                }
            }
            Ok::<(), mongodb::error::Error>(())
        }
        .await;

        if let Err(e) = writes {
            if let Err(abort_err) = session.abort_transaction().await {
                error!(error = %abort_err, "Failed to abort state transaction");
            }
            return Err(AppError::PersistenceFailure(format!(
                "Failed to write cluster state: {}",
                e
            )));
        }

        session.commit_transaction().await.map_err(|e| {
            AppError::PersistenceFailure(format!("Failed to commit cluster state: {}", e))
        })?;
        debug!(
            snapshot = changes.snapshot.is_some(),
            preference = changes.preference.is_some(),
            gates = changes.gates.len(),
            "Cluster state committed"
        );
        Ok(())
    }
}
