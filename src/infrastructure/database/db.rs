use mongodb::{
    bson::doc,
    options::{ClientOptions, ServerApi, ServerApiVersion},
    Client, Collection, Database,
};
use std::time::Duration;
use tracing::info;

use crate::error::{AppError, Result};

pub const CURRENT_SNAPSHOTS: &str = "cluster_snapshots";
pub const SNAPSHOT_HISTORY: &str = "cluster_snapshot_history";
pub const FENCE_DELAY_PREFERENCES: &str = "fence_delay_preferences";
pub const ALERT_GATES: &str = "alert_gates";
pub const SERVERS: &str = "servers";
pub const ALERTS: &str = "alerts";

#[derive(Clone)]
pub struct DatabaseManager {
    pub client: Client,
    pub database: Database,
    timeout: Duration,
}

impl DatabaseManager {
    /// Connect and confirm the server answers within `timeout`.
    pub async fn new(mongodb_uri: &str, database_name: &str, timeout: Duration) -> Result<Self> {
        info!("Connecting to MongoDB");

        let mut client_options = ClientOptions::parse(mongodb_uri).await.map_err(|e| {
            AppError::StartupFailure(format!("Failed to parse MongoDB URI: {}", e))
        })?;

        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);
        client_options.connect_timeout = Some(timeout);
        client_options.server_selection_timeout = Some(timeout);
        client_options.app_name = Some("anvil-cluster-agent".to_string());

        let client = Client::with_options(client_options).map_err(|e| {
            AppError::StartupFailure(format!("Failed to create MongoDB client: {}", e))
        })?;

        let manager = DatabaseManager {
            database: client.database(database_name),
            client,
            timeout,
        };
        manager
            .ping()
            .await
            .map_err(|e| AppError::StartupFailure(e.to_string()))?;

        info!(database = database_name, "Connected to MongoDB");
        Ok(manager)
    }

    pub async fn ping(&self) -> Result<()> {
        let admin = self.client.database("admin");
        let ping = admin.run_command(doc! {"ping": 1}, None);
        match tokio::time::timeout(self.timeout, ping).await {
            Ok(result) => {
                result.map_err(|e| {
                    AppError::PersistenceFailure(format!("Failed to ping MongoDB: {}", e))
                })?;
                Ok(())
            }
            Err(_) => Err(AppError::PersistenceFailure(format!(
                "MongoDB did not answer a ping within {:?}",
                self.timeout
            ))),
        }
    }

    pub fn collection<T>(&self, name: &str) -> Collection<T> {
        self.database.collection::<T>(name)
    }
}
