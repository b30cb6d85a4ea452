use anvil_cluster_agent::{
    config::Config,
    core::{
        cluster::{AgentDriver, DriverOptions, PcsStateCollector},
        logging::init_logging,
    },
    infrastructure::{
        database::DatabaseManager,
        repositories::{MongoClusterStateRepository, MongoWorkloadRegistry},
        FanOutAlertSink, MongoAlertSink, TracingAlertSink,
    },
    Result,
};
use dotenv::dotenv;
use std::sync::Arc;
use tracing::error;

#[tokio::main]
async fn main() {
    dotenv().ok();

    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // logging may not be up yet
            eprintln!("scan-cluster: {}", e);
            error!(error = %e, "Agent failed to start");
            e.exit_code().max(1)
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let config = Config::init()?;
    init_logging(&config.logging)?;

    let db = DatabaseManager::new(
        &config.mongodb_uri,
        &config.mongodb_database,
        config.db_timeout(),
    )
    .await?;

    let store = Arc::new(MongoClusterStateRepository::new(&db).await?);
    let registry = Arc::new(MongoWorkloadRegistry::new(&db));
    let alerts = Arc::new(
        FanOutAlertSink::new()
            .with_sink(Arc::new(TracingAlertSink))
            .with_sink(Arc::new(MongoAlertSink::new(&db))),
    );
    let collector = Arc::new(PcsStateCollector::new(
        config.collector.command.clone(),
        config.collector_timeout(),
    ));

    let driver = AgentDriver::new(
        config.identity(),
        DriverOptions {
            require_root: config.agent.require_root,
            non_member_exit_code: config.agent.non_member_exit_code,
        },
        collector,
        store,
        registry,
        alerts,
    );

    let report = driver.run_pass().await;
    Ok(report.exit_code)
}
