use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::entities::AgentIdentity;
use crate::error::{AppError, Result};

/// Environment variable pointing at an optional YAML configuration file
pub const CONFIG_PATH_ENV: &str = "ANVIL_AGENT_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mongodb_uri: String,
    pub mongodb_database: String,
    /// Bound on every persistence round trip, in seconds
    pub db_timeout_secs: u64,

    pub agent: AgentConfig,
    pub collector: CollectorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub host_id: String,
    pub pair_id: String,
    pub peer_host_id: String,
    pub local_node_name: String,
    pub peer_node_name: String,
    pub require_root: bool,
    /// Exit code used when this host is not a cluster member (0 or 2)
    pub non_member_exit_code: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Resource-manager query, program first
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// One of `compact`, `pretty`, `json`
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongodb_uri: String::new(),
            mongodb_database: "anvil".to_string(),
            db_timeout_secs: 10,
            agent: AgentConfig::default(),
            collector: CollectorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "scan-cluster".to_string(),
            host_id: String::new(),
            pair_id: String::new(),
            peer_host_id: String::new(),
            local_node_name: String::new(),
            peer_node_name: String::new(),
            require_root: true,
            non_member_exit_code: 0,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            command: vec!["pcs".to_string(), "cluster".to_string(), "cib".to_string()],
            timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Config {
    /// Load the configuration from the optional YAML file and the process
    /// environment. Call `dotenv()` first to pick up a `.env` file.
    pub fn init() -> Result<Config> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_yaml_file(&path)?,
            Err(_) => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &str) -> Result<Config> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read config file {}: {}", path, e))
        })?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Overlay settings from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MONGODB_URI") {
            self.mongodb_uri = v;
        }
        if let Some(v) = lookup("MONGODB_DATABASE") {
            self.mongodb_database = v;
        }
        if let Some(v) = lookup("ANVIL_DB_TIMEOUT_SECS") {
            self.db_timeout_secs = parse_number("ANVIL_DB_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("ANVIL_HOST_ID") {
            self.agent.host_id = v;
        }
        if let Some(v) = lookup("ANVIL_PAIR_ID") {
            self.agent.pair_id = v;
        }
        if let Some(v) = lookup("ANVIL_PEER_HOST_ID") {
            self.agent.peer_host_id = v;
        }
        if let Some(v) = lookup("ANVIL_LOCAL_NODE_NAME") {
            self.agent.local_node_name = v;
        }
        if let Some(v) = lookup("ANVIL_PEER_NODE_NAME") {
            self.agent.peer_node_name = v;
        }
        if let Some(v) = lookup("ANVIL_REQUIRE_ROOT") {
            self.agent.require_root = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = lookup("ANVIL_NON_MEMBER_EXIT_CODE") {
            self.agent.non_member_exit_code = parse_number("ANVIL_NON_MEMBER_EXIT_CODE", &v)?;
        }
        if let Some(v) = lookup("ANVIL_CIB_COMMAND") {
            self.collector.command = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = lookup("ANVIL_CIB_TIMEOUT_SECS") {
            self.collector.timeout_secs = parse_number("ANVIL_CIB_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("ANVIL_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("ANVIL_LOG_FORMAT") {
            self.logging.format = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("MONGODB_URI", &self.mongodb_uri),
            ("MONGODB_DATABASE", &self.mongodb_database),
            ("ANVIL_HOST_ID", &self.agent.host_id),
            ("ANVIL_PAIR_ID", &self.agent.pair_id),
            ("ANVIL_PEER_HOST_ID", &self.agent.peer_host_id),
            ("ANVIL_LOCAL_NODE_NAME", &self.agent.local_node_name),
            ("ANVIL_PEER_NODE_NAME", &self.agent.peer_node_name),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::StartupFailure(format!("{} must be set", name)));
            }
        }
        if self.agent.host_id == self.agent.peer_host_id {
            return Err(AppError::StartupFailure(
                "local and peer host ids must differ".to_string(),
            ));
        }
        if self.collector.command.is_empty() {
            return Err(AppError::StartupFailure(
                "cluster query command must not be empty".to_string(),
            ));
        }
        if !matches!(self.agent.non_member_exit_code, 0 | 2) {
            return Err(AppError::StartupFailure(format!(
                "non-member exit code must be 0 or 2, got {}",
                self.agent.non_member_exit_code
            )));
        }
        Ok(())
    }

    pub fn identity(&self) -> AgentIdentity {
        AgentIdentity {
            agent_name: self.agent.name.clone(),
            host_id: self.agent.host_id.clone(),
            pair_id: self.agent.pair_id.clone(),
            peer_host_id: self.agent.peer_host_id.clone(),
            node_names: HashMap::from([
                (self.agent.host_id.clone(), self.agent.local_node_name.clone()),
                (self.agent.peer_host_id.clone(), self.agent.peer_node_name.clone()),
            ]),
        }
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_secs(self.db_timeout_secs)
    }

    pub fn collector_timeout(&self) -> Duration {
        Duration::from_secs(self.collector.timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| AppError::ConfigError(format!("{} must be a number, got {:?}", name, value)))
}
