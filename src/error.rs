use std::fmt;

/// Why the resource-manager query could not produce a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionFailureKind {
    /// The query tool is not installed on this host
    ToolMissing,
    /// The query did not finish within the configured bound
    Timeout,
    /// The tool ran but this host is not an active cluster member
    NotMember,
    /// The tool answered with output that could not be parsed
    Malformed,
}

impl fmt::Display for CollectionFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CollectionFailureKind::ToolMissing => "tool missing",
            CollectionFailureKind::Timeout => "timeout",
            CollectionFailureKind::NotMember => "not a member",
            CollectionFailureKind::Malformed => "malformed output",
        };
        f.write_str(label)
    }
}

/// Distinguished collection failure. Never accompanied by a partial snapshot.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Cluster state collection failed ({kind}): {detail}")]
pub struct CollectionFailure {
    pub kind: CollectionFailureKind,
    pub detail: String,
}

impl CollectionFailure {
    pub fn new(kind: CollectionFailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(CollectionFailureKind::Malformed, detail)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Startup failure: {0}")]
    StartupFailure(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error(transparent)]
    Collection(#[from] CollectionFailure),

    #[error("Inconsistent peer data: {0}")]
    InconsistentPeerData(String),

    #[error("Workload census unavailable: {0}")]
    CensusUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Process exit code reported to the external scheduler.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Collection(_)
            | AppError::InconsistentPeerData(_)
            | AppError::CensusUnavailable(_) => 0,
            AppError::StartupFailure(_)
            | AppError::PersistenceFailure(_)
            | AppError::ConfigError(_)
            | AppError::Internal(_) => 1,
        }
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::PersistenceFailure(format!("MongoDB error: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::ConfigError(format!("YAML error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
