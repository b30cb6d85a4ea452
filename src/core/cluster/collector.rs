//! Cluster state collection
//!
//! Queries the resource manager for the live CIB and parses it into a
//! `ClusterSnapshot`. Every failure mode folds into a `CollectionFailure`;
//! the collector never hands back a partially populated snapshot.

use anyhow::Context;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::cib::parse_cib;
use crate::domain::entities::{AgentIdentity, ClusterSnapshot};
use crate::error::{CollectionFailure, CollectionFailureKind};

/// Source of the live cluster state for the local pair
#[async_trait]
pub trait StateCollector: Send + Sync {
    /// Observe the pair. `previous` is the last recorded snapshot, if any,
    /// and lets a renamed node keep its host.
    async fn collect(
        &self,
        identity: &AgentIdentity,
        previous: Option<&ClusterSnapshot>,
    ) -> Result<ClusterSnapshot, CollectionFailure>;
}

/// Collector that shells out to the resource-manager CLI (`pcs cluster cib`)
pub struct PcsStateCollector {
    command: Vec<String>,
    timeout: Duration,
}

impl PcsStateCollector {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    async fn query(&self) -> Result<String, CollectionFailure> {
        let (program, args) = self.command.split_first().ok_or_else(|| {
            CollectionFailure::new(CollectionFailureKind::ToolMissing, "no query command configured")
        })?;
        let rendered = self.command.join(" ");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CollectionFailure::new(
                    CollectionFailureKind::ToolMissing,
                    format!("{} is not installed", program),
                ))
            }
            Err(e) => {
                return Err(CollectionFailure::new(
                    CollectionFailureKind::NotMember,
                    format!("failed to run {}: {}", rendered, e),
                ))
            }
        };

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                CollectionFailure::new(
                    CollectionFailureKind::Timeout,
                    format!("{} did not finish within {:?}", rendered, self.timeout),
                )
            })?
            .with_context(|| format!("waiting for {}", rendered))
            .map_err(|e| CollectionFailure::new(CollectionFailureKind::NotMember, format!("{:#}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollectionFailure::new(
                CollectionFailureKind::NotMember,
                format!("{} exited with {}: {}", rendered, output.status, stderr.trim()),
            ));
        }

        String::from_utf8(output.stdout)
            .with_context(|| format!("output of {} is not UTF-8", rendered))
            .map_err(|e| CollectionFailure::malformed(format!("{:#}", e)))
    }
}

#[async_trait]
impl StateCollector for PcsStateCollector {
    async fn collect(
        &self,
        identity: &AgentIdentity,
        previous: Option<&ClusterSnapshot>,
    ) -> Result<ClusterSnapshot, CollectionFailure> {
        let xml = self.query().await?;
        debug!(bytes = xml.len(), "Received CIB from resource manager");
        parse_cib(&xml, identity, previous)
    }
}
