//! Persisted, edge-triggered alert deduplication
//!
//! A gate answers "should I notify?" for conditions that must fire once when
//! they appear and once when they resolve. State lives in the persistence
//! store, so two agent invocations separated by a restart see the same gate.
//!
//! Callers that persist other state in the same step use `transition` to plan
//! the gate write and commit it together with that state; an edge is only
//! real once its commit succeeded.

use std::sync::Arc;
use tracing::debug;

use crate::domain::entities::{GateKey, StateChanges};
use crate::domain::repositories::ClusterStateRepository;
use crate::error::Result;

#[derive(Clone)]
pub struct HysteresisGate {
    store: Arc<dyn ClusterStateRepository>,
}

impl HysteresisGate {
    pub fn new(store: Arc<dyn ClusterStateRepository>) -> Self {
        Self { store }
    }

    /// Plan moving the gate to `active` without writing anything. Returns the
    /// gate write on an edge, `None` when the gate is already there.
    pub async fn transition(&self, key: &GateKey, active: bool) -> Result<Option<(GateKey, bool)>> {
        if self.store.load_gate(key).await? == active {
            debug!(gate = %key, active, "Gate unchanged");
            return Ok(None);
        }
        Ok(Some((key.clone(), active)))
    }

    /// Mark the condition active. Returns `true` only on the inactive to
    /// active edge; the caller must notify exactly then.
    pub async fn raise(&self, key: &GateKey) -> Result<bool> {
        self.apply(key, true).await
    }

    /// Clear the condition. Returns `true` only on the active to inactive edge.
    pub async fn clear(&self, key: &GateKey) -> Result<bool> {
        self.apply(key, false).await
    }

    async fn apply(&self, key: &GateKey, active: bool) -> Result<bool> {
        let Some(change) = self.transition(key, active).await? else {
            return Ok(false);
        };
        self.store
            .commit(&StateChanges {
                gates: vec![change],
                ..Default::default()
            })
            .await?;
        debug!(gate = %key, active, "Gate written");
        Ok(true)
    }
}
