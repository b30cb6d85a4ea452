//! Alert sinks
//!
//! Delivery is best-effort: a sink that cannot deliver logs the failure and
//! the pass carries on.

use async_trait::async_trait;
use mongodb::{bson::DateTime as BsonDateTime, Collection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::entities::{Alert, AlertLevel};
use crate::domain::repositories::AlertSink;
use crate::infrastructure::database::{db, DatabaseManager};

/// Writes every alert to the log at a level matching its severity.
#[derive(Debug, Default, Clone)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn notify(&self, alert: Alert) {
        let message = alert.message();
        match alert.level {
            AlertLevel::Critical => error!(
                key = %alert.message_key,
                set_by = %alert.set_by,
                locator = %alert.record_locator,
                "{}", message
            ),
            AlertLevel::Warning => warn!(
                key = %alert.message_key,
                set_by = %alert.set_by,
                locator = %alert.record_locator,
                "{}", message
            ),
            AlertLevel::Notice | AlertLevel::Info => info!(
                key = %alert.message_key,
                set_by = %alert.set_by,
                locator = %alert.record_locator,
                "{}", message
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDocument {
    pub level: AlertLevel,
    pub message_key: String,
    pub message: String,
    pub set_by: String,
    pub record_locator: String,
    pub variables: BTreeMap<String, String>,
    pub raised_at: BsonDateTime,
}

impl From<&Alert> for AlertDocument {
    fn from(alert: &Alert) -> Self {
        Self {
            level: alert.level,
            message_key: alert.message_key.clone(),
            message: alert.message(),
            set_by: alert.set_by.clone(),
            record_locator: alert.record_locator.clone(),
            variables: alert.variables.clone(),
            raised_at: BsonDateTime::from_millis(alert.raised_at.timestamp_millis()),
        }
    }
}

/// Queues alerts in the `alerts` collection for the dashboard's mailer.
pub struct MongoAlertSink {
    collection: Collection<AlertDocument>,
}

impl MongoAlertSink {
    pub fn new(manager: &DatabaseManager) -> Self {
        Self {
            collection: manager.collection(db::ALERTS),
        }
    }
}

#[async_trait]
impl AlertSink for MongoAlertSink {
    async fn notify(&self, alert: Alert) {
        let document = AlertDocument::from(&alert);
        if let Err(e) = self.collection.insert_one(document, None).await {
            error!(key = %alert.message_key, error = %e, "Failed to queue alert");
        }
    }
}

/// Hands each alert to every inner sink in order.
#[derive(Default, Clone)]
pub struct FanOutAlertSink {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl FanOutAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl AlertSink for FanOutAlertSink {
    async fn notify(&self, alert: Alert) {
        for sink in &self.sinks {
            sink.notify(alert.clone()).await;
        }
    }
}
