use std::sync::Arc;

use async_trait::async_trait;

use crate::ports::{
    incident_recorder::{Incident, IncidentRecorder},
    kv_store::{KvStore, StoreResult},
};

const INCIDENT_PREFIX: &str = "security:incidents:";

/// Keeps a bounded, newest-first incident trail per identity in the store
pub struct StoreIncidentRecorder {
    store: Arc<dyn KvStore>,
    capacity: usize,
}

impl StoreIncidentRecorder {
    pub fn new(store: Arc<dyn KvStore>, capacity: usize) -> Self {
        Self { store, capacity }
    }

    /// Most recent incidents for an identity. Unreadable entries are skipped.
    pub async fn recent(&self, hashed_ip: &str, limit: usize) -> StoreResult<Vec<Incident>> {
        let raw = self
            .store
            .list(&format!("{INCIDENT_PREFIX}{hashed_ip}"), limit)
            .await?;
        Ok(raw
            .iter()
            .filter_map(|entry| serde_json::from_str(entry).ok())
            .collect())
    }
}

#[async_trait]
impl IncidentRecorder for StoreIncidentRecorder {
    async fn record_incident(&self, hashed_ip: &str, incident: Incident) -> StoreResult<()> {
        let json = serde_json::to_string(&incident)?;
        self.store
            .push_bounded(&format!("{INCIDENT_PREFIX}{hashed_ip}"), &json, self.capacity)
            .await
    }
}
