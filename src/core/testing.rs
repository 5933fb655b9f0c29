//! Shared fixtures for unit tests.
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    adapters::{MemoryStore, StoreIncidentRecorder},
    config::ServerConfig,
    core::deception::DeceptionService,
    ports::{
        alert_dispatcher::{AlertDispatcher, AlertError, SecurityAlert},
        kv_store::{KvStore, StoreError, StoreResult},
    },
};

/// A store whose every call fails
pub struct UnavailableStore;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl KvStore for UnavailableStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        down()
    }
    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> StoreResult<()> {
        down()
    }
    async fn delete(&self, _key: &str) -> StoreResult<()> {
        down()
    }
    async fn exists(&self, _key: &str) -> StoreResult<bool> {
        down()
    }
    async fn incr_by(&self, _key: &str, _delta: i64) -> StoreResult<i64> {
        down()
    }
    async fn push_bounded(&self, _key: &str, _value: &str, _capacity: usize) -> StoreResult<()> {
        down()
    }
    async fn list(&self, _key: &str, _limit: usize) -> StoreResult<Vec<String>> {
        down()
    }
    async fn health_check(&self) -> StoreResult<()> {
        down()
    }
}

/// Dispatcher that keeps every alert it is handed
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<SecurityAlert>>,
}

impl RecordingDispatcher {
    pub fn alerts(&self) -> Vec<SecurityAlert> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AlertDispatcher for RecordingDispatcher {
    async fn send_security_alert(&self, alert: &SecurityAlert) -> Result<(), AlertError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(alert.clone());
        }
        Ok(())
    }
}

/// Service over a fresh memory store, returning the store for inspection.
pub fn test_service(
    config: ServerConfig,
    dispatcher: Arc<RecordingDispatcher>,
) -> (DeceptionService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let incidents = Arc::new(StoreIncidentRecorder::new(
        store.clone(),
        config.alerts.incident_capacity,
    ));
    let service = DeceptionService::new(Arc::new(config), store.clone(), dispatcher, incidents);
    (service, store)
}

/// Service over a store that is down.
pub fn unavailable_service(config: ServerConfig) -> DeceptionService {
    let store: Arc<dyn KvStore> = Arc::new(UnavailableStore);
    let incidents = Arc::new(StoreIncidentRecorder::new(
        store.clone(),
        config.alerts.incident_capacity,
    ));
    DeceptionService::new(
        Arc::new(config),
        store,
        Arc::new(RecordingDispatcher::default()),
        incidents,
    )
}
