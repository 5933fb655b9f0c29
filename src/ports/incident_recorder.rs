use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ports::kv_store::StoreResult;

/// One countermeasure firing against one identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Incident {
    /// Short machine-readable tag, e.g. `sql_backfire`
    pub action: String,
    /// Free-form detail (signal name, decoy path, ...)
    pub detail: String,
    pub path: String,
    pub timestamp: DateTime<Utc>,
}

impl Incident {
    pub fn new(
        action: impl Into<String>,
        detail: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            detail: detail.into(),
            path: path.into(),
            timestamp: Utc::now(),
        }
    }
}

/// IncidentRecorder defines the port for the security incident trail
#[async_trait]
pub trait IncidentRecorder: Send + Sync + 'static {
    /// Record an incident for a hashed identity
    async fn record_incident(&self, hashed_ip: &str, incident: Incident) -> StoreResult<()>;
}
