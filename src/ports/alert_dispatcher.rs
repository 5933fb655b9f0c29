use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for alert delivery
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AlertError {
    /// Delivery to the sink failed
    #[error("Alert delivery failed: {0}")]
    Delivery(String),

    /// The sink rejected the alert
    #[error("Alert sink returned status {0}")]
    Rejected(u16),
}

/// Severity attached to an outbound alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// What triggered an alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertKind {
    /// A decoy document phoned home
    CanaryCallback {
        token: String,
        document_path: String,
        event: String,
    },
    /// An identity's threat score crossed into a new level
    ThreatLevelRaised { score: i64, level: String },
}

/// Payload handed to an [`AlertDispatcher`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: String,
    pub severity: AlertSeverity,
    #[serde(flatten)]
    pub kind: AlertKind,
    pub hashed_ip: String,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl SecurityAlert {
    pub fn new(
        severity: AlertSeverity,
        kind: AlertKind,
        hashed_ip: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            severity,
            kind,
            hashed_ip: hashed_ip.into(),
            summary: summary.into(),
            timestamp: Utc::now(),
        }
    }
}

/// AlertDispatcher defines the port for notifying operators about security events
#[async_trait]
pub trait AlertDispatcher: Send + Sync + 'static {
    /// Deliver one alert. Callers log and swallow failures.
    async fn send_security_alert(&self, alert: &SecurityAlert) -> Result<(), AlertError>;
}
