//! Core deception orchestration service.
//!
//! `DeceptionService` aggregates immutable configuration (`ServerConfig`) with the
//! ports every countermeasure talks to: the key-value store, the alert
//! dispatcher and the incident recorder. It also owns the per-client rate
//! limiter. The countermeasure modules stay free functions over these parts;
//! this type supplies them and centralises the "log and carry on" handling of
//! store and delivery failures.
use std::{sync::Arc, time::Duration};

use crate::{
    config::{SecuritySettings, ServerConfig},
    core::{
        rate_limiter::ClientRateLimiter,
        settings,
        threat_score::{self, ThreatLevel, ThreatReason, ThreatScore},
    },
    ports::{
        alert_dispatcher::{AlertDispatcher, AlertKind, AlertSeverity, SecurityAlert},
        incident_recorder::{Incident, IncidentRecorder},
        kv_store::KvStore,
    },
};

/// Shared state for the request pipeline. Cheap to clone (Arc inside).
#[derive(Clone)]
pub struct DeceptionService {
    config: Arc<ServerConfig>,
    store: Arc<dyn KvStore>,
    alerts: Arc<dyn AlertDispatcher>,
    incidents: Arc<dyn IncidentRecorder>,
    rate_limiter: Option<ClientRateLimiter>,
}

impl DeceptionService {
    /// Wire the service. An invalid rate limit definition is logged and skipped.
    pub fn new(
        config: Arc<ServerConfig>,
        store: Arc<dyn KvStore>,
        alerts: Arc<dyn AlertDispatcher>,
        incidents: Arc<dyn IncidentRecorder>,
    ) -> Self {
        let rate_limiter = config.rate_limit.as_ref().and_then(|rate_cfg| {
            ClientRateLimiter::new(rate_cfg)
                .map_err(|e| tracing::error!("Failed to create rate limiter: {}", e))
                .ok()
        });

        Self {
            config,
            store,
            alerts,
            incidents,
            rate_limiter,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    pub fn rate_limiter(&self) -> Option<&ClientRateLimiter> {
        self.rate_limiter.as_ref()
    }

    /// Fresh settings for one request.
    pub async fn load_settings(&self) -> SecuritySettings {
        settings::load_settings(self.store()).await
    }

    fn flag_ttl(&self) -> Duration {
        Duration::from_secs(self.config.threat.flag_ttl_secs)
    }

    /// Add points to an identity. Crossing into `Critical` raises an alert.
    /// Store failures are logged and swallowed.
    pub async fn record_threat(&self, hashed_ip: &str, reason: ThreatReason) -> Option<ThreatScore> {
        let score = match threat_score::increment_threat_score(self.store(), hashed_ip, reason).await
        {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!(
                    hashed_ip = %hashed_ip,
                    reason = reason.as_str(),
                    error = %e,
                    "Failed to update threat score"
                );
                return None;
            }
        };

        tracing::info!(
            hashed_ip = %hashed_ip,
            reason = reason.as_str(),
            score = score.score,
            level = score.level.as_str(),
            "Threat score updated"
        );

        if score.level == ThreatLevel::Critical && score.escalated_by(reason) {
            let alert = SecurityAlert::new(
                AlertSeverity::Critical,
                AlertKind::ThreatLevelRaised {
                    score: score.score,
                    level: score.level.as_str().to_string(),
                },
                hashed_ip,
                format!(
                    "Threat level CRITICAL after {} (score {})",
                    reason.as_str(),
                    score.score
                ),
            );
            self.dispatch_alert(&alert).await;
        }

        Some(score)
    }

    /// Mark an identity for log poisoning.
    pub async fn flag(&self, hashed_ip: &str) {
        if let Err(e) = threat_score::flag_ip(self.store(), hashed_ip, self.flag_ttl()).await {
            tracing::warn!(hashed_ip = %hashed_ip, error = %e, "Failed to flag identity");
        }
    }

    /// Remember that an identity opened a decoy.
    pub async fn mark_honeytoken(&self, hashed_ip: &str) {
        let ttl = Duration::from_secs(self.config.threat.honeytoken_mark_ttl_secs);
        if let Err(e) = threat_score::mark_honeytoken_access(self.store(), hashed_ip, ttl).await {
            tracing::warn!(hashed_ip = %hashed_ip, error = %e, "Failed to mark honeytoken access");
        }
    }

    /// Whether an identity has opened a decoy. Store failures read as `false`.
    pub async fn touched_honeytoken(&self, hashed_ip: &str) -> bool {
        threat_score::has_honeytoken_access(self.store(), hashed_ip)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(hashed_ip = %hashed_ip, error = %e, "Honeytoken lookup failed");
                false
            })
    }

    pub async fn record_incident(&self, hashed_ip: &str, incident: Incident) {
        tracing::warn!(
            hashed_ip = %hashed_ip,
            action = %incident.action,
            detail = %incident.detail,
            path = %incident.path,
            "Security incident"
        );
        if let Err(e) = self.incidents.record_incident(hashed_ip, incident).await {
            tracing::warn!(hashed_ip = %hashed_ip, error = %e, "Failed to record incident");
        }
    }

    pub async fn dispatch_alert(&self, alert: &SecurityAlert) {
        if let Err(e) = self.alerts.send_security_alert(alert).await {
            tracing::error!(alert_id = %alert.id, error = %e, "Failed to dispatch security alert");
        }
    }
}
