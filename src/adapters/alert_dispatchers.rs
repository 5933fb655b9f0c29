//! Alert sinks.
//!
//! * [`LogAlertDispatcher`] writes alerts to the tracing pipeline only.
//! * [`WebhookAlertDispatcher`] POSTs the alert as JSON (Slack-shaped for Slack
//!   incoming webhooks) and also logs it.
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Result, WrapErr};

use crate::ports::alert_dispatcher::{AlertDispatcher, AlertError, AlertSeverity, SecurityAlert};

fn log_alert(alert: &SecurityAlert) {
    match alert.severity {
        AlertSeverity::Critical => tracing::error!(
            alert_id = %alert.id,
            hashed_ip = %alert.hashed_ip,
            kind = ?alert.kind,
            "SECURITY ALERT: {}",
            alert.summary
        ),
        AlertSeverity::Warning => tracing::warn!(
            alert_id = %alert.id,
            hashed_ip = %alert.hashed_ip,
            kind = ?alert.kind,
            "Security alert: {}",
            alert.summary
        ),
        AlertSeverity::Info => tracing::info!(
            alert_id = %alert.id,
            hashed_ip = %alert.hashed_ip,
            kind = ?alert.kind,
            "Security alert: {}",
            alert.summary
        ),
    }
}

/// Dispatcher that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertDispatcher;

#[async_trait]
impl AlertDispatcher for LogAlertDispatcher {
    async fn send_security_alert(&self, alert: &SecurityAlert) -> Result<(), AlertError> {
        log_alert(alert);
        Ok(())
    }
}

/// Dispatcher delivering JSON alerts to a webhook with a bounded timeout
pub struct WebhookAlertDispatcher {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertDispatcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("backfire/", env!("CARGO_PKG_VERSION")))
            .build()
            .wrap_err("Failed to build webhook HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    fn payload(&self, alert: &SecurityAlert) -> Result<serde_json::Value, AlertError> {
        if self.url.contains("hooks.slack.com") {
            let marker = match alert.severity {
                AlertSeverity::Critical => ":rotating_light:",
                AlertSeverity::Warning => ":warning:",
                AlertSeverity::Info => ":information_source:",
            };
            return Ok(serde_json::json!({
                "text": format!("{} *[{:?}]* {}\nidentity: `{}`", marker, alert.severity, alert.summary, alert.hashed_ip),
                "unfurl_links": false
            }));
        }

        serde_json::to_value(alert).map_err(|e| AlertError::Delivery(e.to_string()))
    }
}

#[async_trait]
impl AlertDispatcher for WebhookAlertDispatcher {
    async fn send_security_alert(&self, alert: &SecurityAlert) -> Result<(), AlertError> {
        log_alert(alert);

        let body = self.payload(alert)?;
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AlertError::Delivery(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AlertError::Rejected(resp.status().as_u16()));
        }

        tracing::debug!(alert_id = %alert.id, "Webhook alert delivered");
        Ok(())
    }
}
