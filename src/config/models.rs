//! Configuration data structures for Backfire.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They are
//! serde‑friendly and include defaults so that minimal configs remain concise.
//!
//! Two kinds of configuration live here:
//! * [`ServerConfig`]: process-level settings read once at startup (listen address,
//!   identity salt, TTLs, alert sinks, rate limit).
//! * [`SecuritySettings`]: the per-request feature gate. It is persisted in the
//!   key-value store and edited by an external admin surface; the file only seeds it.
use serde::{Deserialize, Serialize};

/// Feature flags controlling every countermeasure independently.
///
/// Stored as camelCase JSON; snake_case keys are accepted so config files stay
/// readable. Every flag defaults to `false`, so a missing or unreadable settings
/// record disables all deception.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct SecuritySettings {
    #[serde(alias = "sql_backfire_enabled")]
    pub sql_backfire_enabled: bool,
    #[serde(alias = "sql_backfire_on_scanner_detection")]
    pub sql_backfire_on_scanner_detection: bool,
    #[serde(alias = "sql_backfire_on_honeytoken_access")]
    pub sql_backfire_on_honeytoken_access: bool,
    #[serde(alias = "canary_documents_enabled")]
    pub canary_documents_enabled: bool,
    #[serde(alias = "canary_phone_home_on_open")]
    pub canary_phone_home_on_open: bool,
    #[serde(alias = "canary_collect_fingerprint")]
    pub canary_collect_fingerprint: bool,
    #[serde(alias = "canary_alert_on_callback")]
    pub canary_alert_on_callback: bool,
    #[serde(alias = "log_poisoning_enabled")]
    pub log_poisoning_enabled: bool,
    #[serde(alias = "log_poison_fake_headers")]
    pub log_poison_fake_headers: bool,
    #[serde(alias = "log_poison_terminal_escape")]
    pub log_poison_terminal_escape: bool,
    #[serde(alias = "log_poison_fake_paths")]
    pub log_poison_fake_paths: bool,
}

impl SecuritySettings {
    /// Every countermeasure switched on.
    pub fn all_enabled() -> Self {
        Self {
            sql_backfire_enabled: true,
            sql_backfire_on_scanner_detection: true,
            sql_backfire_on_honeytoken_access: true,
            canary_documents_enabled: true,
            canary_phone_home_on_open: true,
            canary_collect_fingerprint: true,
            canary_alert_on_callback: true,
            log_poisoning_enabled: true,
            log_poison_fake_headers: true,
            log_poison_terminal_escape: true,
            log_poison_fake_paths: true,
        }
    }
}

/// How client identities are derived from requests.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct IdentityConfig {
    /// Salt mixed into the one-way IP hash
    pub ip_hash_salt: String,
    /// Trust `X-Forwarded-For` / `X-Real-IP` set by a fronting proxy
    pub trust_forwarded_headers: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            ip_hash_salt: "backfire-default-salt".to_string(),
            trust_forwarded_headers: false,
        }
    }
}

/// Canary document and callback configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CanaryConfig {
    /// How long a minted token stays valid (seconds)
    pub token_ttl_secs: u64,
    /// Path of the phone-home endpoint embedded in decoys
    pub callback_path: String,
    /// STUN server used by the decoy's WebRTC probe
    pub stun_server: String,
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: 30 * 24 * 60 * 60,
            callback_path: "/api/canary-callback".to_string(),
            stun_server: "stun:stun.l.google.com:19302".to_string(),
        }
    }
}

/// Alert log and dispatch configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AlertConfig {
    /// Maximum entries kept in the canary alert log
    pub log_capacity: usize,
    /// Maximum entries kept in the incident log
    pub incident_capacity: usize,
    /// Optional webhook receiving JSON security alerts
    pub webhook_url: Option<String>,
    /// Webhook request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            log_capacity: 500,
            incident_capacity: 1000,
            webhook_url: None,
            timeout_secs: 5,
        }
    }
}

/// Threat ledger configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ThreatConfig {
    /// How long an identity stays flagged for log poisoning (seconds)
    pub flag_ttl_secs: u64,
    /// How long an identity stays marked as having touched a honeytoken (seconds)
    pub honeytoken_mark_ttl_secs: u64,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            flag_ttl_secs: 7 * 24 * 60 * 60,
            honeytoken_mark_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

fn default_status_code() -> u16 {
    429
}

fn default_message() -> String {
    "Too Many Requests".to_string()
}

/// Per-IP rate limit applied before any classification.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub requests: u64,
    pub period: String, // Parsed by humantime, e.g., "1s", "5m", "1h"
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default = "default_message")]
    pub message: String,
}

fn default_body_limit() -> usize {
    64 * 1024
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Upstream application receiving non-deceptive traffic
    #[serde(default)]
    pub upstream: Option<String>,
    #[serde(default)]
    pub upstream_timeout_secs: Option<u64>,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub canary: CanaryConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub threat: ThreatConfig,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    /// Settings written to the store at startup when none are present
    #[serde(default)]
    pub security: Option<SecuritySettings>,
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            upstream: None,
            upstream_timeout_secs: None,
            body_limit_bytes: default_body_limit(),
            identity: IdentityConfig::default(),
            canary: CanaryConfig::default(),
            alerts: AlertConfig::default(),
            threat: ThreatConfig::default(),
            rate_limit: None,
            security: None,
        }
    }
}

/// Builder for ServerConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct ServerConfigBuilder {
    listen_addr: Option<String>,
    upstream: Option<String>,
    identity: Option<IdentityConfig>,
    canary: Option<CanaryConfig>,
    alerts: Option<AlertConfig>,
    threat: Option<ThreatConfig>,
    rate_limit: Option<RateLimitConfig>,
    security: Option<SecuritySettings>,
}

impl ServerConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Forward non-deceptive traffic to this upstream
    pub fn upstream(mut self, url: impl Into<String>) -> Self {
        self.upstream = Some(url.into());
        self
    }

    pub fn identity(mut self, config: IdentityConfig) -> Self {
        self.identity = Some(config);
        self
    }

    pub fn canary(mut self, config: CanaryConfig) -> Self {
        self.canary = Some(config);
        self
    }

    pub fn alerts(mut self, config: AlertConfig) -> Self {
        self.alerts = Some(config);
        self
    }

    pub fn threat(mut self, config: ThreatConfig) -> Self {
        self.threat = Some(config);
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Seed settings written to the store at startup
    pub fn security(mut self, settings: SecuritySettings) -> Self {
        self.security = Some(settings);
        self
    }

    /// Build the final ServerConfig
    pub fn build(self) -> Result<ServerConfig, String> {
        let listen_addr = self
            .listen_addr
            .ok_or_else(|| "listen_addr is required".to_string())?;

        Ok(ServerConfig {
            listen_addr,
            upstream: self.upstream,
            upstream_timeout_secs: None,
            body_limit_bytes: default_body_limit(),
            identity: self.identity.unwrap_or_default(),
            canary: self.canary.unwrap_or_default(),
            alerts: self.alerts.unwrap_or_default(),
            threat: self.threat.unwrap_or_default(),
            rate_limit: self.rate_limit,
            security: self.security,
        })
    }
}
