//! Log Poisoner.
//!
//! Error responses sent to flagged identities carry fabricated infrastructure
//! detail: internal routes, hostnames and credentials that lead nowhere. Only
//! identities already in the flagged set ever see it.
use axum::{
    Json,
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use rand::{Rng, seq::IndexedRandom};
use serde_json::{Value, json};

use crate::{
    config::SecuritySettings,
    core::{deception::DeceptionService, threat_score},
    ports::{incident_recorder::Incident, kv_store::KvStore},
};

const DEBUG_ROUTES: &[&str] = &[
    "/internal/admin/v2/debug/dump",
    "/_internal/ops/flush-cache",
    "/internal/api/v1/users/export?format=csv",
    "/admin-legacy/console/exec",
];

const SERVERS: &[&str] = &[
    "app-prod-07.us-east-1.internal",
    "api-worker-12.eu-west-2.internal",
    "web-node-03.prod.internal",
];

const DB_HOSTS: &[&str] = &[
    "pg-primary.prod.internal:5432",
    "mysql-master-01.db.internal:3306",
    "aurora-cluster-rw.internal:5432",
];

const REDIS_HOSTS: &[&str] = &[
    "redis://cache-01.prod.internal:6379/0",
    "redis://:Xq2v9LrT@sessions.redis.internal:6380/2",
    "rediss://queue-redis.internal:6379/5",
];

const INTERNAL_ROUTES: &[&str] = &[
    "/internal/health/deep",
    "/internal/admin/users",
    "/internal/billing/reconcile",
    "/internal/config/reload",
    "/internal/debug/pprof",
    "/_ops/feature-flags",
    "/_ops/secrets/rotate",
];

const ORIGINS: &[&str] = &[
    "10.0.14.22",
    "10.0.3.117",
    "172.16.8.41",
];

const KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn pick(pool: &'static [&'static str]) -> &'static str {
    pool.choose(&mut rand::rng()).copied().unwrap_or_default()
}

fn random_secret(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| KEY_ALPHABET[rng.random_range(0..KEY_ALPHABET.len())] as char)
        .collect()
}

/// What to include in a poisoned error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoisonOptions {
    /// List fabricated internal routes
    pub fake_paths: bool,
    /// Embed terminal control sequences aimed at whoever tails the logs
    pub terminal_escape: bool,
}

impl Default for PoisonOptions {
    fn default() -> Self {
        Self {
            fake_paths: true,
            terminal_escape: false,
        }
    }
}

impl PoisonOptions {
    pub fn from_settings(settings: &SecuritySettings) -> Self {
        Self {
            fake_paths: settings.log_poison_fake_paths,
            terminal_escape: settings.log_poison_terminal_escape,
        }
    }
}

/// True only when poisoning is enabled and `hashed_ip` is flagged.
/// Store failures read as "not flagged".
pub async fn should_poison_logs(
    store: &dyn KvStore,
    settings: &SecuritySettings,
    hashed_ip: &str,
) -> bool {
    if !settings.log_poisoning_enabled {
        return false;
    }
    match threat_score::is_flagged(store, hashed_ip).await {
        Ok(flagged) => flagged,
        Err(e) => {
            tracing::warn!(hashed_ip = %hashed_ip, error = %e, "Flag lookup failed");
            false
        }
    }
}

/// Add fabricated routing and credential headers.
pub fn inject_log_poison_headers(headers: &mut HeaderMap) {
    headers.insert("x-debug-route", HeaderValue::from_static(pick(DEBUG_ROUTES)));
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer eyJhbGciOiJIUzI1NiJ9.{}", random_secret(48))) {
        headers.insert("x-trace-auth", value);
    }
    headers.insert("x-upstream-host", HeaderValue::from_static(pick(SERVERS)));
    headers.insert("x-request-origin", HeaderValue::from_static(pick(ORIGINS)));
    if let Ok(value) = HeaderValue::from_str(&format!("sk_prod_{}", random_secret(24))) {
        headers.insert("x-internal-api-key", value);
    }
}

/// Poisoned body with every option enabled except terminal escapes.
pub fn generate_poisoned_error_body() -> Value {
    generate_poisoned_error_body_with(PoisonOptions::default())
}

pub fn generate_poisoned_error_body_with(options: PoisonOptions) -> Value {
    let server = if options.terminal_escape {
        // Clears the screen and retitles the terminal of anyone viewing raw logs
        format!("\u{1b}[2J\u{1b}[H\u{1b}]0;{}\u{7}{}", pick(SERVERS), pick(SERVERS))
    } else {
        pick(SERVERS).to_string()
    };

    let routes: Vec<&str> = if options.fake_paths {
        let mut rng = rand::rng();
        let count = rng.random_range(3..=5);
        INTERNAL_ROUTES
            .choose_multiple(&mut rng, count)
            .copied()
            .collect()
    } else {
        Vec::new()
    };

    json!({
        "error": "Internal Server Error",
        "debug": {
            "server": server,
            "db_host": pick(DB_HOSTS),
            "redis": pick(REDIS_HOSTS),
            "api_key": format!("sk_prod_{}", random_secret(32)),
        },
        "internal_routes": routes,
    })
}

/// Rewrite an error response for a flagged identity; pass anything else through.
/// The status code is kept.
pub async fn poison_error_response(
    service: &DeceptionService,
    settings: &SecuritySettings,
    hashed_ip: &str,
    path: &str,
    response: Response,
) -> Response {
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }
    if !should_poison_logs(service.store(), settings, hashed_ip).await {
        return response;
    }

    let body = generate_poisoned_error_body_with(PoisonOptions::from_settings(settings));
    let mut poisoned = (status, Json(body)).into_response();
    if settings.log_poison_fake_headers {
        inject_log_poison_headers(poisoned.headers_mut());
    }

    service
        .record_incident(hashed_ip, Incident::new("log_poison", status.as_str(), path))
        .await;

    poisoned
}
