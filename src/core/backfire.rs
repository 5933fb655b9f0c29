//! Response Poisoner (SQL backfire).
//!
//! Hostile requests get a convincing fake database failure instead of the real
//! response: a `500` whose headers and body leak fabricated destructive SQL,
//! table names and engine details. Content is drawn from template pools at
//! request time so repeated probes never see the same strings twice in a row;
//! the shape of the body never changes.
use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use rand::{Rng, seq::IndexedRandom};
use serde_json::{Value, json};

use crate::{
    config::SecuritySettings,
    core::{
        classifier::{Classification, HostileSignal, RequestSurface, classify},
        deception::DeceptionService,
        threat_score::ThreatReason,
    },
    ports::incident_recorder::Incident,
};

const DB_STATUS: &[&str] = &[
    "ERROR: cascade failed during DROP TABLE users; transaction rolled back",
    "FATAL: DROP TABLE sessions blocked by pending lock (pid 48213)",
    "WARN: replica lag 4.2s after DROP TABLE audit_log",
    "ERROR 1051: Unknown table 'payments' (DROP TABLE payments_archive partially applied)",
];

const SQL_VERSION: &[&str] = &[
    "PostgreSQL 14.9 on x86_64-pc-linux-gnu; last: UPDATE users SET role='admin' WHERE id=1",
    "MySQL 8.0.34-log; pending: DELETE FROM api_keys WHERE revoked=0",
    "PostgreSQL 15.4; last: UPDATE accounts SET balance=0 WHERE 1=1",
    "MariaDB 10.11.5; recovered: DROP TABLE IF EXISTS tmp_credentials",
];

const BACKEND_DB: &[&str] = &[
    "pg-primary-02.internal:5432/prod_main (DELETE FROM sessions)",
    "mysql-rw.db.internal:3306/core (UPDATE user_tokens SET expires_at=NULL)",
    "db-shard-7.prod.internal:5432/billing (DROP TABLE invoices_tmp)",
];

const DEBUG_QUERY: &[&str] = &[
    "DELETE FROM users WHERE email LIKE '%' RETURNING password_hash",
    "UPDATE admin_users SET password_hash='$2b$12$Qm9vbXNoYWthbGFrYQ' WHERE id=1",
    "DROP TABLE IF EXISTS migrations_lock; SELECT * FROM secrets",
    "SELECT id, email, password_hash FROM users WHERE id = $1; DELETE FROM audit_log",
];

const MESSAGES: &[&str] = &[
    "SQLSTATE[42P01]: Undefined table: relation \"users_backup\" does not exist",
    "SQLSTATE[40P01]: Deadlock detected while executing batched statement",
    "SQLSTATE[42000]: Syntax error or access violation near ''' at line 1",
    "SQLSTATE[25P02]: In failed sql transaction: current transaction is aborted",
    "SQLSTATE[HY000]: General error: 2006 MySQL server has gone away",
];

const DETAILS: &[&str] = &[
    "Query failed after partial execution; 3 statements committed before rollback.",
    "Connection pool exhausted (max=50) while replaying write-ahead log.",
    "Statement timeout exceeded (30000 ms) in trigger fn_audit_users().",
    "Constraint fk_sessions_user_id violated by cascading delete.",
];

const TABLES: &[&str] = &[
    "users",
    "admin_users",
    "sessions",
    "api_keys",
    "payments",
    "audit_log",
    "password_resets",
    "oauth_tokens",
    "customer_pii",
    "invoices",
];

const ENGINES: &[&str] = &[
    "PostgreSQL 14.9",
    "PostgreSQL 15.4",
    "MySQL 8.0.34",
    "MariaDB 10.11.5",
];

const QUERIES: &[&str] = &[
    "SELECT * FROM users WHERE username = '%s' AND password_hash = '%s'",
    "SELECT u.id, u.email, k.secret FROM users u JOIN api_keys k ON k.user_id = u.id WHERE u.id = %d",
    "UPDATE sessions SET last_seen = NOW() WHERE token = '%s'",
    "SELECT card_last4, billing_zip FROM payments WHERE customer_id = %d ORDER BY created_at DESC",
];

fn pick(pool: &'static [&'static str]) -> &'static str {
    pool.choose(&mut rand::rng()).copied().unwrap_or_default()
}

/// Set the four poisoned database headers.
pub fn set_backfire_headers(headers: &mut HeaderMap) {
    headers.insert("x-db-status", HeaderValue::from_static(pick(DB_STATUS)));
    headers.insert("x-sql-version", HeaderValue::from_static(pick(SQL_VERSION)));
    headers.insert("x-backend-db", HeaderValue::from_static(pick(BACKEND_DB)));
    headers.insert("x-debug-query", HeaderValue::from_static(pick(DEBUG_QUERY)));
}

/// A fake database error body with a fixed schema and varying content.
pub fn generate_backfire_body() -> Value {
    let mut rng = rand::rng();
    let table_count = rng.random_range(3..=5);
    let tables: Vec<&str> = TABLES
        .choose_multiple(&mut rng, table_count)
        .copied()
        .collect();

    json!({
        "error": "Database error",
        "message": pick(MESSAGES),
        "details": pick(DETAILS),
        "debug": {
            "tables": tables,
            "query": pick(QUERIES),
            "engine": pick(ENGINES),
            "trace_id": uuid::Uuid::new_v4().to_string(),
        }
    })
}

fn backfire_response() -> Response {
    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(generate_backfire_body()),
    )
        .into_response();
    set_backfire_headers(response.headers_mut());
    response
}

/// Answer a hostile request with a backfire response.
///
/// `None`, with no side effects, when backfire is disabled or the request is
/// benign. A scanner User-Agent alone is sufficient. The triggering
/// [`HostileSignal`] rides along in the response extensions.
pub fn handle_sql_injection_backfire(
    surface: &RequestSurface,
    settings: &SecuritySettings,
) -> Option<Response> {
    if !settings.sql_backfire_enabled {
        return None;
    }
    let Classification::Hostile(signal) = classify(surface) else {
        return None;
    };
    let mut response = backfire_response();
    response.extensions_mut().insert(signal);
    Some(response)
}

/// Full backfire policy for one request, including ledger and incident updates.
///
/// Nothing happens unless `sql_backfire_enabled` is on. Besides classified
/// attacks, identities that already opened a decoy receive backfire on any
/// `/api/` request when `sql_backfire_on_honeytoken_access` is on.
pub async fn apply_backfire(
    service: &DeceptionService,
    surface: &RequestSurface,
    settings: &SecuritySettings,
    hashed_ip: &str,
) -> Option<Response> {
    if !settings.sql_backfire_enabled {
        return None;
    }

    if let Some(response) = handle_sql_injection_backfire(surface, settings) {
        let signal = response
            .extensions()
            .get::<HostileSignal>()
            .copied()
            .unwrap_or(HostileSignal::SqlPayload);
        let reason = match signal {
            HostileSignal::SqlPayload => ThreatReason::SqlInjectionAttempt,
            HostileSignal::ScannerUserAgent(_) => ThreatReason::ScannerUserAgent,
        };
        let detail = match signal {
            HostileSignal::ScannerUserAgent(tool) => format!("{}:{tool}", signal.as_str()),
            HostileSignal::SqlPayload => signal.as_str().to_string(),
        };

        tracing::warn!(
            hashed_ip = %hashed_ip,
            threat_type = signal.as_str(),
            path = %surface.path,
            "Hostile request, answering with SQL backfire"
        );

        service.record_threat(hashed_ip, reason).await;
        if matches!(signal, HostileSignal::ScannerUserAgent(_))
            && settings.sql_backfire_on_scanner_detection
        {
            service.flag(hashed_ip).await;
        }
        service
            .record_incident(
                hashed_ip,
                Incident::new("sql_backfire", detail, surface.path.as_str()),
            )
            .await;

        return Some(response);
    }

    if settings.sql_backfire_on_honeytoken_access
        && surface.path.starts_with("/api/")
        && service.touched_honeytoken(hashed_ip).await
    {
        tracing::warn!(
            hashed_ip = %hashed_ip,
            path = %surface.path,
            "Honeytoken holder on API, answering with SQL backfire"
        );
        service
            .record_incident(
                hashed_ip,
                Incident::new("honeytoken_backfire", "HONEYTOKEN_ACCESS", surface.path.as_str()),
            )
            .await;
        return Some(backfire_response());
    }

    None
}
