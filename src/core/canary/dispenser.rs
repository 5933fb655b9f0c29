//! Canary Dispenser: mints tracking tokens and serves decoy documents.
use std::time::Duration;

use axum::{
    body::Body,
    http::{StatusCode, header},
    response::Response,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{
    documents::find_canary_document,
    html::{CanaryHtmlOptions, render_canary_html},
};
use crate::{
    config::SecuritySettings,
    core::{classifier::RequestSurface, deception::DeceptionService, threat_score::ThreatReason},
    ports::{
        incident_recorder::Incident,
        kv_store::{KvStore, StoreError, StoreResult},
    },
};

const TOKEN_PREFIX: &str = "canary:token:";
const TOKEN_BYTES: usize = 16;

/// Who is being handed a decoy
#[derive(Debug, Clone, Copy)]
pub struct CanaryRequest<'a> {
    pub document_path: &'a str,
    pub hashed_ip: &'a str,
    pub user_agent: &'a str,
}

/// Persisted record behind a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanaryToken {
    pub token: String,
    pub document_path: String,
    pub hashed_ip: String,
    pub user_agent: String,
    pub issued_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

pub fn token_key(token: &str) -> String {
    format!("{TOKEN_PREFIX}{token}")
}

/// 32 lowercase hex characters from the thread-local CSPRNG.
pub fn new_token_value() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Mint a token and persist its record with `ttl`.
pub async fn generate_canary_token(
    store: &dyn KvStore,
    request: &CanaryRequest<'_>,
    ttl: Duration,
) -> StoreResult<CanaryToken> {
    let record = CanaryToken {
        token: new_token_value(),
        document_path: request.document_path.to_string(),
        hashed_ip: request.hashed_ip.to_string(),
        user_agent: request.user_agent.to_string(),
        issued_at: Utc::now(),
        ttl_secs: ttl.as_secs(),
    };

    let json = serde_json::to_string(&record)?;
    store.set(&token_key(&record.token), &json, Some(ttl)).await?;
    Ok(record)
}

/// Fetch a live token record.
pub async fn lookup_canary_token(store: &dyn KvStore, token: &str) -> StoreResult<Option<CanaryToken>> {
    let key = token_key(token);
    let Some(raw) = store.get(&key).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            key,
            message: e.to_string(),
        })
}

/// Serve a decoy if the feature is on and `surface.path` names one.
///
/// Returns `None` without side effects otherwise, and also when the token
/// cannot be persisted, so the request falls through to normal handling.
pub async fn serve_canary_document(
    service: &DeceptionService,
    surface: &RequestSurface,
    settings: &SecuritySettings,
    hashed_ip: &str,
) -> Option<Response> {
    if !settings.canary_documents_enabled {
        return None;
    }
    let spec = find_canary_document(&surface.path)?;

    let canary_cfg = &service.config().canary;
    let request = CanaryRequest {
        document_path: spec.path,
        hashed_ip,
        user_agent: surface.user_agent(),
    };
    let ttl = Duration::from_secs(canary_cfg.token_ttl_secs);

    let token = match generate_canary_token(service.store(), &request, ttl).await {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!(
                hashed_ip = %hashed_ip,
                path = spec.path,
                error = %e,
                "Failed to mint canary token, serving nothing"
            );
            return None;
        }
    };

    let options = CanaryHtmlOptions {
        callback_path: &canary_cfg.callback_path,
        stun_server: &canary_cfg.stun_server,
        phone_home: settings.canary_phone_home_on_open,
        collect_fingerprint: settings.canary_collect_fingerprint,
    };
    let html = render_canary_html(&token.token, spec.description, &options);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, spec.content_type)
        .header(header::CACHE_CONTROL, "no-store")
        .header("x-robots-tag", "noindex, nofollow")
        .body(Body::from(html));
    let response = match response {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build canary response");
            return None;
        }
    };

    tracing::warn!(
        hashed_ip = %hashed_ip,
        path = spec.path,
        token = %token.token,
        "Canary document served"
    );

    service.mark_honeytoken(hashed_ip).await;
    service.flag(hashed_ip).await;
    service
        .record_threat(hashed_ip, ThreatReason::HoneytokenAccess)
        .await;
    service
        .record_incident(
            hashed_ip,
            Incident::new("canary_served", spec.description, spec.path),
        )
        .await;

    Some(response)
}
