//! Canary Callback Receiver.
//!
//! Decoys phone home to `GET|POST <callback>?t=<token>&e=img|js`. Anything that
//! does not carry a well-formed token for a live record is answered with a bare
//! `404`, identical to any other unknown path.
use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dispenser::lookup_canary_token;
use crate::{
    config::SecuritySettings,
    core::{
        classifier::RequestSurface, deception::DeceptionService, not_found,
        threat_score::ThreatReason,
    },
    ports::{
        alert_dispatcher::{AlertKind, AlertSeverity, SecurityAlert},
        incident_recorder::Incident,
        kv_store::{KvStore, StoreResult},
    },
};

/// Store key of the bounded canary alert log
pub const ALERT_LOG_KEY: &str = "canary:alerts";

const TOKEN_LEN: usize = 32;
const MAX_FINGERPRINT_IPS: usize = 16;
const MAX_FINGERPRINT_FIELD: usize = 128;

/// 1x1 fully transparent PNG
const TRANSPARENT_PNG_B64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

pub static TRANSPARENT_PNG: Lazy<Vec<u8>> =
    Lazy::new(|| STANDARD.decode(TRANSPARENT_PNG_B64).unwrap_or_default());

/// Which beacon fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanaryEvent {
    /// The `<img>` beacon, fires without scripting
    Img,
    /// The fingerprinting script
    Js,
}

impl CanaryEvent {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "img" => Some(CanaryEvent::Img),
            "js" => Some(CanaryEvent::Js),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CanaryEvent::Img => "img",
            CanaryEvent::Js => "js",
        }
    }
}

/// Browser attributes reported by the decoy script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub tz: Option<String>,
    pub plat: Option<String>,
    pub sw: Option<u64>,
    pub sh: Option<u64>,
    pub hc: Option<u64>,
    #[serde(default)]
    pub ips: Vec<String>,
}

fn bounded_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(|s| s.chars().take(MAX_FINGERPRINT_FIELD).collect())
}

impl Fingerprint {
    /// Lenient extraction; wrong-typed fields are dropped, not rejected.
    pub fn from_value(value: &Value) -> Option<Self> {
        let fields = value.as_object()?;
        let field = |name: &str| fields.get(name).unwrap_or(&Value::Null);

        let ips = field("ips")
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(bounded_str)
                    .take(MAX_FINGERPRINT_IPS)
                    .collect()
            })
            .unwrap_or_default();

        let fingerprint = Self {
            tz: bounded_str(field("tz")),
            plat: bounded_str(field("plat")),
            sw: field("sw").as_u64(),
            sh: field("sh").as_u64(),
            hc: field("hc").as_u64(),
            ips,
        };

        (fingerprint != Self::default()).then_some(fingerprint)
    }
}

/// One beacon hit, appended to [`ALERT_LOG_KEY`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanaryAlert {
    pub token: String,
    pub event_type: CanaryEvent,
    /// Identity the decoy was served to
    pub hashed_ip: String,
    /// Identity the beacon arrived from (may differ behind a VPN switch)
    pub callback_hashed_ip: String,
    pub document_path: String,
    pub fingerprint: Option<Fingerprint>,
    pub timestamp: DateTime<Utc>,
}

/// Exactly 32 ASCII hex digits.
pub fn is_valid_token(token: &str) -> bool {
    token.len() == TOKEN_LEN && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Newest-first slice of the alert log. Unreadable entries are skipped.
pub async fn recent_canary_alerts(store: &dyn KvStore, limit: usize) -> StoreResult<Vec<CanaryAlert>> {
    let raw = store.list(ALERT_LOG_KEY, limit).await?;
    Ok(raw
        .iter()
        .filter_map(|entry| serde_json::from_str(entry).ok())
        .collect())
}

fn event_response(event: CanaryEvent) -> Response {
    match event {
        CanaryEvent::Img => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "image/png")
            .header(header::CACHE_CONTROL, "no-store, no-cache, must-revalidate")
            .body(Body::from(TRANSPARENT_PNG.clone()))
            .unwrap_or_else(|_| not_found()),
        CanaryEvent::Js => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Process one beacon. Never fails: every problem ends in a plain `404`.
pub async fn handle_canary_callback(
    service: &DeceptionService,
    surface: &RequestSurface,
    settings: &SecuritySettings,
    callback_hashed_ip: &str,
) -> Response {
    let Some(raw_token) = surface.query_param("t").filter(|t| is_valid_token(t)) else {
        return not_found();
    };
    let Some(event) = surface.query_param("e").and_then(CanaryEvent::parse) else {
        return not_found();
    };
    let token = raw_token.to_ascii_lowercase();

    let record = match lookup_canary_token(service.store(), &token).await {
        Ok(Some(record)) => record,
        Ok(None) => return not_found(),
        Err(e) => {
            tracing::warn!(error = %e, "Canary token lookup failed");
            return not_found();
        }
    };

    let fingerprint = match event {
        CanaryEvent::Js if settings.canary_collect_fingerprint => {
            surface.body.as_ref().and_then(Fingerprint::from_value)
        }
        _ => None,
    };

    let alert = CanaryAlert {
        token: record.token.clone(),
        event_type: event,
        hashed_ip: record.hashed_ip.clone(),
        callback_hashed_ip: callback_hashed_ip.to_string(),
        document_path: record.document_path.clone(),
        fingerprint,
        timestamp: Utc::now(),
    };

    tracing::warn!(
        token = %alert.token,
        event = event.as_str(),
        hashed_ip = %alert.hashed_ip,
        callback_hashed_ip = %alert.callback_hashed_ip,
        document_path = %alert.document_path,
        "Canary beacon received"
    );

    match serde_json::to_string(&alert) {
        Ok(json) => {
            let capacity = service.config().alerts.log_capacity;
            if let Err(e) = service
                .store()
                .push_bounded(ALERT_LOG_KEY, &json, capacity)
                .await
            {
                tracing::warn!(error = %e, "Failed to append canary alert");
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to serialize canary alert"),
    }

    if settings.canary_alert_on_callback {
        let security_alert = SecurityAlert::new(
            AlertSeverity::Warning,
            AlertKind::CanaryCallback {
                token: record.token.clone(),
                document_path: record.document_path.clone(),
                event: event.as_str().to_string(),
            },
            record.hashed_ip.clone(),
            format!("Canary document {} phoned home", record.document_path),
        );
        service.dispatch_alert(&security_alert).await;
        service
            .record_threat(&record.hashed_ip, ThreatReason::CanaryBeacon)
            .await;
        service.flag(&record.hashed_ip).await;
        if callback_hashed_ip != record.hashed_ip {
            service.flag(callback_hashed_ip).await;
        }
        service
            .record_incident(
                &record.hashed_ip,
                Incident::new("canary_callback", event.as_str(), &record.document_path),
            )
            .await;
    }

    event_response(event)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::http::{HeaderMap, Method, Uri};
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;
    use crate::{
        config::ServerConfig,
        core::{
            canary::dispenser::{CanaryRequest, generate_canary_token},
            testing::{RecordingDispatcher, test_service},
            threat_score,
        },
    };

    fn callback(query: &str, body: Option<Value>) -> RequestSurface {
        let uri: Uri = format!("/api/canary-callback?{query}").parse().unwrap();
        let mut surface = RequestSurface::from_parts(Method::GET, &uri, HeaderMap::new(), b"");
        surface.body = body;
        surface
    }

    async fn minted(service: &DeceptionService) -> String {
        let request = CanaryRequest {
            document_path: "/internal/api-keys.html",
            hashed_ip: "victim",
            user_agent: "Mozilla/5.0",
        };
        generate_canary_token(service.store(), &request, Duration::from_secs(60))
            .await
            .unwrap()
            .token
    }

    #[test]
    fn test_token_shape() {
        assert!(is_valid_token("0123456789abcdef0123456789abcdef"));
        assert!(is_valid_token("0123456789ABCDEF0123456789ABCDEF"));
        assert!(!is_valid_token(""));
        assert!(!is_valid_token("0123456789abcdef"));
        assert!(!is_valid_token("0123456789abcdef0123456789abcdeg"));
        assert!(!is_valid_token("' OR '1'='1' --aaaaaaaaaaaaaaaaa"));
    }

    #[test]
    fn test_png_is_valid() {
        assert!(TRANSPARENT_PNG.len() > 8);
        assert_eq!(&TRANSPARENT_PNG[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_fingerprint_is_lenient() {
        let fp = Fingerprint::from_value(&json!({
            "tz": "Europe/Berlin", "plat": "Linux x86_64", "sw": 1920, "sh": 1080,
            "hc": 8, "ips": ["192.168.1.4", 5, "203.0.113.9"]
        }))
        .unwrap();
        assert_eq!(fp.tz.as_deref(), Some("Europe/Berlin"));
        assert_eq!(fp.sw, Some(1920));
        assert_eq!(fp.ips, vec!["192.168.1.4", "203.0.113.9"]);

        let odd = Fingerprint::from_value(&json!({"sw": "wide", "tz": 3})).unwrap_or_default();
        assert_eq!(odd, Fingerprint::default());
        assert!(Fingerprint::from_value(&json!("text")).is_none());
        assert!(Fingerprint::from_value(&json!({})).is_none());
    }

    #[tokio::test]
    async fn test_malformed_token_is_404_for_every_event() {
        let (service, store) =
            test_service(ServerConfig::default(), Arc::new(RecordingDispatcher::default()));
        let settings = SecuritySettings::all_enabled();
        for query in ["e=img", "t=short&e=img", "t=zzzz&e=js", "t=&e=js"] {
            let response = handle_canary_callback(&service, &callback(query, None), &settings, "x").await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{query}");
        }
        assert!(recent_canary_alerts(store.as_ref(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_token_is_404() {
        let (service, _store) =
            test_service(ServerConfig::default(), Arc::new(RecordingDispatcher::default()));
        let response = handle_canary_callback(
            &service,
            &callback("t=0123456789abcdef0123456789abcdef&e=img", None),
            &SecuritySettings::all_enabled(),
            "x",
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"Not Found");
    }

    #[tokio::test]
    async fn test_unknown_event_is_404_without_alert() {
        let (service, store) =
            test_service(ServerConfig::default(), Arc::new(RecordingDispatcher::default()));
        let token = minted(&service).await;
        let response = handle_canary_callback(
            &service,
            &callback(&format!("t={token}&e=pdf"), None),
            &SecuritySettings::all_enabled(),
            "x",
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(recent_canary_alerts(store.as_ref(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_img_beacon_returns_png_and_logs_once() {
        let (service, store) =
            test_service(ServerConfig::default(), Arc::new(RecordingDispatcher::default()));
        let token = minted(&service).await;

        let response = handle_canary_callback(
            &service,
            &callback(&format!("t={token}&e=img"), None),
            &SecuritySettings::default(),
            "victim",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "image/png");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), TRANSPARENT_PNG.as_slice());

        let alerts = recent_canary_alerts(store.as_ref(), 10).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].event_type, CanaryEvent::Img);
        assert_eq!(alerts[0].hashed_ip, "victim");
        assert_eq!(alerts[0].document_path, "/internal/api-keys.html");

        // Alerting is off: no ledger change
        assert_eq!(threat_score::threat_score(store.as_ref(), "victim").await.unwrap().score, 0);
    }

    #[tokio::test]
    async fn test_js_beacon_stores_fingerprint_and_alerts() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let (service, store) = test_service(ServerConfig::default(), dispatcher.clone());
        let token = minted(&service).await;

        let response = handle_canary_callback(
            &service,
            &callback(
                &format!("t={token}&e=js"),
                Some(json!({"tz": "UTC", "plat": "Win32", "sw": 1280, "sh": 720, "hc": 4, "ips": ["10.0.0.5"]})),
            ),
            &SecuritySettings::all_enabled(),
            "other-identity",
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());

        let alerts = recent_canary_alerts(store.as_ref(), 10).await.unwrap();
        assert_eq!(alerts.len(), 1);
        let fp = alerts[0].fingerprint.as_ref().unwrap();
        assert_eq!(fp.plat.as_deref(), Some("Win32"));
        assert_eq!(alerts[0].callback_hashed_ip, "other-identity");

        assert_eq!(dispatcher.alerts().len(), 1);
        assert_eq!(
            threat_score::threat_score(store.as_ref(), "victim").await.unwrap().score,
            ThreatReason::CanaryBeacon.points()
        );
        assert!(threat_score::is_flagged(store.as_ref(), "victim").await.unwrap());
        assert!(threat_score::is_flagged(store.as_ref(), "other-identity").await.unwrap());
    }

    #[tokio::test]
    async fn test_alert_log_is_bounded() {
        let mut config = ServerConfig::default();
        config.alerts.log_capacity = 3;
        let (service, store) = test_service(config, Arc::new(RecordingDispatcher::default()));
        let token = minted(&service).await;

        for _ in 0..5 {
            let response = handle_canary_callback(
                &service,
                &callback(&format!("t={token}&e=img"), None),
                &SecuritySettings::default(),
                "victim",
            )
            .await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(recent_canary_alerts(store.as_ref(), 100).await.unwrap().len(), 3);
    }
}
