// End-to-end checks of the request pipeline through the axum router
#[cfg(test)]
mod test {
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;
    use axum::{
        Router,
        body::Body,
        extract::ConnectInfo,
        http::{Method, Request, Response, StatusCode, header},
    };
    use backfire::{
        adapters::{HttpHandler, MemoryStore, StoreIncidentRecorder, router},
        config::{SecuritySettings, ServerConfig},
        core::{
            DeceptionService,
            canary::callback::{TRANSPARENT_PNG, recent_canary_alerts},
            identity::hash_ip,
            settings::seed_settings,
            threat_score::{self, ThreatLevel},
        },
        ports::alert_dispatcher::{AlertDispatcher, AlertError, AlertSeverity, SecurityAlert},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt; // for oneshot

    const ATTACKER: &str = "198.51.100.23:41000";
    const VPN_EXIT: &str = "203.0.113.77:52000";

    #[derive(Default)]
    struct CollectingDispatcher {
        alerts: Mutex<Vec<SecurityAlert>>,
    }

    #[async_trait]
    impl AlertDispatcher for CollectingDispatcher {
        async fn send_security_alert(&self, alert: &SecurityAlert) -> Result<(), AlertError> {
            self.alerts.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    struct Harness {
        app: Router,
        store: Arc<MemoryStore>,
        dispatcher: Arc<CollectingDispatcher>,
        salt: String,
    }

    impl Harness {
        async fn new(settings: Option<SecuritySettings>) -> Self {
            let config = ServerConfig::default();
            let salt = config.identity.ip_hash_salt.clone();
            let store = Arc::new(MemoryStore::new());
            if let Some(settings) = settings {
                seed_settings(store.as_ref(), &settings).await.unwrap();
            }
            let dispatcher = Arc::new(CollectingDispatcher::default());
            let incidents = Arc::new(StoreIncidentRecorder::new(store.clone(), 100));
            let service = DeceptionService::new(
                Arc::new(config),
                store.clone(),
                dispatcher.clone(),
                incidents,
            );
            let app = router(Arc::new(HttpHandler::new(Arc::new(service), None)));
            Self {
                app,
                store,
                dispatcher,
                salt,
            }
        }

        fn hashed(&self, peer: &str) -> String {
            let addr: SocketAddr = peer.parse().unwrap();
            hash_ip(&addr.ip().to_string(), &self.salt)
        }

        async fn send(&self, peer: &str, mut req: Request<Body>) -> Response<Body> {
            let addr: SocketAddr = peer.parse().unwrap();
            req.extensions_mut().insert(ConnectInfo(addr));
            self.app.clone().oneshot(req).await.unwrap()
        }

        async fn get(&self, peer: &str, uri: &str) -> Response<Body> {
            self.send(peer, Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
        }
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn token_from_html(html: &str) -> String {
        let start = html.find("?t=").expect("beacon url in decoy") + 3;
        html[start..start + 32].to_string()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_canary_document_phones_home_and_escalates() {
        let harness = Harness::new(Some(SecuritySettings::all_enabled())).await;
        let attacker = harness.hashed(ATTACKER);

        let response = harness.get(ATTACKER, "/backup/credentials-2024.html").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        let html = body_text(response).await;
        let token = token_from_html(&html);

        let beacon = harness
            .get(VPN_EXIT, &format!("/api/canary-callback?t={token}&e=img"))
            .await;
        assert_eq!(beacon.status(), StatusCode::OK);
        assert_eq!(beacon.headers()[header::CONTENT_TYPE], "image/png");

        let alerts = recent_canary_alerts(harness.store.as_ref(), 10)
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].hashed_ip, attacker);
        assert_eq!(alerts[0].callback_hashed_ip, harness.hashed(VPN_EXIT));
        assert_eq!(alerts[0].document_path, "/backup/credentials-2024.html");

        let score = threat_score::threat_score(harness.store.as_ref(), &attacker)
            .await
            .unwrap();
        assert_eq!(score.score, 90);
        assert_eq!(score.level, ThreatLevel::Critical);

        let sent = harness.dispatcher.alerts.lock().unwrap().clone();
        assert!(sent.iter().any(|a| a.severity == AlertSeverity::Warning));
        assert!(
            sent.iter()
                .any(|a| a.severity == AlertSeverity::Critical && a.hashed_ip == attacker)
        );

        assert!(
            threat_score::is_flagged(harness.store.as_ref(), &attacker)
                .await
                .unwrap()
        );
        assert!(
            threat_score::is_flagged(harness.store.as_ref(), &harness.hashed(VPN_EXIT))
                .await
                .unwrap()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fingerprint_beacon_is_recorded() {
        let harness = Harness::new(Some(SecuritySettings::all_enabled())).await;
        let html = body_text(harness.get(ATTACKER, "/internal/api-keys.html").await).await;
        let token = token_from_html(&html);

        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/canary-callback?t={token}&e=js"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"tz":"Europe/Berlin","plat":"Linux x86_64","sw":1920,"sh":1080,"hc":8,"ips":["192.168.1.20"]}"#,
            ))
            .unwrap();
        let response = harness.send(ATTACKER, req).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let alerts = recent_canary_alerts(harness.store.as_ref(), 10)
            .await
            .unwrap();
        let fingerprint = alerts[0].fingerprint.as_ref().expect("fingerprint stored");
        assert_eq!(fingerprint.tz.as_deref(), Some("Europe/Berlin"));
        assert_eq!(fingerprint.ips, vec!["192.168.1.20".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_malformed_callbacks_look_like_missing_pages() {
        let harness = Harness::new(Some(SecuritySettings::all_enabled())).await;
        for uri in [
            "/api/canary-callback",
            "/api/canary-callback?t=nothex&e=img",
            "/api/canary-callback?t=0123456789abcdef0123456789abcdef&e=img",
            "/api/canary-callback?t=0123456789abcdef0123456789abcdef&e=pdf",
        ] {
            let response = harness.get(ATTACKER, uri).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
        assert!(
            recent_canary_alerts(harness.store.as_ref(), 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_img_beacon_accepts_any_method() {
        let harness = Harness::new(Some(SecuritySettings::all_enabled())).await;
        let html = body_text(harness.get(ATTACKER, "/internal/api-keys.html").await).await;
        let token = token_from_html(&html);

        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/canary-callback?t={token}&e=img"))
            .body(Body::empty())
            .unwrap();
        let response = harness.send(VPN_EXIT, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], &TRANSPARENT_PNG[..]);
        assert!(bytes.starts_with(b"\x89PNG"));

        let alerts = recent_canary_alerts(harness.store.as_ref(), 10)
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rejected_callback_matches_unknown_path() {
        let harness = Harness::new(Some(SecuritySettings::all_enabled())).await;

        let rejected = harness
            .get(VPN_EXIT, "/api/canary-callback?t=bad&e=img")
            .await;
        let missing = harness.get(VPN_EXIT, "/api/nothing-here").await;
        assert_eq!(rejected.status(), missing.status());
        assert_eq!(
            rejected.headers().get(header::CONTENT_TYPE),
            missing.headers().get(header::CONTENT_TYPE)
        );
        assert_eq!(body_text(rejected).await, body_text(missing).await);

        // a decoy download flags the identity; its rejected beacons are poisoned too
        harness.get(ATTACKER, "/admin/backup/db-export.html").await;
        let rejected = harness
            .get(ATTACKER, "/api/canary-callback?t=bad&e=img")
            .await;
        assert_eq!(rejected.status(), StatusCode::NOT_FOUND);
        assert!(rejected.headers().contains_key("x-debug-route"));
        let missing = harness.get(ATTACKER, "/api/nothing-here").await;
        assert!(missing.headers().contains_key("x-debug-route"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sql_injection_backfires() {
        let harness = Harness::new(Some(SecuritySettings::all_enabled())).await;
        let req = Request::builder()
            .method(Method::POST)
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"user":"admin' --","password":"x"}"#))
            .unwrap();
        let response = harness.send(ATTACKER, req).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            response.headers()["x-db-status"]
                .to_str()
                .unwrap()
                .contains("DROP TABLE")
        );
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"], "Database error");

        let score = threat_score::threat_score(harness.store.as_ref(), &harness.hashed(ATTACKER))
            .await
            .unwrap();
        assert_eq!(score.score, 30);
        assert_eq!(score.level, ThreatLevel::Warn);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scanner_is_flagged_then_poisoned() {
        let harness = Harness::new(Some(SecuritySettings::all_enabled())).await;
        let req = Request::builder()
            .uri("/")
            .header(header::USER_AGENT, "sqlmap/1.7.2#stable (https://sqlmap.org)")
            .body(Body::empty())
            .unwrap();
        let response = harness.send(ATTACKER, req).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = harness.get(ATTACKER, "/does-not-exist").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-debug-route"));
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(
            body["debug"]["api_key"]
                .as_str()
                .unwrap()
                .starts_with("sk_prod_")
        );

        let bystander = harness.get(VPN_EXIT, "/does-not-exist").await;
        assert!(!bystander.headers().contains_key("x-debug-route"));
        assert_eq!(body_text(bystander).await, "Not Found");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_decoy_reader_gets_backfire_on_api() {
        let settings = SecuritySettings {
            sql_backfire_enabled: true,
            sql_backfire_on_honeytoken_access: true,
            canary_documents_enabled: true,
            ..SecuritySettings::default()
        };
        let harness = Harness::new(Some(settings)).await;

        assert_eq!(
            harness.get(ATTACKER, "/api/users").await.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            harness
                .get(ATTACKER, "/admin/backup/db-export.html")
                .await
                .status(),
            StatusCode::OK
        );
        let response = harness.get(ATTACKER, "/api/users").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key("x-sql-version"));

        assert_eq!(
            harness.get(VPN_EXIT, "/api/users").await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_robots_lure_and_violation() {
        let harness = Harness::new(Some(SecuritySettings::all_enabled())).await;
        let robots = body_text(harness.get(ATTACKER, "/robots.txt").await).await;
        assert!(robots.contains("Disallow: /internal/api-keys.html"));

        let response = harness.get(ATTACKER, "/.private/").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let score = threat_score::threat_score(harness.store.as_ref(), &harness.hashed(ATTACKER))
            .await
            .unwrap();
        assert_eq!(score.score, 10);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_settings_disable_everything() {
        let harness = Harness::new(None).await;

        let response = harness
            .get(ATTACKER, "/search?q=1%20UNION%20SELECT%20password%20FROM%20users")
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.headers().contains_key("x-db-status"));

        assert_eq!(
            harness
                .get(ATTACKER, "/internal/api-keys.html")
                .await
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            harness.get(ATTACKER, "/robots.txt").await.status(),
            StatusCode::NOT_FOUND
        );
        let score = threat_score::threat_score(harness.store.as_ref(), &harness.hashed(ATTACKER))
            .await
            .unwrap();
        assert_eq!(score.score, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_health_endpoint() {
        let harness = Harness::new(None).await;
        let response = harness.get(ATTACKER, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["store"], "ok");
    }
}
