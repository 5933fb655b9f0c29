use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::ConnectInfo,
    http::{HeaderValue, Method, Request, Response, StatusCode, header},
    middleware,
    routing::any,
};
use bytes::Bytes;
use eyre::{Result, WrapErr};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::{
    adapters::middleware::{
        request_id_middleware, request_timing_middleware, security_headers_middleware,
    },
    config::SecuritySettings,
    core::{
        DeceptionService,
        backfire::apply_backfire,
        canary::{
            documents::{is_robots_violation, render_robots_txt},
            handle_canary_callback, serve_canary_document,
        },
        classifier::RequestSurface,
        identity::{client_ip, hash_ip},
        log_poison::poison_error_response,
        not_found,
        threat_score::ThreatReason,
    },
    ports::{http_client::HttpClient, incident_recorder::Incident},
    tracing_setup::create_request_span,
};

/// Front door of the deception layer.
///
/// Every request passes through the same pipeline: identity, rate limit,
/// feature gate, the canary callback, SQL backfire, decoy documents and
/// finally the upstream application, whose error responses may be poisoned on
/// the way back out.
pub struct HttpHandler {
    service: Arc<DeceptionService>,
    http_client: Option<Arc<dyn HttpClient>>,
}

/// One request after identity resolution and body buffering.
struct Inbound {
    method: Method,
    uri: axum::http::Uri,
    headers: axum::http::HeaderMap,
    body: Bytes,
    client_ip: String,
    hashed_ip: String,
}

impl HttpHandler {
    /// `http_client` is only used when an upstream is configured.
    pub fn new(service: Arc<DeceptionService>, http_client: Option<Arc<dyn HttpClient>>) -> Self {
        Self {
            service,
            http_client,
        }
    }

    pub fn service(&self) -> &DeceptionService {
        &self.service
    }

    /// Main request handler. Internal failures are answered with a plain 404
    /// rather than a 5xx.
    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Response<AxumBody> {
        let identity = &self.service.config().identity;
        let ip = client_ip(req.headers(), client_addr, identity.trust_forwarded_headers);
        let hashed_ip = hash_ip(&ip, &identity.ip_hash_salt);
        let span = create_request_span(req.method().as_str(), req.uri().path(), &hashed_ip);

        let response = match self
            .process(req, ip, hashed_ip)
            .instrument(span.clone())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(parent: &span, "Request handling error: {:?}", e);
                not_found()
            }
        };
        span.record("http.status_code", response.status().as_u16());
        response
    }

    async fn process(
        &self,
        req: Request<AxumBody>,
        client_ip: String,
        hashed_ip: String,
    ) -> Result<Response<AxumBody>> {
        let config = self.service.config();

        if let Some(limiter) = self.service.rate_limiter()
            && !limiter.check(&hashed_ip)
        {
            tracing::warn!(hashed_ip = %hashed_ip, "Rate limit exceeded");
            return Ok(limiter.reject_response());
        }

        let (parts, body) = req.into_parts();
        let body = match axum::body::to_bytes(body, config.body_limit_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("Rejecting request body: {}", e);
                return Response::builder()
                    .status(StatusCode::PAYLOAD_TOO_LARGE)
                    .body(AxumBody::empty())
                    .wrap_err("Failed to build payload too large response");
            }
        };

        let inbound = Inbound {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            client_ip,
            hashed_ip,
        };

        let settings = self.service.load_settings().await;
        let surface = RequestSurface::from_parts(
            inbound.method.clone(),
            &inbound.uri,
            inbound.headers.clone(),
            &inbound.body,
        );

        let path = inbound.uri.path();
        if path == config.canary.callback_path {
            let response =
                handle_canary_callback(&self.service, &surface, &settings, &inbound.hashed_ip)
                    .await;
            return Ok(self.poison(&settings, &inbound, response).await);
        }

        match path {
            "/health" => return self.handle_health_check().await,
            "/robots.txt" if settings.canary_documents_enabled => {
                return self.handle_robots_txt();
            }
            _ => {}
        }

        if let Some(response) =
            apply_backfire(&self.service, &surface, &settings, &inbound.hashed_ip).await
        {
            return Ok(response);
        }

        if let Some(response) =
            serve_canary_document(&self.service, &surface, &settings, &inbound.hashed_ip).await
        {
            return Ok(response);
        }

        if settings.canary_documents_enabled && is_robots_violation(path) {
            self.record_robots_violation(&inbound.hashed_ip, path).await;
        }

        let response = self.forward(&inbound).await?;
        Ok(self.poison(&settings, &inbound, response).await)
    }

    async fn poison(
        &self,
        settings: &SecuritySettings,
        inbound: &Inbound,
        response: Response<AxumBody>,
    ) -> Response<AxumBody> {
        poison_error_response(
            &self.service,
            settings,
            &inbound.hashed_ip,
            inbound.uri.path(),
            response,
        )
        .await
    }

    async fn record_robots_violation(&self, hashed_ip: &str, path: &str) {
        tracing::warn!(hashed_ip = %hashed_ip, path = %path, "Disallowed path requested");
        self.service
            .record_threat(hashed_ip, ThreatReason::RobotsViolation)
            .await;
        self.service
            .record_incident(
                hashed_ip,
                Incident::new("robots_violation", ThreatReason::RobotsViolation.as_str(), path),
            )
            .await;
    }

    /// Handle health check endpoint
    async fn handle_health_check(&self) -> Result<Response<AxumBody>> {
        let store_ok = match self.service.store().health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Store health check failed: {}", e);
                false
            }
        };

        let health_data = serde_json::json!({
            "status": if store_ok { "healthy" } else { "degraded" },
            "store": if store_ok { "ok" } else { "unavailable" },
            "upstream": self.service.config().upstream.is_some(),
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(AxumBody::from(health_data.to_string()))
            .wrap_err("Failed to build health check response")
    }

    fn handle_robots_txt(&self) -> Result<Response<AxumBody>> {
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(AxumBody::from(render_robots_txt()))
            .wrap_err("Failed to build robots.txt response")
    }

    /// Send the request to the protected application, or 404 when none is
    /// configured. Upstream failures also end in a 404.
    async fn forward(&self, inbound: &Inbound) -> Result<Response<AxumBody>> {
        let (Some(upstream), Some(client)) =
            (self.service.config().upstream.as_deref(), &self.http_client)
        else {
            return Ok(not_found());
        };

        let upstream_uri = format!(
            "{}{}",
            upstream.trim_end_matches('/'),
            inbound.uri.path_and_query().map_or("/", |pq| pq.as_str())
        );

        let mut req = Request::builder()
            .method(inbound.method.clone())
            .uri(upstream_uri)
            .body(inbound.body.clone())
            .wrap_err("Failed to build upstream request")?;

        let headers = req.headers_mut();
        *headers = inbound.headers.clone();
        if let Ok(value) = HeaderValue::from_str(&inbound.client_ip) {
            headers.insert("x-forwarded-for", value);
        }
        headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
        if let Some(host) = inbound.headers.get(header::HOST) {
            headers.insert("x-forwarded-host", host.clone());
        }

        match client.send_request(req).await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::error!("Upstream request failed: {}", e);
                Ok(not_found())
            }
        }
    }
}

impl Clone for HttpHandler {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            http_client: self.http_client.clone(),
        }
    }
}

/// Axum router sending every path and method through `handler`, wrapped in
/// the standard middleware stack.
pub fn router(handler: Arc<HttpHandler>) -> Router {
    let route = |handler: Arc<HttpHandler>| {
        any(move |req: Request<AxumBody>| {
            let handler = handler.clone();
            async move {
                let client_addr = req
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| *addr);
                handler.handle_request(req, client_addr).await
            }
        })
    };

    Router::new()
        .route("/", route(handler.clone()))
        .route("/{*path}", route(handler))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_timing_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use http_body_util::BodyExt;

    use super::*;
    use crate::{
        config::{RateLimitConfig, ServerConfig},
        core::{
            settings::seed_settings,
            testing::{RecordingDispatcher, test_service},
            threat_score,
        },
        ports::http_client::{HttpClientError, HttpClientResult},
    };

    /// Upstream stand-in answering with a fixed status and recording requests.
    struct FixedUpstream {
        status: StatusCode,
        seen: Mutex<Vec<Request<Bytes>>>,
    }

    impl FixedUpstream {
        fn new(status: StatusCode) -> Arc<Self> {
            Arc::new(Self {
                status,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpClient for FixedUpstream {
        async fn send_request(&self, req: Request<Bytes>) -> HttpClientResult<Response<AxumBody>> {
            self.seen.lock().unwrap().push(req);
            let mut response = Response::new(AxumBody::from("upstream"));
            *response.status_mut() = self.status;
            Ok(response)
        }
    }

    struct DeadUpstream;

    #[async_trait]
    impl HttpClient for DeadUpstream {
        async fn send_request(&self, _req: Request<Bytes>) -> HttpClientResult<Response<AxumBody>> {
            Err(HttpClientError::ConnectionError("refused".to_string()))
        }
    }

    async fn handler_with(
        config: ServerConfig,
        settings: SecuritySettings,
        upstream: Option<Arc<dyn HttpClient>>,
    ) -> (HttpHandler, Arc<crate::adapters::MemoryStore>) {
        let (service, store) = test_service(config, Arc::new(RecordingDispatcher::default()));
        seed_settings(store.as_ref(), &settings).await.unwrap();
        (HttpHandler::new(Arc::new(service), upstream), store)
    }

    fn get(uri: &str) -> Request<AxumBody> {
        Request::builder().uri(uri).body(AxumBody::empty()).unwrap()
    }

    fn peer() -> Option<SocketAddr> {
        Some("203.0.113.9:51000".parse().unwrap())
    }

    fn upstream_config() -> ServerConfig {
        ServerConfig {
            upstream: Some("http://app.local:3000".to_string()),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_no_upstream_is_404() {
        let (handler, _) =
            handler_with(ServerConfig::default(), SecuritySettings::default(), None).await;
        let response = handler.handle_request(get("/anything"), peer()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_benign_request_is_forwarded_with_client_ip() {
        let upstream = FixedUpstream::new(StatusCode::OK);
        let (handler, _) = handler_with(
            upstream_config(),
            SecuritySettings::all_enabled(),
            Some(upstream.clone()),
        )
        .await;

        let response = handler.handle_request(get("/products?page=2"), peer()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let seen = upstream.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].uri(), "http://app.local:3000/products?page=2");
        assert_eq!(seen[0].headers()["x-forwarded-for"], "203.0.113.9");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_404() {
        let (handler, _) = handler_with(
            upstream_config(),
            SecuritySettings::default(),
            Some(Arc::new(DeadUpstream)),
        )
        .await;
        let response = handler.handle_request(get("/"), peer()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_reports_store() {
        let (handler, _) =
            handler_with(ServerConfig::default(), SecuritySettings::default(), None).await;
        let response = handler.handle_request(get("/health"), peer()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_robots_lure_only_when_canaries_enabled() {
        let (handler, _) =
            handler_with(ServerConfig::default(), SecuritySettings::default(), None).await;
        let response = handler.handle_request(get("/robots.txt"), peer()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let settings = SecuritySettings {
            canary_documents_enabled: true,
            ..SecuritySettings::default()
        };
        let (handler, _) = handler_with(ServerConfig::default(), settings, None).await;
        let response = handler.handle_request(get("/robots.txt"), peer()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("Disallow: /admin/backup/"));
    }

    #[tokio::test]
    async fn test_robots_violation_scores_and_falls_through() {
        let settings = SecuritySettings {
            canary_documents_enabled: true,
            ..SecuritySettings::default()
        };
        let (handler, store) = handler_with(ServerConfig::default(), settings, None).await;
        let response = handler
            .handle_request(get("/admin/backup/old.tar.gz"), peer())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let hashed = hash_ip("203.0.113.9", &ServerConfig::default().identity.ip_hash_salt);
        assert_eq!(
            threat_score::threat_score(store.as_ref(), &hashed)
                .await
                .unwrap()
                .score,
            ThreatReason::RobotsViolation.points()
        );
    }

    #[tokio::test]
    async fn test_sql_injection_never_reaches_upstream() {
        let upstream = FixedUpstream::new(StatusCode::OK);
        let settings = SecuritySettings {
            sql_backfire_enabled: true,
            ..SecuritySettings::default()
        };
        let (handler, _) =
            handler_with(upstream_config(), settings, Some(upstream.clone())).await;

        let response = handler
            .handle_request(get("/search?q=1%27%20OR%20%271%27%3D%271"), peer())
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key("x-db-status"));
        assert!(upstream.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flagged_identity_gets_poisoned_upstream_errors() {
        let upstream = FixedUpstream::new(StatusCode::NOT_FOUND);
        let settings = SecuritySettings {
            log_poisoning_enabled: true,
            log_poison_fake_headers: true,
            ..SecuritySettings::default()
        };
        let (handler, _) =
            handler_with(upstream_config(), settings, Some(upstream.clone())).await;
        let hashed = hash_ip("203.0.113.9", &ServerConfig::default().identity.ip_hash_salt);
        handler.service().flag(&hashed).await;

        let response = handler.handle_request(get("/missing"), peer()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-internal-api-key"));

        let other: Option<SocketAddr> = Some("198.51.100.4:4000".parse().unwrap());
        let response = handler.handle_request(get("/missing"), other).await;
        assert!(!response.headers().contains_key("x-internal-api-key"));
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_before_classification() {
        let config = ServerConfig {
            rate_limit: Some(RateLimitConfig {
                requests: 1,
                period: "1m".to_string(),
                status_code: 429,
                message: "slow down".to_string(),
            }),
            ..ServerConfig::default()
        };
        let (handler, _) = handler_with(config, SecuritySettings::default(), None).await;
        assert_eq!(
            handler.handle_request(get("/"), peer()).await.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            handler.handle_request(get("/"), peer()).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let config = ServerConfig {
            body_limit_bytes: 8,
            ..ServerConfig::default()
        };
        let (handler, _) = handler_with(config, SecuritySettings::default(), None).await;
        let req = Request::builder()
            .method(Method::POST)
            .uri("/login")
            .body(AxumBody::from("x".repeat(64)))
            .unwrap();
        assert_eq!(
            handler.handle_request(req, peer()).await.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
