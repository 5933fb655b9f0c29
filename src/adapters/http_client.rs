use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use bytes::Bytes;
use eyre::{Result, WrapErr};
use http::{HeaderMap, Request, Response, header};
use tracing::Instrument;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

/// Headers that describe a single hop and must not be forwarded.
const HOP_BY_HOP: &[header::HeaderName] = &[
    header::CONNECTION,
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::TE,
    header::TRAILER,
    header::PROXY_AUTHORIZATION,
];

/// Upstream HTTP client adapter built on `reqwest` (rustls).
///
/// Responsibilities:
/// * Strips hop-by-hop headers in both directions
/// * Applies a bounded per-request timeout
/// * Converts the buffered upstream response into an Axum body
pub struct HttpClientAdapter {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter with the given timeout.
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .wrap_err("Failed to build upstream HTTP client")?;

        tracing::info!(timeout_secs, "Created upstream HTTP client");
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    fn strip_hop_by_hop(headers: &mut HeaderMap) {
        for name in HOP_BY_HOP {
            headers.remove(name);
        }
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(&self, req: Request<Bytes>) -> HttpClientResult<Response<AxumBody>> {
        let (mut parts, body) = req.into_parts();
        if parts.uri.host().is_none() {
            tracing::error!("Outgoing URI has no host: {}", parts.uri);
            return Err(HttpClientError::InvalidRequest(
                "Outgoing URI has no host".to_string(),
            ));
        }
        Self::strip_hop_by_hop(&mut parts.headers);

        let span = tracing::info_span!(
            "upstream_request",
            http.method = %parts.method,
            http.path = %parts.uri.path(),
            http.status_code = tracing::field::Empty,
        );

        let method_for_error_log = parts.method.clone();
        let uri_for_error_log = parts.uri.clone();

        let result = self
            .client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body)
            .send()
            .instrument(span.clone())
            .await;

        let upstream = match result {
            Ok(upstream) => upstream,
            Err(e) if e.is_timeout() => {
                span.record("http.status_code", 599u16);
                tracing::error!(
                    "Upstream request {} {} timed out",
                    method_for_error_log,
                    uri_for_error_log
                );
                return Err(HttpClientError::Timeout(self.timeout_secs));
            }
            Err(e) => {
                span.record("http.status_code", 599u16);
                tracing::error!(
                    "Error making upstream request ({} {}): {}",
                    method_for_error_log,
                    uri_for_error_log,
                    e
                );
                return Err(HttpClientError::ConnectionError(format!(
                    "Request to {method_for_error_log} {uri_for_error_log} failed: {e}"
                )));
            }
        };

        let status = upstream.status();
        span.record("http.status_code", status.as_u16());

        let mut headers = upstream.headers().clone();
        Self::strip_hop_by_hop(&mut headers);

        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| HttpClientError::ConnectionError(format!("Reading upstream body: {e}")))?;

        let mut response = Response::new(AxumBody::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
