//! Per-client rate limiting built atop `governor`.
//!
//! The limiter is keyed by client identity (the hashed address) and runs before
//! any classification, so it is the only backpressure a flood of probes meets.
use std::{num::NonZeroU32, sync::Arc};

use axum::response::{IntoResponse, Response as AxumResponse};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use http::StatusCode;

use crate::config::models::RateLimitConfig;

pub type KeyedRateLimiterImpl<K> = RateLimiter<K, DefaultKeyedStateStore<K>, DefaultClock>;

/// Keyed limiter plus the response sent on violation. Cheap to clone.
#[derive(Clone)]
pub struct ClientRateLimiter {
    limiter: Arc<KeyedRateLimiterImpl<String>>,
    status_code: StatusCode,
    message: String,
}

impl ClientRateLimiter {
    /// Build a limiter from a `RateLimitConfig` definition.
    pub fn new(config: &RateLimitConfig) -> Result<Self, String> {
        let period_duration = humantime::parse_duration(&config.period).map_err(|e| {
            format!(
                "Invalid period string '{period}': {e}",
                period = config.period
            )
        })?;

        let requests = u32::try_from(config.requests)
            .map_err(|_| format!("Rate limit 'requests' too large: {}", config.requests))?;
        let quota_requests = NonZeroU32::new(requests)
            .ok_or_else(|| "Rate limit 'requests' must be greater than 0".to_string())?;

        // GCRA: `requests` burst, refilled evenly over `period`
        let replenish = period_duration / quota_requests.get();
        let quota = Quota::with_period(replenish)
            .ok_or_else(|| format!("Invalid period duration: {period_duration:?}"))?
            .allow_burst(quota_requests);

        let status_code = StatusCode::from_u16(config.status_code)
            .map_err(|_| format!("Invalid status code: {}", config.status_code))?;

        tracing::info!(
            requests = config.requests,
            period = %config.period,
            status_code = config.status_code,
            "Creating per-client rate limiter"
        );

        Ok(Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            status_code,
            message: config.message.clone(),
        })
    }

    /// Whether `client` may proceed. Consumes one cell on success.
    pub fn check(&self, client: &str) -> bool {
        self.limiter.check_key(&client.to_string()).is_ok()
    }

    /// Response sent to a client over its quota.
    pub fn reject_response(&self) -> AxumResponse {
        (self.status_code, self.message.clone()).into_response()
    }

    /// Drop state for clients that have fully replenished.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }
}
