pub mod backfire;
pub mod bounded_log;
pub mod canary;
pub mod classifier;
pub mod deception;
pub mod identity;
pub mod log_poison;
pub mod rate_limiter;
pub mod settings;
pub mod threat_score;

#[cfg(test)]
pub(crate) mod testing;

use axum::{
    body::Body,
    http::{Response, StatusCode},
};

pub use deception::DeceptionService;
pub use rate_limiter::ClientRateLimiter;

/// The one 404 every unclaimed or rejected path answers with.
pub fn not_found() -> Response<Body> {
    let mut response = Response::new(Body::from("Not Found"));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}
