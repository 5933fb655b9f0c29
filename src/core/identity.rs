//! Client identity: address extraction and one-way hashing.
//!
//! Raw addresses never reach the store. Every ledger, flag and token record is
//! keyed by a salted SHA-256 digest of the client address.
use std::net::SocketAddr;

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

/// Length of the hex digest kept as identity (first 16 bytes of SHA-256)
const HASHED_IP_LEN: usize = 32;

/// Extract the client address, preferring proxy headers when they are trusted.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(forwarded_for) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
        {
            return forwarded_for.to_string();
        }

        if let Some(real_ip) = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
        {
            return real_ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Salted one-way hash of a client address, as lowercase hex.
pub fn hash_ip(ip: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(ip.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(HASHED_IP_LEN);
    for byte in digest.iter().take(HASHED_IP_LEN / 2) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
