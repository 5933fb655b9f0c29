//! Backfire - a deception layer for HTTP APIs.
//!
//! Backfire sits in front of an application and turns hostile traffic into
//! wasted attacker effort while leaving ordinary requests untouched. It follows a
//! **hexagonal architecture**: countermeasure logic lives in `core`, external
//! concerns (key-value store, alert sinks, upstream HTTP) are reached through the
//! traits in `ports`, and `adapters` provide the implementations.
//!
//! # Countermeasures
//! - SQL backfire: requests carrying SQL injection payloads or a known scanner
//!   `User-Agent` receive a fabricated, catastrophic-looking database error
//! - Canary documents: decoy pages with a per-request tracking token that phone
//!   home when opened and optionally fingerprint the viewer
//! - Canary callbacks: beacon receiver that records alerts and escalates the
//!   identity that received the decoy
//! - Threat scoring: a per-identity point ledger with `LOW`/`WARN`/`CRITICAL` levels
//! - Log poisoning: flagged identities receive error responses seeded with fake
//!   internal routes, hosts and credentials
//! - Robots lure: `/robots.txt` advertises the decoy directories
//!
//! Every countermeasure is behind its own flag in
//! [`config::SecuritySettings`], loaded from the store on each request. A
//! missing or unreadable settings record disables everything.
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use backfire::{
//!     adapters::{HttpHandler, LogAlertDispatcher, MemoryStore, StoreIncidentRecorder, router},
//!     config::ServerConfig,
//!     core::DeceptionService,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = Arc::new(backfire::config::load_config("config.toml").await?);
//! let store = Arc::new(MemoryStore::new());
//! let incidents = Arc::new(StoreIncidentRecorder::new(store.clone(), 1000));
//! let service = DeceptionService::new(config, store, Arc::new(LogAlertDispatcher), incidents);
//! let app = router(Arc::new(HttpHandler::new(Arc::new(service), None)));
//! # let _ = app;
//! # Ok(()) }
//! ```
//!
//! # Privacy
//! Client IPs never reach the store or the logs in clear text; every identity
//! key is a salted SHA-256 prefix (see [`core::identity::hash_ip`]).
//!
//! # Error Handling
//! Ports return domain error types built with `thiserror`; application code uses
//! `eyre::Result` with `WrapErr` context. Countermeasures never surface store or
//! delivery failures to the client: they are logged and the request continues
//! as if the feature were off.
//!
//! # Concurrency & Data Structures
//! Shared maps use `scc::HashMap`. Score increments rely on the store's atomic add
//! so concurrent hits on one identity are never lost.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HttpClientAdapter, HttpHandler, MemoryStore},
    core::DeceptionService,
    ports::{http_client::HttpClient, kv_store::KvStore},
    utils::GracefulShutdown,
};
