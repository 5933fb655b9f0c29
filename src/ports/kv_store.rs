use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Error type for key-value store operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// The store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be interpreted
    #[error("Corrupt value under key '{key}': {message}")]
    Corrupt {
        /// Key holding the bad value
        key: String,
        /// What went wrong
        message: String,
    },

    /// Value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// KvStore defines the port (interface) for the external low-latency key-value store
/// holding every piece of durable state: tokens, scores, flags, logs and settings.
///
/// Implementations must make `incr_by` and `push_bounded` individually atomic. No
/// other ordering is assumed by callers.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Read a string value. Expired keys read as `None`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a string value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Whether a live (non-expired) key exists.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Atomically add `delta` to an integer counter, creating it at zero.
    /// Returns the new value.
    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64>;

    /// Atomically push `value` onto the head of a list, then trim the list so at
    /// most `capacity` newest entries remain.
    async fn push_bounded(&self, key: &str, value: &str, capacity: usize) -> StoreResult<()>;

    /// Read up to `limit` entries of a list, newest first.
    async fn list(&self, key: &str, limit: usize) -> StoreResult<Vec<String>>;

    /// Check store connectivity.
    async fn health_check(&self) -> StoreResult<()>;
}
