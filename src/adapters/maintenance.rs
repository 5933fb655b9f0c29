use std::{sync::Arc, time::Duration};

use tokio::time::sleep;

use crate::{adapters::MemoryStore, core::ClientRateLimiter, utils::graceful_shutdown::ShutdownToken};

/// Periodic housekeeping for in-process state: expired store entries and idle
/// rate limiter keys.
pub struct StoreMaintenance {
    store: Arc<MemoryStore>,
    rate_limiter: Option<ClientRateLimiter>,
    interval: Duration,
}

impl StoreMaintenance {
    pub fn new(
        store: Arc<MemoryStore>,
        rate_limiter: Option<ClientRateLimiter>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            rate_limiter,
            interval,
        }
    }

    /// One sweep. Returns how many store entries were dropped.
    pub async fn run_once(&self) -> usize {
        let purged = self.store.purge_expired().await;
        if let Some(limiter) = &self.rate_limiter {
            limiter.retain_recent();
        }
        purged
    }

    /// Sweep every `interval` until shutdown.
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        tracing::info!(
            "Starting store maintenance with interval: {}s",
            self.interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = sleep(self.interval) => {
                    self.run_once().await;
                }
                reason = shutdown.wait_for_shutdown() => {
                    tracing::info!("Store maintenance stopping: {:?}", reason);
                    return;
                }
            }
        }
    }
}
