//! Periodic health checking of registered backends.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::backend::BackendRegistry;

/// Probes every backend with a plain `GET` against its base URL and flips
/// its availability on transition. Logging happens only when a backend's
/// status actually changes, not on every tick.
pub struct HealthChecker {
    registry: Arc<BackendRegistry>,
    client: reqwest::Client,
    interval: Duration,
}

impl HealthChecker {
    pub fn new(registry: Arc<BackendRegistry>, interval: Duration, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(1)
            .build()
            .expect("failed to build health-check client");

        Self {
            registry,
            client,
            interval,
        }
    }

    /// Run the probe loop until `shutdown` fires. Intended to be spawned
    /// as one of the process's background workers.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for backend in self.registry.backends() {
                        let url = backend.url().clone();
                        let ok = match self.client.get(url.clone()).send().await {
                            Ok(resp) => resp.status().as_u16() == 200,
                            Err(e) => {
                                debug!(backend = %url, error = %e, "health probe failed");
                                false
                            }
                        };

                        let was_available = backend.is_available();
                        if ok != was_available {
                            backend.set_available(ok);
                            if ok {
                                info!(backend = %url, "backend recovered");
                            } else {
                                warn!(backend = %url, "backend marked unavailable");
                            }
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("health checker shutting down");
                        return;
                    }
                }
            }
        }
    }
}
