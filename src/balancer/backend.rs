//! Backend registry: the fixed, ordered set of upstreams the proxy
//! forwards to, and the per-backend state (availability + active
//! connection count) the balancing strategies read and mutate.

use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

/// Mutable state guarded by a single per-backend lock. Availability (set
/// by the health checker) and the active-connection counter (used by
/// [`crate::balancer::least_connections`]) are updated together so a
/// strategy never observes one without the other.
#[derive(Debug)]
struct BackendInner {
    available: bool,
    active_connections: u64,
}

/// A single upstream server.
#[derive(Debug)]
pub struct Backend {
    url: Url,
    inner: Mutex<BackendInner>,
}

impl Backend {
    fn new(url: Url) -> Self {
        Self {
            url,
            inner: Mutex::new(BackendInner {
                available: true,
                active_connections: 0,
            }),
        }
    }

    /// The backend's base URL; requests are forwarded beneath it.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the backend is currently considered available.
    pub fn is_available(&self) -> bool {
        self.inner.lock().available
    }

    /// Set availability. Called only by the health checker.
    pub fn set_available(&self, available: bool) {
        self.inner.lock().available = available;
    }

    /// Current active-connection count, for `LeastConnections`.
    pub fn active_connections(&self) -> u64 {
        self.inner.lock().active_connections
    }

    /// Increment the active-connection counter. Per the monotonic-counter
    /// design `LeastConnections` selects against, this is never decremented
    /// back down over the backend's lifetime.
    pub fn increment_connections(&self) {
        self.inner.lock().active_connections += 1;
    }
}

/// The fixed, ordered set of backends configured at startup.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
}

impl BackendRegistry {
    pub fn new(urls: Vec<Url>) -> Self {
        let backends = urls.into_iter().map(|url| Arc::new(Backend::new(url))).collect();
        Self { backends }
    }

    /// All backends, in configuration order.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn new_backend_starts_available_with_no_connections() {
        let backend = Backend::new(url("http://127.0.0.1:9001"));
        assert!(backend.is_available());
        assert_eq!(backend.active_connections(), 0);
    }

    #[test]
    fn set_available_toggles_state() {
        let backend = Backend::new(url("http://127.0.0.1:9001"));
        backend.set_available(false);
        assert!(!backend.is_available());
        backend.set_available(true);
        assert!(backend.is_available());
    }

    #[test]
    fn increment_connections_never_decrements() {
        let backend = Backend::new(url("http://127.0.0.1:9001"));
        backend.increment_connections();
        backend.increment_connections();
        assert_eq!(backend.active_connections(), 2);
    }

    #[test]
    fn registry_preserves_configuration_order() {
        let registry = BackendRegistry::new(vec![
            url("http://127.0.0.1:9001"),
            url("http://127.0.0.1:9002"),
            url("http://127.0.0.1:9003"),
        ]);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.backends()[0].url().as_str(), "http://127.0.0.1:9001/");
        assert_eq!(registry.backends()[2].url().as_str(), "http://127.0.0.1:9003/");
    }
}
