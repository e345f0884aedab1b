//! Least-connections strategy: picks the available backend with the
//! smallest connection counter, first one wins ties.
//!
//! The counter only ever increments (see [`Backend::increment_connections`])
//! so under sustained traffic every available backend's count converges
//! upward together; it is not a live in-flight count.

use std::sync::Arc;

use super::backend::{Backend, BackendRegistry};
use super::Strategy;

#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for LeastConnections {
    fn next(&self, registry: &BackendRegistry) -> Option<Arc<Backend>> {
        let mut selected: Option<Arc<Backend>> = None;
        let mut selected_count = u64::MAX;

        for backend in registry.backends() {
            if !backend.is_available() {
                continue;
            }
            let count = backend.active_connections();
            if selected.is_none() || count < selected_count {
                selected = Some(backend.clone());
                selected_count = count;
            }
        }

        if let Some(backend) = &selected {
            backend.increment_connections();
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn registry(n: usize) -> BackendRegistry {
        let urls = (0..n)
            .map(|i| Url::parse(&format!("http://127.0.0.1:900{i}")).unwrap())
            .collect();
        BackendRegistry::new(urls)
    }

    #[test]
    fn picks_the_first_backend_on_a_tie() {
        let registry = registry(3);
        let lc = LeastConnections::new();
        let chosen = lc.next(&registry).unwrap();
        assert_eq!(chosen.url().as_str(), registry.backends()[0].url().as_str());
    }

    #[test]
    fn picks_the_backend_with_fewer_connections() {
        let registry = registry(2);
        registry.backends()[0].increment_connections();
        registry.backends()[0].increment_connections();

        let lc = LeastConnections::new();
        let chosen = lc.next(&registry).unwrap();
        assert_eq!(chosen.url().as_str(), registry.backends()[1].url().as_str());
    }

    #[test]
    fn skips_unavailable_backends() {
        let registry = registry(2);
        registry.backends()[1].set_available(false);
        registry.backends()[0].increment_connections();

        let lc = LeastConnections::new();
        let chosen = lc.next(&registry).unwrap();
        assert_eq!(chosen.url().as_str(), registry.backends()[0].url().as_str());
    }

    #[test]
    fn returns_none_when_all_unavailable() {
        let registry = registry(2);
        for b in registry.backends() {
            b.set_available(false);
        }
        let lc = LeastConnections::new();
        assert!(lc.next(&registry).is_none());
    }
}
