//! Round-robin strategy: cycles through backends in configuration order,
//! skipping unavailable ones, and advances the cursor past whichever
//! backend it returns.

use std::sync::Arc;

use parking_lot::Mutex;

use super::backend::{Backend, BackendRegistry};
use super::Strategy;

#[derive(Debug)]
pub struct RoundRobin {
    cursor: Mutex<usize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            cursor: Mutex::new(0),
        }
    }
}

impl Strategy for RoundRobin {
    fn next(&self, registry: &BackendRegistry) -> Option<Arc<Backend>> {
        let backends = registry.backends();
        let len = backends.len();
        if len == 0 {
            return None;
        }

        let mut cursor = self.cursor.lock();
        let start = *cursor % len;
        for offset in 0..len {
            let idx = (start + offset) % len;
            if backends[idx].is_available() {
                *cursor = (idx + 1) % len;
                return Some(backends[idx].clone());
            }
        }
        None
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
    fn cycles_through_backends_in_order() {
        let registry = registry(3);
        let rr = RoundRobin::new();

        let first = rr.next(&registry).unwrap();
        let second = rr.next(&registry).unwrap();
        let third = rr.next(&registry).unwrap();
        let fourth = rr.next(&registry).unwrap();

        assert_eq!(first.url().as_str(), registry.backends()[0].url().as_str());
        assert_eq!(second.url().as_str(), registry.backends()[1].url().as_str());
        assert_eq!(third.url().as_str(), registry.backends()[2].url().as_str());
        assert_eq!(fourth.url().as_str(), registry.backends()[0].url().as_str());
    }

    #[test]
    fn skips_unavailable_backends() {
        let registry = registry(3);
        registry.backends()[1].set_available(false);
        let rr = RoundRobin::new();

        for _ in 0..4 {
            let chosen = rr.next(&registry).unwrap();
            assert_ne!(chosen.url().as_str(), registry.backends()[1].url().as_str());
        }
    }

    #[test]
    fn skipping_an_unavailable_backend_does_not_skew_the_cycle() {
        let registry = registry(3);
        registry.backends()[0].set_available(false);
        let rr = RoundRobin::new();

        let sequence: Vec<_> = (0..4)
            .map(|_| rr.next(&registry).unwrap().url().as_str().to_string())
            .collect();

        assert_eq!(sequence[0], registry.backends()[1].url().as_str());
        assert_eq!(sequence[1], registry.backends()[2].url().as_str());
        assert_eq!(sequence[2], registry.backends()[1].url().as_str());
        assert_eq!(sequence[3], registry.backends()[2].url().as_str());
    }

    #[test]
    fn returns_none_when_all_unavailable() {
        let registry = registry(2);
        for b in registry.backends() {
            b.set_available(false);
        }
        let rr = RoundRobin::new();
        assert!(rr.next(&registry).is_none());
    }
}
