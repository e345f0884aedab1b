//! Load balancing: the backend registry, health checker, and the three
//! pluggable selection strategies.

pub mod backend;
pub mod health;
pub mod least_connections;
pub mod random;
pub mod round_robin;

use std::sync::Arc;

use backend::{Backend, BackendRegistry};

/// A pluggable backend-selection algorithm.
pub trait Strategy: Send + Sync {
    /// Select the next backend to forward a request to, or `None` if no
    /// backend is currently available.
    fn next(&self, registry: &BackendRegistry) -> Option<Arc<Backend>>;
}

/// Build the configured strategy. An unrecognized or empty name falls
/// back to round-robin.
pub fn build_strategy(name: &str) -> Box<dyn Strategy> {
    match name {
        "least_connections" => Box::new(least_connections::LeastConnections::new()),
        "random" => Box::new(random::Random::new()),
        "round_robin" => Box::new(round_robin::RoundRobin::new()),
        other => {
            if !other.is_empty() {
                tracing::warn!(strategy = other, "unrecognized balancing strategy, defaulting to round_robin");
            }
            Box::new(round_robin::RoundRobin::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_strategy_falls_back_to_round_robin() {
        let urls = vec![
            url::Url::parse("http://127.0.0.1:9001").unwrap(),
            url::Url::parse("http://127.0.0.1:9002").unwrap(),
        ];
        let registry = BackendRegistry::new(urls);
        let strategy = build_strategy("something_unknown");

        let first = strategy.next(&registry).unwrap();
        let second = strategy.next(&registry).unwrap();
        assert_ne!(first.url().as_str(), second.url().as_str());
    }
}
