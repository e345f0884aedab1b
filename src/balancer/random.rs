//! Random strategy: materializes the currently-available backend list
//! and picks uniformly among them.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::backend::{Backend, BackendRegistry};
use super::Strategy;

#[derive(Debug)]
pub struct Random {
    rng: Mutex<StdRng>,
}

impl Random {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl Strategy for Random {
    fn next(&self, registry: &BackendRegistry) -> Option<Arc<Backend>> {
        let available: Vec<&Arc<Backend>> =
            registry.backends().iter().filter(|b| b.is_available()).collect();

        if available.is_empty() {
            return None;
        }

        let idx = self.rng.lock().gen_range(0..available.len());
        Some(available[idx].clone())
    }
}
