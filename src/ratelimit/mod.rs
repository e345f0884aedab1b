//! Token Bucket Engine: the in-memory cache of per-client bucket state,
//! the `Allow` decision, and the three background loops that keep it
//! consistent with the persistent Client Store.

pub mod gate;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::retry::{retry_anyhow, RetryConfig};
use store::{ClientStore, RateLimitClient};

/// In-memory bucket state; a superset of the persistent record.
#[derive(Debug, Clone)]
struct RateLimitState {
    capacity: i64,
    rate_per_second: i64,
    tokens: i64,
    last_refill_at: i64,
    dirty: bool,
    last_seen: Instant,
}

impl RateLimitState {
    fn from_record(record: &RateLimitClient) -> Self {
        Self {
            capacity: record.capacity,
            rate_per_second: record.rate_per_second,
            tokens: record.tokens,
            last_refill_at: record.last_refill_at,
            dirty: false,
            last_seen: Instant::now(),
        }
    }

    fn to_record(&self, client_id: &str) -> RateLimitClient {
        RateLimitClient {
            client_id: client_id.to_string(),
            capacity: self.capacity,
            rate_per_second: self.rate_per_second,
            tokens: self.tokens,
            last_refill_at: self.last_refill_at,
        }
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// The refill formula shared by `Allow` and the store-wide replenish loop:
/// `tokens = min(tokens + elapsed * rate, capacity)`. Deliberately unclamped
/// on `elapsed`; see DESIGN.md for the reasoning.
fn refill_tokens(tokens: i64, capacity: i64, rate_per_second: i64, elapsed: i64) -> i64 {
    (tokens + elapsed * rate_per_second).min(capacity)
}

/// Write a client record to the store, retrying transient failures
/// (lock contention, connection hiccups) with backoff before giving up.
async fn retry_store_update(store: &Arc<dyn ClientStore>, record: &RateLimitClient) -> anyhow::Result<()> {
    let config = RetryConfig::default();
    retry_anyhow(&config, "client store update", || async move {
        store.update(record).await.map_err(anyhow::Error::from)
    })
    .await
}

/// List every client record from the store, retrying transient failures
/// with backoff before giving up.
async fn retry_store_get_all(store: &Arc<dyn ClientStore>) -> anyhow::Result<Vec<RateLimitClient>> {
    let config = RetryConfig::default();
    retry_anyhow(&config, "client store get_all", || async move {
        store.get_all().await.map_err(anyhow::Error::from)
    })
    .await
}

/// The rate-limiting engine: in-memory cache plus the store it is backed by.
pub struct Engine {
    clients: Mutex<HashMap<String, RateLimitState>>,
    store: Arc<dyn ClientStore>,
}

impl Engine {
    pub fn new(store: Arc<dyn ClientStore>) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Decide whether `client_id` may proceed: look up or load the bucket,
    /// refill it to `now`, and admit iff at least one token is available.
    /// The engine lock is held across the store call on a cache miss, so
    /// `Allow` is linearizable per client id.
    pub async fn allow(&self, client_id: &str) -> Result<bool, StoreError> {
        let mut clients = self.clients.lock().await;
        let now = now_unix();

        if !clients.contains_key(client_id) {
            let record = self.store.get_by_id(client_id).await?;
            clients.insert(client_id.to_string(), RateLimitState::from_record(&record));
        }

        let state = clients.get_mut(client_id).expect("just inserted or already present");

        let elapsed = now - state.last_refill_at;
        state.tokens = refill_tokens(state.tokens, state.capacity, state.rate_per_second, elapsed);
        state.last_refill_at = now;
        state.last_seen = Instant::now();

        if state.tokens < 1 {
            return Ok(false);
        }

        state.tokens -= 1;
        state.dirty = true;
        Ok(true)
    }

    /// Write-back sync: snapshot every dirty entry, clear its flag, then
    /// write each one to the store outside the lock. A failed write
    /// re-dirties its entry so the next tick retries it.
    async fn sync_to_store(&self) {
        let dirty: Vec<(String, RateLimitClient)> = {
            let mut clients = self.clients.lock().await;
            let mut out = Vec::new();
            for (id, state) in clients.iter_mut() {
                if state.dirty {
                    state.dirty = false;
                    out.push((id.clone(), state.to_record(id)));
                }
            }
            out
        };

        for (id, record) in dirty {
            if let Err(e) = retry_store_update(&self.store, &record).await {
                warn!(client = %id, error = %e, "write-back failed, re-dirtying entry");
                let mut clients = self.clients.lock().await;
                if let Some(state) = clients.get_mut(&id) {
                    state.dirty = true;
                }
            }
        }
    }

    /// Store-driven unconditional refill: replenish every persisted
    /// client's bucket regardless of in-memory cache state. The only path
    /// that advances `last_refill_at` for clients not currently cached.
    async fn replenish_store(&self) {
        let clients = match retry_store_get_all(&self.store).await {
            Ok(clients) => clients,
            Err(e) => {
                error!(error = %e, "replenish tick: failed to list clients");
                return;
            }
        };

        let now = now_unix();
        for mut client in clients {
            let elapsed = now - client.last_refill_at;
            client.tokens = refill_tokens(client.tokens, client.capacity, client.rate_per_second, elapsed);
            client.last_refill_at = now;
            if let Err(e) = retry_store_update(&self.store, &client).await {
                error!(client = %client.client_id, error = %e, "replenish tick: failed to write back");
                return;
            }
        }
    }

    /// Inactive-entry cleanup: evict cached entries idle longer than
    /// `inactive_after`. Dirty entries are not exempted.
    async fn cleanup_inactive(&self, inactive_after: Duration) {
        let mut clients = self.clients.lock().await;
        clients.retain(|_, state| state.last_seen.elapsed() <= inactive_after);
    }

    /// Spawn the three background loops (write-back sync, store-wide
    /// replenish, inactive cleanup) sharing one cancellation signal.
    pub fn spawn_workers(
        engine: Arc<Engine>,
        sync_interval: Duration,
        replenish_interval: Duration,
        cleanup_interval: Duration,
        inactive_after: Duration,
        shutdown: watch::Receiver<bool>,
    ) {
        tokio::spawn(run_loop("write-back sync", sync_interval, shutdown.clone(), {
            let engine = engine.clone();
            move || {
                let engine = engine.clone();
                async move { engine.sync_to_store().await }
            }
        }));

        tokio::spawn(run_loop("store replenish", replenish_interval, shutdown.clone(), {
            let engine = engine.clone();
            move || {
                let engine = engine.clone();
                async move { engine.replenish_store().await }
            }
        }));

        tokio::spawn(run_loop("inactive cleanup", cleanup_interval, shutdown, {
            let engine = engine.clone();
            move || {
                let engine = engine.clone();
                async move { engine.cleanup_inactive(inactive_after).await }
            }
        }));
    }

    /// Evict a client's cached entry so the next `Allow` reloads it from
    /// the store. Called by admin mutations so a direct store write isn't
    /// shadowed by stale cached state.
    pub async fn evict(&self, client_id: &str) {
        self.clients.lock().await.remove(client_id);
    }
}

/// Run `tick` on `interval` until `shutdown` fires, exiting within one
/// tick boundary.
async fn run_loop<F, Fut>(name: &'static str, interval: Duration, mut shutdown: watch::Receiver<bool>, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tick().await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(worker = name, "background worker shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::store::SqliteClientStore;
    use super::*;

    fn client(id: &str, capacity: i64, rate: i64, tokens: i64, last_refill_at: i64) -> RateLimitClient {
        RateLimitClient {
            client_id: id.to_string(),
            capacity,
            rate_per_second: rate,
            tokens,
            last_refill_at,
        }
    }

    #[tokio::test]
    async fn allow_admits_while_tokens_remain() {
        let store = Arc::new(SqliteClientStore::open_in_memory().unwrap());
        store.create(&client("k1", 5, 1, 5, now_unix())).await.unwrap();
        let engine = Engine::new(store);

        for _ in 0..5 {
            assert!(engine.allow("k1").await.unwrap());
        }
        assert!(!engine.allow("k1").await.unwrap());
    }

    #[tokio::test]
    async fn allow_refills_tokens_over_time() {
        let store = Arc::new(SqliteClientStore::open_in_memory().unwrap());
        let stale = now_unix() - 5;
        store.create(&client("k1", 5, 1, 0, stale)).await.unwrap();
        let engine = Engine::new(store);

        assert!(engine.allow("k1").await.unwrap());
    }

    #[tokio::test]
    async fn allow_propagates_store_error_on_missing_client() {
        let store = Arc::new(SqliteClientStore::open_in_memory().unwrap());
        let engine = Engine::new(store);
        let err = engine.allow("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn sync_writes_back_dirty_entries_and_clears_flag() {
        let store = Arc::new(SqliteClientStore::open_in_memory().unwrap());
        store.create(&client("k1", 10, 1, 10, now_unix())).await.unwrap();
        let engine = Engine::new(store.clone());

        engine.allow("k1").await.unwrap();
        engine.allow("k1").await.unwrap();
        engine.allow("k1").await.unwrap();
        engine.sync_to_store().await;

        let persisted = store.get_by_id("k1").await.unwrap();
        assert_eq!(persisted.tokens, 7);

        let clients = engine.clients.lock().await;
        assert!(!clients.get("k1").unwrap().dirty);
    }

    #[tokio::test]
    async fn cleanup_evicts_entries_past_inactive_after() {
        let store = Arc::new(SqliteClientStore::open_in_memory().unwrap());
        store.create(&client("k1", 10, 1, 10, now_unix())).await.unwrap();
        let engine = Engine::new(store);
        engine.allow("k1").await.unwrap();

        engine.cleanup_inactive(Duration::from_secs(0)).await;
        assert!(engine.clients.lock().await.is_empty());
    }

    #[tokio::test]
    async fn evict_forces_reload_from_store_on_next_allow() {
        let store = Arc::new(SqliteClientStore::open_in_memory().unwrap());
        store.create(&client("k1", 10, 1, 10, now_unix())).await.unwrap();
        let engine = Engine::new(store.clone());
        engine.allow("k1").await.unwrap();

        engine.evict("k1").await;
        assert!(engine.clients.lock().await.is_empty());
    }
}

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::refill_tokens;

    proptest! {
        /// After a refill, tokens never leaves `[0, capacity]`.
        #[test]
        fn refill_stays_within_capacity(
            capacity in 0i64..1_000_000,
            rate in 0i64..10_000,
            tokens in 0i64..1_000_000,
            elapsed in 0i64..1_000_000,
        ) {
            let tokens = tokens.min(capacity);
            let refilled = refill_tokens(tokens, capacity, rate, elapsed);
            prop_assert!(refilled >= 0);
            prop_assert!(refilled <= capacity);
        }

        /// Refilling never loses tokens: the result is never less than the
        /// pre-call count for non-negative `elapsed` and `rate`.
        #[test]
        fn refill_never_decreases_for_nonnegative_elapsed(
            capacity in 0i64..1_000_000,
            rate in 0i64..10_000,
            tokens in 0i64..1_000_000,
            elapsed in 0i64..1_000_000,
        ) {
            let tokens = tokens.min(capacity);
            let refilled = refill_tokens(tokens, capacity, rate, elapsed);
            prop_assert!(refilled >= tokens.min(capacity));
        }

        /// Zero elapsed time is a no-op modulo the capacity clamp.
        #[test]
        fn zero_elapsed_is_identity(
            capacity in 0i64..1_000_000,
            rate in 0i64..10_000,
            tokens in 0i64..1_000_000,
        ) {
            let tokens = tokens.min(capacity);
            prop_assert_eq!(refill_tokens(tokens, capacity, rate, 0), tokens);
        }
    }
}
