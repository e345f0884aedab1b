//! Persistent client store: the durable half of the rate limiter's
//! two-tier consistency model, backed by SQLite.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

/// A persisted rate-limit client record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitClient {
    pub client_id: String,
    pub capacity: i64,
    pub rate_per_second: i64,
    pub tokens: i64,
    pub last_refill_at: i64,
}

/// Durable storage for [`RateLimitClient`] records.
///
/// A missing row on lookup is surfaced as [`StoreError::NotFound`], never
/// silently auto-provisioned.
#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn get_by_id(&self, client_id: &str) -> Result<RateLimitClient, StoreError>;
    async fn get_all(&self) -> Result<Vec<RateLimitClient>, StoreError>;
    async fn update(&self, client: &RateLimitClient) -> Result<(), StoreError>;
    async fn create(&self, client: &RateLimitClient) -> Result<(), StoreError>;
    async fn delete(&self, client_id: &str) -> Result<(), StoreError>;
}

/// SQLite-backed implementation. `rusqlite::Connection` is not `Send`-safe
/// to share across await points, so access is serialized behind a
/// `parking_lot::Mutex` and every call is synchronous from SQLite's point
/// of view; the `async_trait` surface lets callers treat it uniformly with
/// any future networked store.
pub struct SqliteClientStore {
    conn: Mutex<Connection>,
}

impl SqliteClientStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS rate_limit_clients (
                client_id       TEXT PRIMARY KEY,
                capacity        INTEGER NOT NULL,
                rate_per_second INTEGER NOT NULL,
                tokens          INTEGER NOT NULL,
                last_refill_at  INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }
}

fn row_to_client(row: &rusqlite::Row<'_>) -> rusqlite::Result<RateLimitClient> {
    Ok(RateLimitClient {
        client_id: row.get(0)?,
        capacity: row.get(1)?,
        rate_per_second: row.get(2)?,
        tokens: row.get(3)?,
        last_refill_at: row.get(4)?,
    })
}

#[async_trait]
impl ClientStore for SqliteClientStore {
    async fn get_by_id(&self, client_id: &str) -> Result<RateLimitClient, StoreError> {
        let conn = self.conn.lock();
        let client = conn
            .query_row(
                "SELECT client_id, capacity, rate_per_second, tokens, last_refill_at
                 FROM rate_limit_clients WHERE client_id = ?1",
                params![client_id],
                row_to_client,
            )
            .optional()?;
        client.ok_or_else(|| StoreError::NotFound(client_id.to_string()))
    }

    async fn get_all(&self) -> Result<Vec<RateLimitClient>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT client_id, capacity, rate_per_second, tokens, last_refill_at
             FROM rate_limit_clients",
        )?;
        let rows = stmt.query_map([], row_to_client)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    async fn update(&self, client: &RateLimitClient) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "UPDATE rate_limit_clients
             SET capacity = ?2, rate_per_second = ?3, tokens = ?4, last_refill_at = ?5
             WHERE client_id = ?1",
            params![
                client.client_id,
                client.capacity,
                client.rate_per_second,
                client.tokens,
                client.last_refill_at,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NoRowsAffected(client.client_id.clone()));
        }
        Ok(())
    }

    async fn create(&self, client: &RateLimitClient) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM rate_limit_clients WHERE client_id = ?1",
                params![client.client_id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(StoreError::AlreadyExists(client.client_id.clone()));
        }
        conn.execute(
            "INSERT INTO rate_limit_clients
             (client_id, capacity, rate_per_second, tokens, last_refill_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                client.client_id,
                client.capacity,
                client.rate_per_second,
                client.tokens,
                client.last_refill_at,
            ],
        )?;
        Ok(())
    }

    async fn delete(&self, client_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "DELETE FROM rate_limit_clients WHERE client_id = ?1",
            params![client_id],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(client_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(id: &str) -> RateLimitClient {
        RateLimitClient {
            client_id: id.to_string(),
            capacity: 10,
            rate_per_second: 1,
            tokens: 10,
            last_refill_at: 1_000,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = SqliteClientStore::open_in_memory().unwrap();
        store.create(&client("k1")).await.unwrap();
        let fetched = store.get_by_id("k1").await.unwrap();
        assert_eq!(fetched, client("k1"));
    }

    #[tokio::test]
    async fn get_missing_client_is_not_found() {
        let store = SqliteClientStore::open_in_memory().unwrap();
        let err = store.get_by_id("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn create_twice_is_already_exists() {
        let store = SqliteClientStore::open_in_memory().unwrap();
        store.create(&client("k1")).await.unwrap();
        let err = store.create(&client("k1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn update_missing_client_reports_no_rows_affected() {
        let store = SqliteClientStore::open_in_memory().unwrap();
        let err = store.update(&client("ghost")).await.unwrap_err();
        assert!(matches!(err, StoreError::NoRowsAffected(_)));
    }

    #[tokio::test]
    async fn update_persists_new_token_count() {
        let store = SqliteClientStore::open_in_memory().unwrap();
        store.create(&client("k1")).await.unwrap();
        let mut updated = client("k1");
        updated.tokens = 3;
        updated.last_refill_at = 2_000;
        store.update(&updated).await.unwrap();

        let fetched = store.get_by_id("k1").await.unwrap();
        assert_eq!(fetched.tokens, 3);
        assert_eq!(fetched.last_refill_at, 2_000);
    }

    #[tokio::test]
    async fn delete_missing_client_is_not_found() {
        let store = SqliteClientStore::open_in_memory().unwrap();
        let err = store.delete("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_all_returns_every_client() {
        let store = SqliteClientStore::open_in_memory().unwrap();
        store.create(&client("k1")).await.unwrap();
        store.create(&client("k2")).await.unwrap();
        let mut all = store.get_all().await.unwrap();
        all.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].client_id, "k1");
        assert_eq!(all[1].client_id, "k2");
    }
}
