//! SQLite key-value backend.
//!
//! This module provides a [`KeyValueBackend`] on a single SQLite table, so
//! tokens survive restarts of a single-instance deployment. Expiry is
//! enforced on every read; [`SqliteBackend::purge_expired`] reclaims space.

use super::remote::{KeyValueBackend, RemoteStore};
use crate::token::TokenError;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Token store persisted in SQLite.
pub type SqliteStore = RemoteStore<SqliteBackend>;

/// SQLite-based key-value backend.
///
/// # Example
///
/// ```rust
/// use passwordless_auth::{Context, TokenStore};
/// use passwordless_auth::storage::{SqliteBackend, SqliteStore};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), passwordless_auth::TokenError> {
/// let store = SqliteStore::new(SqliteBackend::new(":memory:")?, b"hash-key");
/// store.init().await?;
///
/// let ctx = Context::new();
/// store.store(&ctx, "482913", "alice", Duration::from_secs(600)).await?;
/// assert!(store.verify(&ctx, "482913", "alice").await?);
/// # Ok(())
/// # }
/// ```
pub struct SqliteBackend {
    connection: Arc<Mutex<Connection>>,
}

fn db_error(e: rusqlite::Error) -> TokenError {
    TokenError::from_storage_message(format!("SQLite error: {e}"))
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl SqliteBackend {
    /// Opens the database at `db_path`, or an in-memory database for `":memory:"`.
    pub fn new(db_path: &str) -> Result<Self, TokenError> {
        let connection = if db_path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(db_path)
        };

        Ok(Self {
            connection: Arc::new(Mutex::new(connection.map_err(db_error)?)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, TokenError> {
        self.connection
            .lock()
            .map_err(|_| TokenError::from_storage_message("SQLite connection lock poisoned"))
    }

    fn init_schema(&self) -> Result<(), TokenError> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS passwordless_token (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(db_error)?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_passwordless_expires_at ON passwordless_token (expires_at)",
            [],
        )
        .map_err(db_error)?;

        Ok(())
    }

    /// Deletes expired rows and returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, TokenError> {
        self.conn()?
            .execute(
                "DELETE FROM passwordless_token WHERE expires_at <= ?1",
                params![now_millis()],
            )
            .map_err(db_error)
    }

    fn live_expiry(&self, key: &str) -> Result<Option<i64>, TokenError> {
        self.conn()?
            .query_row(
                "SELECT expires_at FROM passwordless_token WHERE key = ?1 AND expires_at > ?2",
                params![key, now_millis()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)
    }
}

#[async_trait]
impl KeyValueBackend for SqliteBackend {
    async fn init(&self) -> Result<(), TokenError> {
        self.init_schema()
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TokenError> {
        let expires_at = now_millis().saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64);

        self.conn()?
            .execute(
                r#"
                INSERT INTO passwordless_token (key, value, expires_at) VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
                "#,
                params![key, value, expires_at],
            )
            .map_err(db_error)?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TokenError> {
        self.conn()?
            .query_row(
                "SELECT value FROM passwordless_token WHERE key = ?1 AND expires_at > ?2",
                params![key, now_millis()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, TokenError> {
        Ok(self.live_expiry(key)?.map(|expires_at| {
            Duration::from_millis(expires_at.saturating_sub(now_millis()).max(0) as u64)
        }))
    }

    async fn delete(&self, key: &str) -> Result<(), TokenError> {
        self.conn()?
            .execute(
                "DELETE FROM passwordless_token WHERE key = ?1",
                params![key],
            )
            .map_err(db_error)?;
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, TokenError> {
        // The row goes whether or not it is still live
        let taken: Option<(String, i64)> = self
            .conn()?
            .query_row(
                "DELETE FROM passwordless_token WHERE key = ?1 RETURNING value, expires_at",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_error)?;

        let now = now_millis();
        Ok(taken
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value))
    }

    async fn count(&self, prefix: &str) -> Result<usize, TokenError> {
        self.conn()?
            .query_row(
                "SELECT COUNT(*) FROM passwordless_token WHERE substr(key, 1, length(?1)) = ?1 AND expires_at > ?2",
                params![prefix, now_millis()],
                |row| row.get(0),
            )
            .map_err(db_error)
    }

    fn describe(&self) -> String {
        let Ok(conn) = self.conn() else {
            return "SQLite storage".to_string();
        };

        let page_count: i64 = conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap_or(0);
        let page_size: i64 = conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap_or(4096);

        format!(
            "SQLite storage ({} bytes, {} pages)",
            page_count * page_size,
            page_count
        )
    }
}
