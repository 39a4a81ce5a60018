//! Redis key-value backend.
//!
//! This module provides a Redis-based [`KeyValueBackend`] for deployments
//! where several instances must see the same tokens. Redis expires keys
//! natively, so no sweep is needed.

use super::remote::{KeyValueBackend, RemoteStore};
use crate::token::TokenError;
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Token store shared through Redis.
pub type RedisStore = RemoteStore<RedisBackend>;

fn redis_error(e: redis::RedisError) -> TokenError {
    TokenError::from_storage_message(format!("Redis error: {e}"))
}

/// Redis-based key-value backend.
///
/// One multiplexed connection is shared by all calls and re-established
/// when it stops answering `PING`.
///
/// # Example
///
/// ```rust
/// use passwordless_auth::storage::{RedisBackend, RedisStore};
///
/// # fn example() -> Result<(), passwordless_auth::TokenError> {
/// let store = RedisStore::new(RedisBackend::new("redis://localhost:6379")?, b"shared-hash-key");
/// # Ok(())
/// # }
/// ```
pub struct RedisBackend {
    client: Client,
    conn: Arc<Mutex<Option<MultiplexedConnection>>>,
}

impl RedisBackend {
    /// Creates a backend for the Redis server at `redis_url`.
    ///
    /// No connection is made until the first call.
    pub fn new(redis_url: &str) -> Result<Self, TokenError> {
        let client = Client::open(redis_url)
            .map_err(|e| TokenError::from_storage_message(format!("Redis client error: {e}")))?;

        Ok(Self {
            client,
            conn: Arc::new(Mutex::new(None)),
        })
    }

    async fn get_connection(&self) -> Result<MultiplexedConnection, TokenError> {
        let mut conn_guard = self.conn.lock().await;

        if let Some(conn) = conn_guard.as_ref() {
            let mut probe = conn.clone();
            match redis::cmd("PING").query_async::<_, String>(&mut probe).await {
                Ok(_) => return Ok(conn.clone()),
                Err(e) => {
                    tracing::debug!(error = %e, "dropping dead Redis connection");
                    *conn_guard = None;
                }
            }
        }

        let new_conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| {
                TokenError::from_storage_message(format!("Redis connection failed: {e}"))
            })?;

        *conn_guard = Some(new_conn.clone());
        Ok(new_conn)
    }
}

#[async_trait]
impl KeyValueBackend for RedisBackend {
    async fn init(&self) -> Result<(), TokenError> {
        let mut conn = self.get_connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| TokenError::from_storage_message(format!("Redis ping failed: {e}")))?;
        Ok(())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TokenError> {
        let mut conn = self.get_connection().await?;
        let ttl_ms = ttl.as_millis().clamp(1, u64::MAX as u128) as u64;

        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(redis_error)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TokenError> {
        let mut conn = self.get_connection().await?;
        conn.get(key).await.map_err(redis_error)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, TokenError> {
        let mut conn = self.get_connection().await?;
        // -2 for a missing key, -1 for a key without expiry
        let remaining: i64 = conn.pttl(key).await.map_err(redis_error)?;
        Ok((remaining > 0).then(|| Duration::from_millis(remaining as u64)))
    }

    async fn delete(&self, key: &str) -> Result<(), TokenError> {
        let mut conn = self.get_connection().await?;
        let _: usize = conn.del(key).await.map_err(redis_error)?;
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, TokenError> {
        let mut conn = self.get_connection().await?;
        // GETDEL needs Redis 6.2
        redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(redis_error)
    }

    async fn count(&self, prefix: &str) -> Result<usize, TokenError> {
        let mut conn = self.get_connection().await?;
        let pattern = format!("{prefix}*");
        let mut total = 0;
        let mut cursor = 0u64;

        // SCAN rather than KEYS so large keyspaces don't block the server
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(redis_error)?;

            total += batch.len();
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(total)
    }

    fn describe(&self) -> String {
        format!(
            "Redis storage ({}, persistent conn)",
            self.client.get_connection_info().addr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Context, TokenStore};

    const HOUR: Duration = Duration::from_secs(3600);

    // These tests need a Redis server on localhost and are skipped without one.
    async fn get_test_store(prefix: &str) -> Option<RedisStore> {
        let backend = RedisBackend::new("redis://localhost:6379").ok()?;
        let store = RedisStore::new(backend, b"test_hash_key").with_prefix(prefix);

        match store.init().await {
            Ok(()) => Some(store),
            Err(_) => {
                println!("Skipping Redis tests - no Redis server available");
                None
            }
        }
    }

    #[tokio::test]
    async fn test_redis_store_basic_operations() {
        let Some(store) = get_test_store("test-passwordless-basic::").await else {
            return;
        };
        let ctx = Context::new();

        store.store(&ctx, "tok", "uid", HOUR).await.unwrap();
        assert!(store.exists(&ctx, "uid").await.unwrap().is_some());
        assert!(store.verify(&ctx, "tok", "uid").await.unwrap());
        assert!(!store.verify(&ctx, "bad", "uid").await.unwrap());

        store.delete(&ctx, "uid").await.unwrap();
        assert!(matches!(
            store.verify(&ctx, "tok", "uid").await,
            Err(TokenError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_redis_store_consume() {
        let Some(store) = get_test_store("test-passwordless-consume::").await else {
            return;
        };
        let ctx = Context::new();

        store.store(&ctx, "tok", "uid", HOUR).await.unwrap();
        assert!(store.consume(&ctx, "uid").await.unwrap());
        assert!(!store.consume(&ctx, "uid").await.unwrap());
        assert_eq!(store.exists(&ctx, "uid").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_redis_store_ttl() {
        let Some(store) = get_test_store("test-passwordless-ttl::").await else {
            return;
        };
        let ctx = Context::new();

        store
            .store(&ctx, "tok", "uid", Duration::from_millis(100))
            .await
            .unwrap();
        assert!(store.exists(&ctx, "uid").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.exists(&ctx, "uid").await.unwrap(), None);
        assert!(matches!(
            store.verify(&ctx, "tok", "uid").await,
            Err(TokenError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_redis_store_stats() {
        let Some(store) = get_test_store("test-passwordless-stats::").await else {
            return;
        };
        let ctx = Context::new();

        store.store(&ctx, "a", "u1", HOUR).await.unwrap();
        store.store(&ctx, "b", "u2", HOUR).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_records, 2);
        assert!(stats.backend_info.contains("Redis"));

        store.delete(&ctx, "u1").await.unwrap();
        store.delete(&ctx, "u2").await.unwrap();
    }
}
