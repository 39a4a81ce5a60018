//! Token storage on top of an external key-value service.
//!
//! [`RemoteStore`] turns any [`KeyValueBackend`] with native per-key expiry
//! into a [`TokenStore`]. It hashes tokens before they leave the process and
//! keys records as `passwordless-token::<uid>`, so supersession and expiry
//! are handled by the backend's own `SET` and TTL semantics.

use super::{StorageStats, TokenStore};
use crate::token::hashing::{HashedToken, TokenHasher};
use crate::token::{Context, TokenError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Default prefix for record keys.
pub const DEFAULT_KEY_PREFIX: &str = "passwordless-token::";

/// Minimal key-value contract a remote service must offer.
///
/// Values are opaque strings. Every write carries a TTL and the backend is
/// expected to stop returning the key once it elapses.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Connects to the service or prepares its schema.
    async fn init(&self) -> Result<(), TokenError> {
        Ok(())
    }

    /// Sets `key` to `value`, replacing any previous value. `ttl` is never zero.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TokenError>;

    /// Returns the value of a live key.
    async fn get(&self, key: &str) -> Result<Option<String>, TokenError>;

    /// Returns the remaining lifetime of a live key.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, TokenError>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), TokenError>;

    /// Removes `key` and returns its value if it was live, in one atomic step.
    ///
    /// Of several concurrent calls for the same key, at most one sees the value.
    async fn take(&self, key: &str) -> Result<Option<String>, TokenError>;

    /// Counts live keys starting with `prefix`.
    async fn count(&self, prefix: &str) -> Result<usize, TokenError>;

    /// Human readable description for [`StorageStats`].
    fn describe(&self) -> String;
}

#[async_trait]
impl<B: KeyValueBackend + ?Sized> KeyValueBackend for Arc<B> {
    async fn init(&self) -> Result<(), TokenError> {
        (**self).init().await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TokenError> {
        (**self).set(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TokenError> {
        (**self).get(key).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, TokenError> {
        (**self).ttl(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), TokenError> {
        (**self).delete(key).await
    }

    async fn take(&self, key: &str) -> Result<Option<String>, TokenError> {
        (**self).take(key).await
    }

    async fn count(&self, prefix: &str) -> Result<usize, TokenError> {
        (**self).count(prefix).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// A [`TokenStore`] backed by a remote key-value service.
///
/// All instances sharing a backend must share the hashing key, otherwise a
/// token stored by one instance will not verify on another.
///
/// Backend calls run under the context's deadline and cancellation signal.
pub struct RemoteStore<B> {
    backend: B,
    hasher: TokenHasher,
    prefix: String,
}

impl<B: KeyValueBackend> RemoteStore<B> {
    /// Creates a store over `backend`, hashing tokens under `hash_key`.
    pub fn new(backend: B, hash_key: &[u8]) -> Self {
        Self {
            backend,
            hasher: TokenHasher::new(hash_key),
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Replaces the record key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn key(&self, uid: &str) -> String {
        let mut key = String::with_capacity(self.prefix.len() + uid.len());
        key.push_str(&self.prefix);
        key.push_str(uid);
        key
    }
}

#[async_trait]
impl<B: KeyValueBackend> TokenStore for RemoteStore<B> {
    async fn init(&self) -> Result<(), TokenError> {
        self.backend.init().await
    }

    async fn store(
        &self,
        ctx: &Context,
        token: &str,
        uid: &str,
        ttl: Duration,
    ) -> Result<(), TokenError> {
        ctx.check()?;
        let key = self.key(uid);

        // Remote TTLs have millisecond resolution; anything shorter is
        // already expired, but must still supersede the previous token.
        if ttl.as_millis() == 0 {
            return ctx.run(self.backend.delete(&key)).await;
        }

        let hashed = self.hasher.hash(token)?.encode();
        ctx.run(self.backend.set(&key, &hashed, ttl)).await
    }

    async fn exists(&self, ctx: &Context, uid: &str) -> Result<Option<SystemTime>, TokenError> {
        let remaining = ctx.run(self.backend.ttl(&self.key(uid))).await?;
        Ok(remaining.and_then(|d| SystemTime::now().checked_add(d)))
    }

    async fn verify(&self, ctx: &Context, token: &str, uid: &str) -> Result<bool, TokenError> {
        let Some(value) = ctx.run(self.backend.get(&self.key(uid))).await? else {
            return Err(TokenError::TokenNotFound);
        };
        let hashed = HashedToken::decode(&value)?;
        self.hasher.verify(token, &hashed)
    }

    async fn delete(&self, ctx: &Context, uid: &str) -> Result<(), TokenError> {
        ctx.run(self.backend.delete(&self.key(uid))).await
    }

    async fn consume(&self, ctx: &Context, uid: &str) -> Result<bool, TokenError> {
        let taken = ctx.run(self.backend.take(&self.key(uid))).await?;
        Ok(taken.is_some())
    }

    async fn stats(&self) -> Result<StorageStats, TokenError> {
        Ok(StorageStats {
            total_records: self.backend.count(&self.prefix).await?,
            backend_info: self.backend.describe(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Key-value backend with real expiry, standing in for a remote service.
    #[derive(Default)]
    struct FakeBackend {
        entries: Mutex<HashMap<String, (String, Instant)>>,
    }

    impl FakeBackend {
        fn raw(&self, key: &str) -> Option<String> {
            self.entries.lock().unwrap().get(key).map(|(v, _)| v.clone())
        }

        fn live(&self, key: &str) -> Option<(String, Instant)> {
            self.entries
                .lock()
                .unwrap()
                .get(key)
                .filter(|(_, expires)| *expires > Instant::now())
                .cloned()
        }
    }

    #[async_trait]
    impl KeyValueBackend for FakeBackend {
        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), TokenError> {
            assert!(!ttl.is_zero());
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<String>, TokenError> {
            Ok(self.live(key).map(|(v, _)| v))
        }

        async fn ttl(&self, key: &str) -> Result<Option<Duration>, TokenError> {
            Ok(self.live(key).map(|(_, e)| e - Instant::now()))
        }

        async fn delete(&self, key: &str) -> Result<(), TokenError> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }

        async fn take(&self, key: &str) -> Result<Option<String>, TokenError> {
            let removed = self.entries.lock().unwrap().remove(key);
            Ok(removed
                .filter(|(_, expires)| *expires > Instant::now())
                .map(|(v, _)| v))
        }

        async fn count(&self, prefix: &str) -> Result<usize, TokenError> {
            let now = Instant::now();
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, (_, e))| k.starts_with(prefix) && *e > now)
                .count())
        }

        fn describe(&self) -> String {
            "fake key-value backend".to_string()
        }
    }

    /// Backend whose every call fails, or stalls if `delay` is set.
    struct BrokenBackend {
        delay: Option<Duration>,
    }

    impl BrokenBackend {
        async fn fail<T>(&self) -> Result<T, TokenError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Err(TokenError::from_storage_message("connection refused"))
        }
    }

    #[async_trait]
    impl KeyValueBackend for BrokenBackend {
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), TokenError> {
            self.fail().await
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, TokenError> {
            self.fail().await
        }

        async fn ttl(&self, _key: &str) -> Result<Option<Duration>, TokenError> {
            self.fail().await
        }

        async fn delete(&self, _key: &str) -> Result<(), TokenError> {
            self.fail().await
        }

        async fn take(&self, _key: &str) -> Result<Option<String>, TokenError> {
            self.fail().await
        }

        async fn count(&self, _prefix: &str) -> Result<usize, TokenError> {
            self.fail().await
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    const HOUR: Duration = Duration::from_secs(3600);

    fn shared_stores() -> (Arc<FakeBackend>, RemoteStore<Arc<FakeBackend>>) {
        let backend = Arc::new(FakeBackend::default());
        let store = RemoteStore::new(backend.clone(), b"shared_hash_key");
        (backend, store)
    }

    #[tokio::test]
    async fn test_store_and_verify() {
        let (backend, store) = shared_stores();
        let ctx = Context::new();

        store.store(&ctx, "tok", "uid", HOUR).await.unwrap();

        let raw = backend.raw("passwordless-token::uid").unwrap();
        assert!(raw.starts_with("v1$"));
        assert!(!raw.contains("tok"));

        assert!(store.verify(&ctx, "tok", "uid").await.unwrap());
        assert!(!store.verify(&ctx, "bad", "uid").await.unwrap());
        assert!(matches!(
            store.verify(&ctx, "tok", "other").await,
            Err(TokenError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_supersede_and_zero_ttl() {
        let (_backend, store) = shared_stores();
        let ctx = Context::new();

        store.store(&ctx, "tok1", "uid", HOUR).await.unwrap();
        store.store(&ctx, "tok2", "uid", HOUR).await.unwrap();
        assert!(!store.verify(&ctx, "tok1", "uid").await.unwrap());
        assert!(store.verify(&ctx, "tok2", "uid").await.unwrap());

        store.store(&ctx, "tok3", "uid", Duration::ZERO).await.unwrap();
        assert!(matches!(
            store.verify(&ctx, "tok2", "uid").await,
            Err(TokenError::TokenNotFound)
        ));
        assert_eq!(store.exists(&ctx, "uid").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expiry() {
        let (_backend, store) = shared_stores();
        let ctx = Context::new();

        store
            .store(&ctx, "tok", "uid", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(store.exists(&ctx, "uid").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.exists(&ctx, "uid").await.unwrap(), None);
        assert!(matches!(
            store.verify(&ctx, "tok", "uid").await,
            Err(TokenError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_instances_share_records() {
        let backend = Arc::new(FakeBackend::default());
        let first = RemoteStore::new(backend.clone(), b"key");
        let second = RemoteStore::new(backend.clone(), b"key");
        let stranger = RemoteStore::new(backend, b"other_key");
        let ctx = Context::new();

        first.store(&ctx, "tok", "uid", HOUR).await.unwrap();
        assert!(second.verify(&ctx, "tok", "uid").await.unwrap());
        assert!(!stranger.verify(&ctx, "tok", "uid").await.unwrap());

        second.delete(&ctx, "uid").await.unwrap();
        second.delete(&ctx, "uid").await.unwrap();
        assert!(matches!(
            first.verify(&ctx, "tok", "uid").await,
            Err(TokenError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_consume_across_instances() {
        let backend = Arc::new(FakeBackend::default());
        let first = RemoteStore::new(backend.clone(), b"key");
        let second = RemoteStore::new(backend.clone(), b"key");
        let ctx = Context::new();

        first.store(&ctx, "tok", "uid", HOUR).await.unwrap();
        assert!(first.verify(&ctx, "tok", "uid").await.unwrap());
        assert!(second.verify(&ctx, "tok", "uid").await.unwrap());

        // Both saw a valid token; only one may consume it
        assert!(second.consume(&ctx, "uid").await.unwrap());
        assert!(!first.consume(&ctx, "uid").await.unwrap());
        assert!(backend.raw("passwordless-token::uid").is_none());
    }

    #[tokio::test]
    async fn test_corrupted_record_is_storage_error() {
        let (backend, store) = shared_stores();
        backend
            .set("passwordless-token::uid", "garbage", HOUR)
            .await
            .unwrap();

        assert!(matches!(
            store.verify(&Context::new(), "tok", "uid").await,
            Err(TokenError::StorageError(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_and_prefix() {
        let backend = Arc::new(FakeBackend::default());
        let store = RemoteStore::new(backend.clone(), b"key").with_prefix("app:");
        let ctx = Context::new();

        store.store(&ctx, "a", "u1", HOUR).await.unwrap();
        store.store(&ctx, "b", "u2", HOUR).await.unwrap();
        assert!(backend.raw("app:u1").is_some());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.backend_info, "fake key-value backend");
    }

    #[tokio::test]
    async fn test_backend_errors_propagate() {
        let store = RemoteStore::new(BrokenBackend { delay: None }, b"key");
        let ctx = Context::new();

        assert!(matches!(
            store.store(&ctx, "tok", "uid", HOUR).await,
            Err(TokenError::StorageError(_))
        ));
        assert!(matches!(
            store.verify(&ctx, "tok", "uid").await,
            Err(TokenError::StorageError(_))
        ));
        assert!(matches!(
            store.exists(&ctx, "uid").await,
            Err(TokenError::StorageError(_))
        ));
        assert!(matches!(
            store.delete(&ctx, "uid").await,
            Err(TokenError::StorageError(_))
        ));
        assert!(matches!(
            store.consume(&ctx, "uid").await,
            Err(TokenError::StorageError(_))
        ));
    }

    #[tokio::test]
    async fn test_deadline_bounds_backend_calls() {
        let store = RemoteStore::new(
            BrokenBackend {
                delay: Some(Duration::from_secs(10)),
            },
            b"key",
        );
        let ctx = Context::new().with_timeout(Duration::from_millis(20));

        let started = std::time::Instant::now();
        assert!(matches!(
            store.verify(&ctx, "tok", "uid").await,
            Err(TokenError::DeadlineExceeded)
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
