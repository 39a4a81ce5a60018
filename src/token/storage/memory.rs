//! In-memory storage backend implementation.
//!
//! This module provides an in-process token store guarded by a single lock,
//! with a background task that periodically sweeps expired records. It's
//! ideal for single-instance deployments and tests.

use super::{StorageStats, TokenStore};
use crate::token::config::PasswordlessConfig;
use crate::token::hashing::{HashedToken, TokenHasher};
use crate::token::time_utils;
use crate::token::{Context, TokenError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct TokenRecord {
    hashed: HashedToken,
    expires_at: SystemTime,
}

#[derive(Debug, Default)]
struct Shared {
    records: Mutex<HashMap<String, TokenRecord>>,
    closed: AtomicBool,
}

impl Shared {
    /// Removes expired records, holding the lock only for one pass over the map.
    async fn sweep(&self) -> usize {
        let now = SystemTime::now();
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| record.expires_at > now);
        before - records.len()
    }
}

/// An in-memory token store with a background expiry sweep.
///
/// Records live in a `HashMap` behind one `tokio::sync::Mutex`. Tokens are
/// hashed with a per-store random key before the lock is taken, so the lock
/// only ever covers map reads and writes. A background task wakes up every
/// sweep interval and drops expired records under the same lock; records
/// that expire between sweeps are still rejected by `verify` and `exists`.
///
/// The store must be created inside a Tokio runtime. Call
/// [`MemoryStore::shutdown`] to stop the sweeper deterministically; dropping
/// the store stops it as well. After shutdown every operation fails with
/// [`TokenError::StoreClosed`].
///
/// # Example
///
/// ```rust
/// use passwordless_auth::{Context, TokenStore, storage::MemoryStore};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), passwordless_auth::TokenError> {
/// let store = MemoryStore::new()?;
/// let ctx = Context::new();
///
/// store.store(&ctx, "482913", "alice", Duration::from_secs(600)).await?;
/// assert!(store.verify(&ctx, "482913", "alice").await?);
///
/// store.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct MemoryStore {
    shared: Arc<Shared>,
    hasher: TokenHasher,
    shutdown_tx: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    sweeper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    /// Creates a store sweeping every 30 seconds.
    pub fn new() -> Result<Self, TokenError> {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    /// Creates a store using the configured sweep interval.
    pub fn with_config(config: &PasswordlessConfig) -> Result<Self, TokenError> {
        Self::with_sweep_interval(config.sweep_interval)
    }

    /// Creates a store sweeping at the given interval.
    ///
    /// A zero interval disables the background sweep; expired records are
    /// then only purged by explicit [`MemoryStore::sweep`] calls.
    pub fn with_sweep_interval(interval: Duration) -> Result<Self, TokenError> {
        let shared = Arc::new(Shared::default());
        let hasher = TokenHasher::random()?;

        let (shutdown_tx, sweeper) = if interval.is_zero() {
            (None, None)
        } else {
            let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
                TokenError::from_storage_message(format!(
                    "memory store requires a Tokio runtime: {e}"
                ))
            })?;
            let (tx, rx) = oneshot::channel();
            let handle = runtime.spawn(run_sweeper(Arc::clone(&shared), interval, rx));
            (Some(tx), Some(handle))
        };

        tracing::debug!(?interval, "memory token store started");
        Ok(Self {
            shared,
            hasher,
            shutdown_tx: std::sync::Mutex::new(shutdown_tx),
            sweeper: std::sync::Mutex::new(sweeper),
        })
    }

    /// Removes all expired records now and returns how many were removed.
    pub async fn sweep(&self) -> usize {
        self.shared.sweep().await
    }

    /// Stops the background sweep and releases all records.
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let tx = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = tx {
            let _ = tx.send(());
        }

        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "token sweeper ended abnormally");
            }
        }

        self.shared.records.lock().await.clear();
        tracing::debug!("memory token store shut down");
    }

    /// Returns `true` once [`MemoryStore::shutdown`] has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self, ctx: &Context) -> Result<(), TokenError> {
        if self.is_closed() {
            return Err(TokenError::StoreClosed);
        }
        ctx.check()
    }
}

async fn run_sweeper(shared: Arc<Shared>, period: Duration, mut shutdown: oneshot::Receiver<()>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            // A dropped sender also ends the sweep.
            _ = &mut shutdown => break,
            _ = interval.tick() => {
                let removed = shared.sweep().await;
                if removed > 0 {
                    tracing::debug!(removed, "swept expired tokens");
                }
            }
        }
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn store(
        &self,
        ctx: &Context,
        token: &str,
        uid: &str,
        ttl: Duration,
    ) -> Result<(), TokenError> {
        self.ensure_open(ctx)?;

        let record = TokenRecord {
            hashed: self.hasher.hash(token)?,
            expires_at: time_utils::expiry_from_now(ttl),
        };

        self.shared
            .records
            .lock()
            .await
            .insert(uid.to_string(), record);
        Ok(())
    }

    async fn exists(&self, ctx: &Context, uid: &str) -> Result<Option<SystemTime>, TokenError> {
        self.ensure_open(ctx)?;

        let records = self.shared.records.lock().await;
        Ok(records
            .get(uid)
            .filter(|record| !time_utils::is_expired(record.expires_at))
            .map(|record| record.expires_at))
    }

    async fn verify(&self, ctx: &Context, token: &str, uid: &str) -> Result<bool, TokenError> {
        self.ensure_open(ctx)?;

        let record = self.shared.records.lock().await.get(uid).cloned();
        let Some(record) = record else {
            return Err(TokenError::TokenNotFound);
        };
        // Not swept yet
        if time_utils::is_expired(record.expires_at) {
            return Err(TokenError::TokenNotFound);
        }

        self.hasher.verify(token, &record.hashed)
    }

    async fn delete(&self, ctx: &Context, uid: &str) -> Result<(), TokenError> {
        self.ensure_open(ctx)?;
        self.shared.records.lock().await.remove(uid);
        Ok(())
    }

    async fn consume(&self, ctx: &Context, uid: &str) -> Result<bool, TokenError> {
        self.ensure_open(ctx)?;
        let removed = self.shared.records.lock().await.remove(uid);
        Ok(removed.is_some_and(|record| !time_utils::is_expired(record.expires_at)))
    }

    async fn stats(&self) -> Result<StorageStats, TokenError> {
        let total_records = self.shared.records.lock().await.len();
        Ok(StorageStats {
            total_records,
            backend_info: format!(
                "In-memory HashMap storage (~{} bytes)",
                total_records * std::mem::size_of::<TokenRecord>()
            ),
        })
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        let tx = self
            .shutdown_tx
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
    }
}
