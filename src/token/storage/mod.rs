//! Pluggable storage backends for one-time tokens.
//!
//! This module provides a trait-based storage system that allows different
//! backends to hold issued tokens. The available backends depend on the
//! enabled features.

use crate::token::{Context, TokenError};
use async_trait::async_trait;
use std::time::{Duration, SystemTime};

// Always available
mod memory;
mod remote;
mod sealed;
pub use memory::MemoryStore;
pub use remote::{KeyValueBackend, RemoteStore};
pub use sealed::{EnvelopeJar, SealedStore};

// Feature-gated storage backends
#[cfg(feature = "sqlite-storage")]
mod sqlite;
#[cfg(feature = "sqlite-storage")]
pub use sqlite::{SqliteBackend, SqliteStore};

#[cfg(feature = "redis-storage")]
mod redis;
#[cfg(feature = "redis-storage")]
pub use redis::{RedisBackend, RedisStore};

/// Statistics about a token storage backend.
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Total number of token records currently held
    pub total_records: usize,
    /// Additional backend-specific information
    pub backend_info: String,
}

/// Abstract storage backend for one-time tokens.
///
/// Every backend binds at most one live token to each uid: storing a token
/// for a uid replaces the previous one. Backends never keep the plaintext
/// token; they hash it or seal it.
///
/// # Available Implementations
///
/// - [`MemoryStore`] - in-process map with a background expiry sweep
/// - [`SealedStore`] - stateless, keeps the record in a client-held envelope
/// - [`RemoteStore`] - generic adapter over a [`KeyValueBackend`]
/// - `RedisStore` - available with the `redis-storage` feature
/// - `SqliteStore` - available with the `sqlite-storage` feature
///
/// # Expiry and absence
///
/// `verify` reports both a missing and an expired record as
/// [`TokenError::TokenNotFound`], and `exists` reports both as `None`, so
/// callers cannot tell whether a uid ever requested a token.
///
/// # Error Handling
///
/// Backend failures are mapped to `TokenError::StorageError`; hashing or
/// sealing failures surface as `TokenError::CryptoError` and are never
/// reported as a mere mismatch.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Optional method for storage backend initialization.
    ///
    /// Implementations can use this for tasks like schema creation or
    /// connection checks.
    async fn init(&self) -> Result<(), TokenError> {
        Ok(())
    }

    /// Securely stores `token` for `uid`, expiring after `ttl`.
    ///
    /// Any previous token for `uid` is superseded.
    async fn store(
        &self,
        ctx: &Context,
        token: &str,
        uid: &str,
        ttl: Duration,
    ) -> Result<(), TokenError>;

    /// Returns the expiry of the live token for `uid`, or `None` if there is
    /// no live token.
    async fn exists(&self, ctx: &Context, uid: &str) -> Result<Option<SystemTime>, TokenError>;

    /// Checks `token` against the live token for `uid`.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The token matches
    /// * `Ok(false)` - A live token exists but does not match
    /// * `Err(TokenError::TokenNotFound)` - No live token exists
    /// * `Err(TokenError)` - The backend or a crypto primitive failed
    async fn verify(&self, ctx: &Context, token: &str, uid: &str) -> Result<bool, TokenError>;

    /// Removes the token for `uid`. Deleting a missing token is not an error.
    async fn delete(&self, ctx: &Context, uid: &str) -> Result<(), TokenError>;

    /// Removes the live token for `uid` and reports whether this call removed it.
    ///
    /// Used after a successful verification to make the token single use.
    /// When several callers verify the same token concurrently, exactly one
    /// of them gets `Ok(true)`; the others get `Ok(false)`.
    ///
    /// The default checks [`TokenStore::exists`] and then deletes, which is
    /// not atomic. Backends shared by concurrent callers override it with a
    /// take-and-remove under their own lock or command.
    async fn consume(&self, ctx: &Context, uid: &str) -> Result<bool, TokenError> {
        if self.exists(ctx, uid).await?.is_none() {
            return Ok(false);
        }
        self.delete(ctx, uid).await?;
        Ok(true)
    }

    /// Returns statistics about the storage backend.
    async fn stats(&self) -> Result<StorageStats, TokenError>;
}
