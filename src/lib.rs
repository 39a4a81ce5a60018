//! # passwordless-auth
//!
//! One-time token authentication: issue short-lived tokens bound to a user
//! identifier, deliver them over a pluggable transport, and verify them once.
//!
//! ## Quick Start
//!
//! ```rust
//! use passwordless_auth::{Context, LogTransport, Passwordless, PinGenerator};
//! use passwordless_auth::storage::MemoryStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), passwordless_auth::TokenError> {
//! let store = Arc::new(MemoryStore::new()?);
//! let mut auth = Passwordless::new(store.clone());
//! auth.set_transport(
//!     "sms",
//!     Arc::new(LogTransport::new()),
//!     Arc::new(PinGenerator::new(6)),
//!     Duration::from_secs(300),
//! );
//!
//! let ctx = Context::new();
//! auth.request_token(&ctx, "sms", "alice", "+15550100").await?;
//!
//! // Later, with the PIN the user typed in:
//! match auth.verify_sanitized(&ctx, "sms", "alice", "4829I3").await {
//!     Ok(true) => println!("signed in"),
//!     Ok(false) => println!("wrong PIN"),
//!     Err(e) if e.is_not_found() => println!("PIN expired, request a new one"),
//!     Err(e) => return Err(e),
//! }
//!
//! store.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage Backends
//!
//! - [`storage::MemoryStore`]: in-process, swept in the background
//! - [`storage::SealedStore`]: stateless, the token travels in an encrypted
//!   envelope held by the client
//! - [`storage::RemoteStore`]: any key-value service with native expiry;
//!   `RedisStore` (`redis-storage` feature) and `SqliteStore`
//!   (`sqlite-storage` feature) are provided
//!
//! Custom backends implement [`TokenStore`], or [`storage::KeyValueBackend`]
//! to reuse the hashing and key layout of `RemoteStore`.
//!
//! ## Token Generators
//!
//! - [`PinGenerator`]: numeric PINs for SMS or voice
//! - [`CrockfordGenerator`]: case-insensitive base32 without ambiguous symbols
//! - [`ByteGenerator`]: any alphabet of up to 256 symbols
//!
//! Each generator also sanitizes user input, so `"O1l"` typed from a PIN
//! message becomes `"011"` before verification.
//!
//! ## Configuration
//!
//! [`PasswordlessConfig`] holds default TTL, sweep interval and token
//! lengths, with presets via [`ConfigPreset`] and environment overrides
//! (`PASSWORDLESS_DEFAULT_TTL`, `PASSWORDLESS_SWEEP_INTERVAL`,
//! `PASSWORDLESS_TOKEN_LENGTH`, `PASSWORDLESS_PIN_LENGTH`).
//!
//! ## Logging
//!
//! The crate emits `tracing` events and never logs token material, except
//! through [`LogTransport`], whose purpose is to do so.

pub mod token;

// Re-export commonly used types
pub use token::{
    ByteGenerator, ConfigPreset, Context, CrockfordGenerator, Envelope, LogTransport,
    Passwordless, PasswordlessBuilder, PasswordlessConfig, PinGenerator, RequestSource,
    ResponseSink, Strategy, StrategyBuilder, TokenError, TokenGenerator, TokenStore, Transport,
    request_token, verify_token, verify_token_with,
};
pub use token::{hashing, post_verify, storage};
