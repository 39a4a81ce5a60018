//! Stateless token storage in a client-held, signed and encrypted envelope.
//!
//! Nothing is kept server-side. `store` hands the caller an [`Envelope`]
//! through the context's [`ResponseSink`]; `verify` and `exists` read it back
//! through the context's [`RequestSource`]. The envelope value is built as
//!
//! ```text
//! base64url( nonce || AES-256-GCM( hmac_sha256(claims) || claims, aad = name ) )
//! ```
//!
//! where `claims` is the JSON object `{"uid", "token", "exp"}`.
//!
//! A stateless store cannot revoke a token before it expires: `delete` asks
//! the client to discard the envelope, but a client that kept a copy can
//! still present it until `exp`. Pair this store with short TTLs.

use super::{StorageStats, TokenStore};
use crate::token::context::{Envelope, RequestSource, ResponseSink};
use crate::token::generator::fill_random;
use crate::token::time_utils;
use crate::token::{Context, TokenError};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;
const SIGNATURE_LEN: usize = 32;
const ENCRYPTION_KEY_LEN: usize = 32;

/// Default envelope name.
pub const DEFAULT_ENVELOPE_NAME: &str = "passwordless";
/// Default envelope path.
pub const DEFAULT_ENVELOPE_PATH: &str = "/";

#[derive(Serialize, Deserialize)]
struct Claims {
    uid: String,
    token: String,
    exp: i64,
}

impl Claims {
    fn is_expired(&self) -> bool {
        time_utils::is_expired(time_utils::from_unix_secs(self.exp))
    }
}

/// A token store that keeps each token in a sealed envelope held by the client.
///
/// # Example
///
/// ```rust
/// use passwordless_auth::{Context, TokenStore};
/// use passwordless_auth::storage::{EnvelopeJar, SealedStore};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), passwordless_auth::TokenError> {
/// let store = SealedStore::new(b"signing-key", &[7u8; 32])?;
/// let jar = Arc::new(EnvelopeJar::new());
/// let ctx = Context::new()
///     .with_response_sink(jar.clone())
///     .with_request_source(jar.clone());
///
/// store.store(&ctx, "482913", "alice", Duration::from_secs(300)).await?;
/// assert!(store.verify(&ctx, "482913", "alice").await?);
/// # Ok(())
/// # }
/// ```
pub struct SealedStore {
    signing_key: Vec<u8>,
    cipher: Aes256Gcm,
    name: String,
    path: String,
}

impl SealedStore {
    /// Creates a store signing with `signing_key` and encrypting with the
    /// 32 byte AES-256 `encryption_key`.
    pub fn new(signing_key: &[u8], encryption_key: &[u8]) -> Result<Self, TokenError> {
        if signing_key.is_empty() {
            return Err(TokenError::CryptoError(
                "signing key must not be empty".to_string(),
            ));
        }
        if encryption_key.len() != ENCRYPTION_KEY_LEN {
            return Err(TokenError::CryptoError(format!(
                "encryption key must be {ENCRYPTION_KEY_LEN} bytes, got {}",
                encryption_key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(encryption_key)
            .map_err(|e| TokenError::CryptoError(format!("Failed to init AES cipher: {e}")))?;

        Ok(Self {
            signing_key: signing_key.to_vec(),
            cipher,
            name: DEFAULT_ENVELOPE_NAME.to_string(),
            path: DEFAULT_ENVELOPE_PATH.to_string(),
        })
    }

    /// Sets the name the envelope is stored under. The name is bound into
    /// the ciphertext, so envelopes cannot be replayed under another name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the path scope emitted with the envelope.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Returns the envelope name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        <HmacSha256 as Mac>::new_from_slice(&self.signing_key)
            .map_err(|e| TokenError::CryptoError(format!("HMAC init failed: {e}")))
    }

    fn seal(&self, claims: &Claims) -> Result<String, TokenError> {
        let payload = serde_json::to_vec(claims)
            .map_err(|e| TokenError::CryptoError(format!("Failed to encode claims: {e}")))?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        let mut signed = mac.finalize().into_bytes().to_vec();
        signed.extend_from_slice(&payload);

        let mut nonce_bytes = [0u8; NONCE_LEN];
        fill_random(&mut nonce_bytes)?;
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &signed,
                    aad: self.name.as_bytes(),
                },
            )
            .map_err(|e| TokenError::CryptoError(format!("Encryption failed: {e}")))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(&combined))
    }

    fn open(&self, value: &str) -> Result<Claims, TokenError> {
        let combined = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|_| TokenError::InvalidEnvelope("not base64url".to_string()))?;
        if combined.len() < NONCE_LEN {
            return Err(TokenError::InvalidEnvelope("too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let signed = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: self.name.as_bytes(),
                },
            )
            .map_err(|_| TokenError::InvalidEnvelope("decryption failed".to_string()))?;
        if signed.len() < SIGNATURE_LEN {
            return Err(TokenError::InvalidEnvelope("missing signature".to_string()));
        }

        let (signature, payload) = signed.split_at(SIGNATURE_LEN);
        let mut mac = self.mac()?;
        mac.update(payload);
        mac.verify_slice(signature)
            .map_err(|_| TokenError::InvalidEnvelope("bad signature".to_string()))?;

        serde_json::from_slice(payload)
            .map_err(|e| TokenError::InvalidEnvelope(format!("malformed claims: {e}")))
    }

    /// Reads and opens the presented envelope. An absent or discarded
    /// envelope yields `None`.
    fn presented_claims(&self, ctx: &Context) -> Result<Option<Claims>, TokenError> {
        let source = ctx.request_source()?;
        match source.envelope(&self.name) {
            Some(value) if !value.is_empty() => self.open(&value).map(Some),
            _ => Ok(None),
        }
    }

    fn emit(
        &self,
        sink: &dyn ResponseSink,
        claims: &Claims,
        expires_at: SystemTime,
    ) -> Result<(), TokenError> {
        sink.emit(Envelope {
            name: self.name.clone(),
            value: self.seal(claims)?,
            path: self.path.clone(),
            expires_at,
        })
    }
}

impl std::fmt::Debug for SealedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedStore")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenStore for SealedStore {
    async fn store(
        &self,
        ctx: &Context,
        token: &str,
        uid: &str,
        ttl: Duration,
    ) -> Result<(), TokenError> {
        ctx.check()?;
        let sink = ctx.response_sink()?;

        let expires_at = time_utils::expiry_from_now(ttl);
        let claims = Claims {
            uid: uid.to_string(),
            token: token.to_string(),
            exp: time_utils::to_unix_secs(expires_at)?,
        };
        self.emit(sink, &claims, expires_at)?;

        tracing::debug!(envelope = %self.name, "sealed token envelope emitted");
        Ok(())
    }

    async fn exists(&self, ctx: &Context, uid: &str) -> Result<Option<SystemTime>, TokenError> {
        ctx.check()?;

        Ok(self
            .presented_claims(ctx)?
            .filter(|claims| claims.uid == uid && !claims.is_expired())
            .map(|claims| time_utils::from_unix_secs(claims.exp)))
    }

    async fn verify(&self, ctx: &Context, token: &str, uid: &str) -> Result<bool, TokenError> {
        ctx.check()?;

        let Some(claims) = self.presented_claims(ctx)? else {
            return Err(TokenError::TokenNotFound);
        };
        if claims.is_expired() {
            return Err(TokenError::TokenNotFound);
        }

        let uid_matches = claims.uid == uid;
        let token_matches: bool = claims.token.as_bytes().ct_eq(token.as_bytes()).into();
        Ok(uid_matches & token_matches)
    }

    async fn delete(&self, ctx: &Context, uid: &str) -> Result<(), TokenError> {
        ctx.check()?;
        let sink = ctx.response_sink()?;

        let now = SystemTime::now();
        let claims = Claims {
            uid: uid.to_string(),
            token: String::new(),
            exp: time_utils::to_unix_secs(now)?,
        };
        self.emit(sink, &claims, now)
    }

    async fn stats(&self) -> Result<StorageStats, TokenError> {
        Ok(StorageStats {
            total_records: 0,
            backend_info: format!("Stateless sealed envelope storage ('{}')", self.name),
        })
    }
}

/// An in-memory envelope holder acting as both sink and source.
///
/// The jar stands in for a client: whatever a store emits is presented back
/// on the next read. It does not enforce envelope expiry, so it behaves like
/// a client that ignores it, which leaves the expiry check to the store.
#[derive(Debug, Default)]
pub struct EnvelopeJar {
    envelopes: Mutex<HashMap<String, Envelope>>,
}

impl EnvelopeJar {
    /// Creates an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last envelope emitted under `name`.
    pub fn get(&self, name: &str) -> Option<Envelope> {
        self.envelopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Replaces the value presented under `name`, as a client could.
    pub fn present(&self, name: &str, value: impl Into<String>) {
        let mut envelopes = self.envelopes.lock().unwrap_or_else(PoisonError::into_inner);
        let expires_at = envelopes
            .get(name)
            .map_or_else(|| time_utils::expiry_from_now(Duration::MAX), |e| e.expires_at);
        envelopes.insert(
            name.to_string(),
            Envelope {
                name: name.to_string(),
                value: value.into(),
                path: DEFAULT_ENVELOPE_PATH.to_string(),
                expires_at,
            },
        );
    }

    /// Forgets the envelope stored under `name`.
    pub fn remove(&self, name: &str) -> Option<Envelope> {
        self.envelopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }
}

impl ResponseSink for EnvelopeJar {
    fn emit(&self, envelope: Envelope) -> Result<(), TokenError> {
        self.envelopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(envelope.name.clone(), envelope);
        Ok(())
    }
}

impl RequestSource for EnvelopeJar {
    fn envelope(&self, name: &str) -> Option<String> {
        self.get(name).map(|e| e.value)
    }
}
