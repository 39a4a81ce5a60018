//! One-way token hashing for stores that keep server-side records.
//!
//! Tokens are short, so an unkeyed hash of a 6 digit PIN could be reversed by
//! enumeration from a leaked record. Records therefore hold
//! `HMAC-SHA256(key, salt || token)` with a per-record random salt, and the
//! key never leaves the process.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::TokenError;
use super::generator::fill_random;

type HmacSha256 = Hmac<Sha256>;

const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;
const ENCODING_VERSION: &str = "v1";

/// A salted, keyed digest of a token.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedToken {
    salt: [u8; SALT_LEN],
    digest: [u8; DIGEST_LEN],
}

impl HashedToken {
    /// Serializes the hash as `v1$<salt hex>$<digest hex>`.
    pub fn encode(&self) -> String {
        format!(
            "{}${}${}",
            ENCODING_VERSION,
            hex::encode(self.salt),
            hex::encode(self.digest)
        )
    }

    /// Parses a value produced by [`HashedToken::encode`].
    pub fn decode(value: &str) -> Result<Self, TokenError> {
        let malformed = || TokenError::from_storage_message("malformed token hash");

        let mut parts = value.split('$');
        let (Some(ENCODING_VERSION), Some(salt), Some(digest), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };

        let mut hashed = Self {
            salt: [0; SALT_LEN],
            digest: [0; DIGEST_LEN],
        };
        hex::decode_to_slice(salt, &mut hashed.salt).map_err(|_| malformed())?;
        hex::decode_to_slice(digest, &mut hashed.digest).map_err(|_| malformed())?;
        Ok(hashed)
    }
}

impl std::fmt::Debug for HashedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HashedToken(..)")
    }
}

/// Computes and checks [`HashedToken`]s under a secret key.
#[derive(Clone)]
pub struct TokenHasher {
    key: Vec<u8>,
}

impl TokenHasher {
    /// Creates a hasher with the given secret key.
    ///
    /// Stores shared by several processes must use the same key.
    pub fn new(key: &[u8]) -> Self {
        Self { key: key.to_vec() }
    }

    /// Creates a hasher with a fresh random key, for single-process stores.
    pub fn random() -> Result<Self, TokenError> {
        let mut key = vec![0u8; 32];
        fill_random(&mut key)?;
        Ok(Self { key })
    }

    fn mac(&self, salt: &[u8], token: &str) -> Result<HmacSha256, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| TokenError::CryptoError(format!("Invalid HMAC key: {e}")))?;
        mac.update(salt);
        mac.update(token.as_bytes());
        Ok(mac)
    }

    /// Hashes `token` under a new random salt.
    pub fn hash(&self, token: &str) -> Result<HashedToken, TokenError> {
        let mut salt = [0u8; SALT_LEN];
        fill_random(&mut salt)?;
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&self.mac(&salt, token)?.finalize().into_bytes());
        Ok(HashedToken { salt, digest })
    }

    /// Checks `token` against a stored hash in constant time.
    pub fn verify(&self, token: &str, hashed: &HashedToken) -> Result<bool, TokenError> {
        Ok(self
            .mac(&hashed.salt, token)?
            .verify_slice(&hashed.digest)
            .is_ok())
    }
}

impl std::fmt::Debug for TokenHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenHasher").finish_non_exhaustive()
    }
}
