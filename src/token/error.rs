use thiserror::Error;

/// Error types that can occur while issuing or verifying one-time tokens.
///
/// # Error Categories
///
/// - **Verification outcomes**: `TokenNotFound`, `TokenNotValid`
/// - **Usage errors**: `UnknownStrategy`, `NotValidForContext`,
///   `MissingResponseSink`, `MissingRequestSource`, `AlphabetTooLarge`,
///   `EmptyAlphabet`, `InvalidLength`
/// - **System errors**: `Entropy`, `CryptoError`, `StorageError`,
///   `TransportError`, `StoreClosed`
/// - **Caller signals**: `DeadlineExceeded`, `Cancelled`
///
/// Usage errors are caller-fixable and are never retried internally. System
/// errors are propagated unchanged; retry policy belongs to the caller.
///
/// # Example
///
/// ```rust
/// use passwordless_auth::{Context, TokenError, TokenStore, storage::MemoryStore};
///
/// # async fn example() -> Result<(), TokenError> {
/// let store = MemoryStore::new()?;
/// let ctx = Context::new();
///
/// match store.verify(&ctx, "123456", "alice@example.com").await {
///     Ok(true) => println!("signed in"),
///     Ok(false) => println!("wrong token"),
///     Err(TokenError::TokenNotFound) => println!("no live token, request a new one"),
///     Err(e) => return Err(e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Error, Debug)]
pub enum TokenError {
    /// No live token exists for the user.
    ///
    /// Absent and expired records are deliberately reported the same way so
    /// that a caller cannot learn whether a uid ever requested a token.
    #[error("the token does not exist")]
    TokenNotFound,

    /// A live token exists but the presented value does not match it.
    ///
    /// Stores report a mismatch as `Ok(false)` and never return this
    /// variant. It exists for callers that want an error value for a
    /// rejected token.
    #[error("the token is incorrect")]
    TokenNotValid,

    /// No strategy is registered under the given name.
    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    /// The strategy exists but its validity predicate rejected the context.
    #[error("strategy '{0}' not valid for context")]
    NotValidForContext(String),

    /// The operation needs to hand an envelope back to the caller, but the
    /// context carries no response sink.
    #[error("context does not contain a response sink")]
    MissingResponseSink,

    /// The operation needs to read an envelope presented by the caller, but
    /// the context carries no request source.
    #[error("context does not contain a request source")]
    MissingRequestSource,

    /// A sealed envelope failed authentication, decryption or decoding.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// The alphabet cannot be indexed by a single random byte.
    #[error("alphabet of {0} symbols exceeds the 256 symbol limit")]
    AlphabetTooLarge(usize),

    /// The alphabet has no symbols to draw from.
    #[error("alphabet is empty")]
    EmptyAlphabet,

    /// The requested token length is not supported by the generator.
    #[error("invalid token length: {0}")]
    InvalidLength(String),

    /// The operating system random source is unavailable.
    #[error("entropy source error: {0}")]
    Entropy(String),

    /// A hashing, signing or encryption primitive failed.
    ///
    /// This usually means a key is misconfigured and is never reported as an
    /// ordinary verification failure.
    #[error("Crypto error: {0}")]
    CryptoError(String),

    /// A storage backend operation failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// The transport could not deliver the token.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The store has been shut down.
    #[error("token store has been shut down")]
    StoreClosed,

    /// The caller's deadline passed before the operation completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// A post-verification action failed.
    ///
    /// `valid` carries the verification result that was already computed
    /// before the failing action ran.
    #[error("post-verification action failed (valid: {valid}): {source}")]
    PostVerify {
        valid: bool,
        #[source]
        source: Box<TokenError>,
    },
}

impl TokenError {
    /// Creates a storage error from any displayable backend message.
    pub fn from_storage_message(message: impl Into<String>) -> Self {
        Self::StorageError(message.into())
    }

    /// Creates a transport error from any displayable message.
    pub fn from_transport_message(message: impl Into<String>) -> Self {
        Self::TransportError(message.into())
    }

    /// Returns `true` if no live token was found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TokenNotFound)
    }

    /// Returns `true` for errors the caller can fix by changing its input or
    /// configuration.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownStrategy(_)
                | Self::NotValidForContext(_)
                | Self::MissingResponseSink
                | Self::MissingRequestSource
                | Self::AlphabetTooLarge(_)
                | Self::EmptyAlphabet
                | Self::InvalidLength(_)
        )
    }

    /// Returns the verification result carried by a `PostVerify` error.
    pub fn verified(&self) -> Option<bool> {
        match self {
            Self::PostVerify { valid, .. } => Some(*valid),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            TokenError::TokenNotFound.to_string(),
            "the token does not exist"
        );
        assert_eq!(
            TokenError::TokenNotValid.to_string(),
            "the token is incorrect"
        );
        assert_eq!(
            TokenError::UnknownStrategy("email".to_string()).to_string(),
            "unknown strategy 'email'"
        );
        assert_eq!(
            TokenError::NotValidForContext("sms".to_string()).to_string(),
            "strategy 'sms' not valid for context"
        );
        assert_eq!(
            TokenError::from_storage_message("connection refused").to_string(),
            "Storage error: connection refused"
        );
    }

    #[test]
    fn test_post_verify_keeps_result() {
        let err = TokenError::PostVerify {
            valid: true,
            source: Box::new(TokenError::from_storage_message("delete failed")),
        };
        assert_eq!(err.verified(), Some(true));
        assert!(err.to_string().contains("delete failed"));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(TokenError::TokenNotFound.verified(), None);
    }

    #[test]
    fn test_usage_errors() {
        assert!(TokenError::MissingResponseSink.is_usage_error());
        assert!(TokenError::UnknownStrategy("x".into()).is_usage_error());
        assert!(!TokenError::TokenNotFound.is_usage_error());
        assert!(!TokenError::StoreClosed.is_usage_error());
        assert!(TokenError::TokenNotFound.is_not_found());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TokenError>();
    }
}
