//! Time utilities for safe expiry handling.
//!
//! Expiry instants are carried as `SystemTime` in memory and as whole Unix
//! seconds whenever they cross a serialization boundary.

use crate::token::error::TokenError;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the expiry instant for a record stored now with the given TTL.
pub(crate) fn expiry_from_now(ttl: Duration) -> SystemTime {
    SystemTime::now()
        .checked_add(ttl)
        .unwrap_or_else(|| SystemTime::now() + Duration::from_secs(u32::MAX as u64))
}

/// Check if an expiry instant has been reached.
///
/// A record whose expiry equals the current instant is already expired, so a
/// zero TTL never produces a verifiable token.
pub(crate) fn is_expired(expires_at: SystemTime) -> bool {
    SystemTime::now() >= expires_at
}

/// Converts an instant into Unix seconds.
pub(crate) fn to_unix_secs(time: SystemTime) -> Result<i64, TokenError> {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .map_err(|_| TokenError::CryptoError("System time is before Unix epoch".to_string()))
}

/// Converts Unix seconds back into an instant; negative values clamp to the epoch.
pub(crate) fn from_unix_secs(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}
