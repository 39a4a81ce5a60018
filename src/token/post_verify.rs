//! Actions run after a token has been checked.
//!
//! A verification runs an ordered chain of [`PostVerifyAction`]s once the
//! store has produced a result. The chain stops at the first failing action;
//! the failure is reported as [`TokenError::PostVerify`], which still carries
//! the verification result. An action returning [`TokenError::TokenNotFound`]
//! means a concurrent verification consumed the token first; that error is
//! returned as is, exactly like a replayed token.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::storage::TokenStore;
use super::{Context, TokenError};

/// A step run after `TokenStore::verify` found a live record.
#[async_trait]
pub trait PostVerifyAction: Send + Sync {
    /// Runs the action for `uid`, given the verification result.
    async fn apply(
        &self,
        ctx: &Context,
        store: &dyn TokenStore,
        uid: &str,
        valid: bool,
    ) -> Result<(), TokenError>;
}

/// Shared handle to an action, as stored in a chain.
pub type BoxedPostVerifyAction = Arc<dyn PostVerifyAction>;

/// Consumes the token after a successful verification, making it single use.
///
/// If another verification consumed the same token first, this one fails
/// with [`TokenError::TokenNotFound`]. This is the default chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOnSuccess;

#[async_trait]
impl PostVerifyAction for DeleteOnSuccess {
    async fn apply(
        &self,
        ctx: &Context,
        store: &dyn TokenStore,
        uid: &str,
        valid: bool,
    ) -> Result<(), TokenError> {
        if valid && !store.consume(ctx, uid).await? {
            return Err(TokenError::TokenNotFound);
        }
        Ok(())
    }
}

/// Deletes the token after any attempt, so a wrong guess burns it too.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteAlways;

#[async_trait]
impl PostVerifyAction for DeleteAlways {
    async fn apply(
        &self,
        ctx: &Context,
        store: &dyn TokenStore,
        uid: &str,
        valid: bool,
    ) -> Result<(), TokenError> {
        if !valid {
            return store.delete(ctx, uid).await;
        }
        if !store.consume(ctx, uid).await? {
            return Err(TokenError::TokenNotFound);
        }
        Ok(())
    }
}

/// Outcome handed to an [`FnAction`] closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    /// The user the token was checked for
    pub uid: String,
    /// Whether the token matched
    pub valid: bool,
}

/// Action backed by an async closure, e.g. for audit logging or counters.
///
/// ```rust
/// use passwordless_auth::post_verify::FnAction;
///
/// let audit = FnAction::new(|outcome| async move {
///     println!("{} verified: {}", outcome.uid, outcome.valid);
///     Ok(())
/// });
/// ```
pub struct FnAction<F, Fut>
where
    F: Fn(VerifyOutcome) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TokenError>> + Send + 'static,
{
    action_fn: F,
}

impl<F, Fut> FnAction<F, Fut>
where
    F: Fn(VerifyOutcome) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TokenError>> + Send + 'static,
{
    /// Wraps `action_fn`, called once per verification with its outcome.
    pub fn new(action_fn: F) -> Self {
        Self { action_fn }
    }
}

#[async_trait]
impl<F, Fut> PostVerifyAction for FnAction<F, Fut>
where
    F: Fn(VerifyOutcome) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TokenError>> + Send + 'static,
{
    async fn apply(
        &self,
        _ctx: &Context,
        _store: &dyn TokenStore,
        uid: &str,
        valid: bool,
    ) -> Result<(), TokenError> {
        (self.action_fn)(VerifyOutcome {
            uid: uid.to_string(),
            valid,
        })
        .await
    }
}

/// The chain used when none is configured: `[DeleteOnSuccess]`.
pub fn default_chain() -> Vec<BoxedPostVerifyAction> {
    vec![Arc::new(DeleteOnSuccess)]
}

/// Runs `actions` in order, stopping at the first error.
pub(crate) async fn run_chain(
    ctx: &Context,
    store: &dyn TokenStore,
    uid: &str,
    valid: bool,
    actions: &[BoxedPostVerifyAction],
) -> Result<bool, TokenError> {
    for action in actions {
        match action.apply(ctx, store, uid, valid).await {
            Ok(()) => {}
            Err(TokenError::TokenNotFound) => {
                tracing::debug!("token consumed by a concurrent verification");
                return Err(TokenError::TokenNotFound);
            }
            Err(e) => {
                tracing::warn!(valid, error = %e, "post-verify action failed");
                return Err(TokenError::PostVerify {
                    valid,
                    source: Box::new(e),
                });
            }
        }
    }
    Ok(valid)
}
