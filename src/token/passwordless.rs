//! The request/verify orchestrator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::generator::TokenGenerator;
use super::post_verify::{self, BoxedPostVerifyAction};
use super::storage::TokenStore;
use super::strategy::Strategy;
use super::transport::Transport;
use super::{Context, TokenError};

/// Holds a set of named strategies and the token store they share.
///
/// Strategies are registered during setup and read concurrently afterwards;
/// registration takes `&mut self`, so it cannot race with requests.
///
/// # Example
///
/// ```rust
/// use passwordless_auth::{Context, LogTransport, Passwordless, PinGenerator};
/// use passwordless_auth::storage::MemoryStore;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), passwordless_auth::TokenError> {
/// let mut auth = Passwordless::new(Arc::new(MemoryStore::new()?));
/// auth.set_transport(
///     "log",
///     Arc::new(LogTransport::new()),
///     Arc::new(PinGenerator::new(6)),
///     Duration::from_secs(300),
/// );
///
/// let ctx = Context::new();
/// auth.request_token(&ctx, "log", "alice", "alice@example.com").await?;
/// # Ok(())
/// # }
/// ```
pub struct Passwordless {
    strategies: HashMap<String, Strategy>,
    store: Arc<dyn TokenStore>,
    post_verify: Vec<BoxedPostVerifyAction>,
}

impl Passwordless {
    /// Creates an orchestrator over `store` with no strategies and the
    /// default post-verify chain.
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            strategies: HashMap::new(),
            store,
            post_verify: post_verify::default_chain(),
        }
    }

    /// Starts a builder over `store`.
    pub fn builder(store: Arc<dyn TokenStore>) -> PasswordlessBuilder {
        PasswordlessBuilder {
            inner: Self::new(store),
        }
    }

    /// Registers `strategy` under `name`, replacing any previous one.
    pub fn set_strategy(&mut self, name: impl Into<String>, strategy: Strategy) -> &Strategy {
        let name = name.into();
        tracing::debug!(strategy = %name, ttl = ?strategy.ttl(), "registered strategy");
        self.strategies.entry(name).insert_entry(strategy).into_mut()
    }

    /// Registers an always-valid strategy built from its parts.
    pub fn set_transport(
        &mut self,
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        generator: Arc<dyn TokenGenerator>,
        ttl: Duration,
    ) -> &Strategy {
        self.set_strategy(name, Strategy::new(generator, transport, ttl))
    }

    /// Replaces the chain run by [`Passwordless::verify_token`].
    pub fn set_post_verify(&mut self, actions: Vec<BoxedPostVerifyAction>) {
        self.post_verify = actions;
    }

    /// Returns the shared token store.
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Names of the strategies usable with `ctx`, sorted.
    ///
    /// Useful for offering the user a choice of channels.
    pub fn list_strategies(&self, ctx: &Context) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .strategies
            .iter()
            .filter(|(_, strategy)| strategy.is_valid(ctx))
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Looks up a strategy usable with `ctx`.
    pub fn get_strategy(&self, ctx: &Context, name: &str) -> Result<&Strategy, TokenError> {
        let strategy = self
            .strategies
            .get(name)
            .ok_or_else(|| TokenError::UnknownStrategy(name.to_string()))?;
        if !strategy.is_valid(ctx) {
            return Err(TokenError::NotValidForContext(name.to_string()));
        }
        Ok(strategy)
    }

    /// Generates, stores and delivers a token for `uid` through the named strategy.
    pub async fn request_token(
        &self,
        ctx: &Context,
        strategy: &str,
        uid: &str,
        recipient: &str,
    ) -> Result<(), TokenError> {
        let resolved = self.get_strategy(ctx, strategy)?;
        request_token(ctx, self.store.as_ref(), resolved, uid, recipient).await
    }

    /// Verifies `token` for `uid` and runs the configured post-verify chain.
    pub async fn verify_token(
        &self,
        ctx: &Context,
        uid: &str,
        token: &str,
    ) -> Result<bool, TokenError> {
        verify_token_with(ctx, self.store.as_ref(), uid, token, &self.post_verify).await
    }

    /// Verifies `token` for `uid`, running `actions` instead of the configured chain.
    pub async fn verify_token_with(
        &self,
        ctx: &Context,
        uid: &str,
        token: &str,
        actions: &[BoxedPostVerifyAction],
    ) -> Result<bool, TokenError> {
        verify_token_with(ctx, self.store.as_ref(), uid, token, actions).await
    }

    /// Normalizes user input with the strategy's generator, then verifies it.
    pub async fn verify_sanitized(
        &self,
        ctx: &Context,
        strategy: &str,
        uid: &str,
        input: &str,
    ) -> Result<bool, TokenError> {
        let token = self
            .get_strategy(ctx, strategy)?
            .generator()
            .sanitize(ctx, input)?;
        self.verify_token(ctx, uid, &token).await
    }
}

impl std::fmt::Debug for Passwordless {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.strategies.keys().collect();
        names.sort_unstable();
        f.debug_struct("Passwordless")
            .field("strategies", &names)
            .field("post_verify", &self.post_verify.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Passwordless`].
pub struct PasswordlessBuilder {
    inner: Passwordless,
}

impl PasswordlessBuilder {
    /// Registers `strategy` under `name`.
    pub fn strategy(mut self, name: impl Into<String>, strategy: Strategy) -> Self {
        self.inner.set_strategy(name, strategy);
        self
    }

    /// Registers an always-valid strategy built from its parts.
    pub fn transport(
        mut self,
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        generator: Arc<dyn TokenGenerator>,
        ttl: Duration,
    ) -> Self {
        self.inner.set_transport(name, transport, generator, ttl);
        self
    }

    /// Sets the post-verify chain. An empty chain leaves tokens in place.
    pub fn post_verify(mut self, actions: Vec<BoxedPostVerifyAction>) -> Self {
        self.inner.set_post_verify(actions);
        self
    }

    /// Returns the configured orchestrator.
    pub fn build(self) -> Passwordless {
        self.inner
    }
}

/// Generates a token with `strategy`, stores it for `uid` and sends it to
/// `recipient`.
///
/// A send failure is returned, but the stored token stays live; requesting
/// again supersedes it.
pub async fn request_token(
    ctx: &Context,
    store: &dyn TokenStore,
    strategy: &Strategy,
    uid: &str,
    recipient: &str,
) -> Result<(), TokenError> {
    let token = strategy.generator().generate(ctx)?;
    store.store(ctx, &token, uid, strategy.ttl()).await?;

    if let Err(e) = strategy.transport().send(ctx, &token, uid, recipient).await {
        tracing::warn!(error = %e, "token stored but delivery failed");
        return Err(e);
    }

    tracing::debug!(ttl = ?strategy.ttl(), "token issued");
    Ok(())
}

/// Verifies `token` for `uid` and consumes it on success.
///
/// Of several concurrent calls with the right token, exactly one returns
/// `Ok(true)`; the others get [`TokenError::TokenNotFound`].
pub async fn verify_token(
    ctx: &Context,
    store: &dyn TokenStore,
    uid: &str,
    token: &str,
) -> Result<bool, TokenError> {
    verify_token_with(ctx, store, uid, token, &post_verify::default_chain()).await
}

/// Verifies `token` for `uid` and runs `actions` on the result.
///
/// Store errors, including `TokenNotFound`, are returned before any action
/// runs.
pub async fn verify_token_with(
    ctx: &Context,
    store: &dyn TokenStore,
    uid: &str,
    token: &str,
    actions: &[BoxedPostVerifyAction],
) -> Result<bool, TokenError> {
    let valid = store.verify(ctx, token, uid).await?;
    tracing::debug!(valid, "token checked");
    post_verify::run_chain(ctx, store, uid, valid, actions).await
}
