//! Named delivery channels.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::config::PasswordlessConfig;
use super::generator::TokenGenerator;
use super::transport::Transport;
use super::Context;

type ValidityPredicate = dyn Fn(&Context) -> bool + Send + Sync;

/// A generator, a transport, a TTL and an optional validity predicate.
///
/// Strategies are cheap to clone and immutable once built.
///
/// # Example
///
/// ```rust
/// use passwordless_auth::{Context, LogTransport, PinGenerator, Strategy};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let sms = Strategy::builder(Arc::new(PinGenerator::new(6)), Arc::new(LogTransport::new()))
///     .ttl(Duration::from_secs(300))
///     .valid_when(|ctx| ctx.attribute("phone_verified") == Some("yes"))
///     .build();
///
/// assert!(!sms.is_valid(&Context::new()));
/// assert!(sms.is_valid(&Context::new().with_attribute("phone_verified", "yes")));
/// ```
#[derive(Clone)]
pub struct Strategy {
    generator: Arc<dyn TokenGenerator>,
    transport: Arc<dyn Transport>,
    ttl: Duration,
    valid_when: Option<Arc<ValidityPredicate>>,
}

impl Strategy {
    /// Creates a strategy that is valid for every context.
    pub fn new(
        generator: Arc<dyn TokenGenerator>,
        transport: Arc<dyn Transport>,
        ttl: Duration,
    ) -> Self {
        Self {
            generator,
            transport,
            ttl,
            valid_when: None,
        }
    }

    /// Starts building a strategy.
    pub fn builder(
        generator: Arc<dyn TokenGenerator>,
        transport: Arc<dyn Transport>,
    ) -> StrategyBuilder {
        StrategyBuilder {
            generator,
            transport,
            ttl: None,
            valid_when: None,
        }
    }

    /// Lifetime of tokens issued through this strategy.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generator producing and sanitizing this strategy's tokens.
    pub fn generator(&self) -> &dyn TokenGenerator {
        self.generator.as_ref()
    }

    /// Transport delivering this strategy's tokens.
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Returns `true` if the strategy may be used with `ctx`.
    pub fn is_valid(&self, ctx: &Context) -> bool {
        self.valid_when.as_ref().is_none_or(|valid| valid(ctx))
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("ttl", &self.ttl)
            .field("conditional", &self.valid_when.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Strategy`].
pub struct StrategyBuilder {
    generator: Arc<dyn TokenGenerator>,
    transport: Arc<dyn Transport>,
    ttl: Option<Duration>,
    valid_when: Option<Arc<ValidityPredicate>>,
}

impl StrategyBuilder {
    /// Sets the token lifetime. Defaults to [`PasswordlessConfig::default_ttl`].
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Restricts the strategy to contexts accepted by `predicate`.
    pub fn valid_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.valid_when = Some(Arc::new(predicate));
        self
    }

    /// Returns the configured strategy.
    pub fn build(self) -> Strategy {
        Strategy {
            generator: self.generator,
            transport: self.transport,
            ttl: self
                .ttl
                .unwrap_or_else(|| PasswordlessConfig::default().default_ttl),
            valid_when: self.valid_when,
        }
    }
}
