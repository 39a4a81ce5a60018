//! Per-request context passed to every store, generator and transport call.
//!
//! The context carries the capabilities a backend may need to talk back to
//! the caller's transport (a [`ResponseSink`] for writing an envelope and a
//! [`RequestSource`] for reading one), the caller's deadline and cancellation
//! signal, and free-form attributes that strategy validity predicates can
//! inspect.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::TokenError;

/// An opaque, client-held value emitted by a stateless store.
///
/// Web integrations typically turn this into a `Set-Cookie` header; other
/// transports may carry it however they like, as long as the same `value`
/// is presented back under `name` through a [`RequestSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Name the value is stored under on the client.
    pub name: String,
    /// Opaque sealed payload. Empty for a discard instruction.
    pub value: String,
    /// Path scope for cookie-based transports.
    pub path: String,
    /// Instant after which the holder should discard the value.
    pub expires_at: SystemTime,
}

impl Envelope {
    /// Remaining lifetime of the envelope, zero once it has expired.
    pub fn max_age(&self) -> Duration {
        self.expires_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }
}

/// Capability for handing an envelope back to the caller's transport.
pub trait ResponseSink: Send + Sync {
    /// Emits an envelope, replacing any previously emitted one with the same name.
    fn emit(&self, envelope: Envelope) -> Result<(), TokenError>;
}

/// Capability for reading an envelope presented by the caller.
pub trait RequestSource: Send + Sync {
    /// Returns the value presented under `name`, if any.
    fn envelope(&self, name: &str) -> Option<String>;
}

/// Request-scoped context for token operations.
///
/// # Example
///
/// ```rust
/// use passwordless_auth::Context;
/// use std::time::Duration;
///
/// let ctx = Context::new()
///     .with_timeout(Duration::from_secs(2))
///     .with_attribute("channel", "web");
/// assert_eq!(ctx.attribute("channel"), Some("web"));
/// ```
#[derive(Clone, Default)]
pub struct Context {
    response_sink: Option<Arc<dyn ResponseSink>>,
    request_source: Option<Arc<dyn RequestSource>>,
    deadline: Option<Instant>,
    cancellation: Option<CancellationToken>,
    attributes: HashMap<String, String>,
}

impl Context {
    /// Creates an empty context with no capabilities, deadline or attributes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a response sink.
    pub fn with_response_sink(mut self, sink: Arc<dyn ResponseSink>) -> Self {
        self.response_sink = Some(sink);
        self
    }

    /// Attaches a request source.
    pub fn with_request_source(mut self, source: Arc<dyn RequestSource>) -> Self {
        self.request_source = Some(source);
        self
    }

    /// Sets an absolute deadline for operations run under this context.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Attaches a cancellation token owned by the caller.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Adds a free-form attribute, e.g. for strategy validity predicates.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns the attribute stored under `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns the response sink or `MissingResponseSink`.
    pub fn response_sink(&self) -> Result<&dyn ResponseSink, TokenError> {
        self.response_sink
            .as_deref()
            .ok_or(TokenError::MissingResponseSink)
    }

    /// Returns the request source or `MissingRequestSource`.
    pub fn request_source(&self) -> Result<&dyn RequestSource, TokenError> {
        self.request_source
            .as_deref()
            .ok_or(TokenError::MissingRequestSource)
    }

    /// Fails fast if the context is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), TokenError> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(TokenError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(TokenError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Runs `fut` until it completes, the deadline passes, or the caller
    /// cancels, whichever happens first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, TokenError>
    where
        F: Future<Output = Result<T, TokenError>>,
    {
        self.check()?;

        let cancelled = async {
            match &self.cancellation {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = fut => result,
            _ = cancelled => Err(TokenError::Cancelled),
            _ = expired => Err(TokenError::DeadlineExceeded),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("response_sink", &self.response_sink.is_some())
            .field("request_source", &self.request_source.is_some())
            .field("deadline", &self.deadline)
            .field("cancellation", &self.cancellation)
            .field("attributes", &self.attributes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_capabilities() {
        let ctx = Context::new();
        assert!(matches!(
            ctx.response_sink(),
            Err(TokenError::MissingResponseSink)
        ));
        assert!(matches!(
            ctx.request_source(),
            Err(TokenError::MissingRequestSource)
        ));
    }

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = Context::new().with_timeout(Duration::from_secs(5));
        let value = ctx.run(async { Ok::<_, TokenError>(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_deadline_exceeded() {
        let ctx = Context::new().with_timeout(Duration::from_millis(20));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, TokenError>(())
            })
            .await;
        assert!(matches!(result, Err(TokenError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_run_cancelled() {
        let token = CancellationToken::new();
        let ctx = Context::new().with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, TokenError>(())
            })
            .await;
        assert!(matches!(result, Err(TokenError::Cancelled)));
        canceller.await.unwrap();

        // Already cancelled contexts fail before doing any work
        assert!(matches!(ctx.check(), Err(TokenError::Cancelled)));
    }

    #[test]
    fn test_envelope_max_age() {
        let envelope = Envelope {
            name: "passwordless".to_string(),
            value: String::new(),
            path: "/".to_string(),
            expires_at: SystemTime::now() - Duration::from_secs(5),
        };
        assert_eq!(envelope.max_age(), Duration::ZERO);
    }
}
