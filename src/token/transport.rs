//! Token delivery.

use async_trait::async_trait;

use super::{Context, TokenError};

/// Delivers a token to a named recipient.
///
/// The recipient is whatever the transport understands: an e-mail address,
/// a phone number, a device id. Delivery is best effort; a failed send leaves
/// the stored token live and the caller may simply request a new one.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `token`, issued for `uid`, to `recipient`.
    async fn send(
        &self,
        ctx: &Context,
        token: &str,
        uid: &str,
        recipient: &str,
    ) -> Result<(), TokenError>;
}

type MessageFn = dyn Fn(&str, &str) -> String + Send + Sync;

/// A transport that writes the token to the `tracing` log.
///
/// Intended for development and tests only: the token ends up in plain text
/// wherever the log is collected.
pub struct LogTransport {
    message: Box<MessageFn>,
}

impl LogTransport {
    /// Creates a transport logging `"token for <uid>: <token>"`.
    pub fn new() -> Self {
        Self::with_message(|token, uid| format!("token for {uid}: {token}"))
    }

    /// Creates a transport formatting the log line with `message(token, uid)`.
    pub fn with_message<F>(message: F) -> Self
    where
        F: Fn(&str, &str) -> String + Send + Sync + 'static,
    {
        Self {
            message: Box::new(message),
        }
    }
}

impl Default for LogTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn send(
        &self,
        _ctx: &Context,
        token: &str,
        uid: &str,
        recipient: &str,
    ) -> Result<(), TokenError> {
        tracing::info!(recipient, "{}", (self.message)(token, uid));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_transport_sends() {
        let transport = LogTransport::with_message(|token, uid| format!("{uid}={token}"));
        assert_eq!((transport.message)("123", "alice"), "alice=123");
        transport
            .send(&Context::new(), "123", "alice", "alice@example.com")
            .await
            .unwrap();
    }
}
