//! End-to-end request/verify flows over each always-available store.
//!
//! Run with: cargo test --test integration_flow

use async_trait::async_trait;
use passwordless_auth::post_verify::{DeleteAlways, FnAction};
use passwordless_auth::storage::{EnvelopeJar, MemoryStore, SealedStore};
use passwordless_auth::{
    Context, CrockfordGenerator, Passwordless, PinGenerator, Strategy, TokenError, TokenStore,
    Transport,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Transport that keeps the last delivered token, like an inbox.
#[derive(Default)]
struct Inbox {
    last: Mutex<Option<String>>,
}

impl Inbox {
    fn take(&self) -> String {
        self.last.lock().unwrap().take().expect("no token delivered")
    }
}

#[async_trait]
impl Transport for Inbox {
    async fn send(
        &self,
        _ctx: &Context,
        token: &str,
        _uid: &str,
        _recipient: &str,
    ) -> Result<(), TokenError> {
        *self.last.lock().unwrap() = Some(token.to_string());
        Ok(())
    }
}

fn auth_over(store: Arc<dyn TokenStore>, inbox: Arc<Inbox>) -> Passwordless {
    Passwordless::builder(store)
        .transport(
            "pin",
            inbox.clone(),
            Arc::new(PinGenerator::new(6)),
            Duration::from_secs(300),
        )
        .transport(
            "code",
            inbox,
            Arc::new(CrockfordGenerator::new(10)),
            Duration::from_secs(300),
        )
        .build()
}

#[tokio::test]
async fn test_memory_store_one_time_use() {
    let store = Arc::new(MemoryStore::new().unwrap());
    let inbox = Arc::new(Inbox::default());
    let auth = auth_over(store.clone(), inbox.clone());
    let ctx = Context::new();

    auth.request_token(&ctx, "pin", "alice", "alice@example.com")
        .await
        .unwrap();
    let pin = inbox.take();
    assert_eq!(pin.len(), 6);
    assert!(pin.chars().all(|c| c.is_ascii_digit()));

    assert!(auth.verify_token(&ctx, "alice", &pin).await.unwrap());
    assert!(matches!(
        auth.verify_token(&ctx, "alice", &pin).await,
        Err(TokenError::TokenNotFound)
    ));

    store.shutdown().await;
}

#[tokio::test]
async fn test_memory_store_new_request_supersedes() {
    let store = Arc::new(MemoryStore::new().unwrap());
    let inbox = Arc::new(Inbox::default());
    let auth = auth_over(store.clone(), inbox.clone());
    let ctx = Context::new();

    auth.request_token(&ctx, "code", "bob", "bob@example.com")
        .await
        .unwrap();
    let first = inbox.take();
    auth.request_token(&ctx, "code", "bob", "bob@example.com")
        .await
        .unwrap();
    let second = inbox.take();

    if first != second {
        assert!(!auth.verify_token(&ctx, "bob", &first).await.unwrap());
    }
    assert!(auth.verify_token(&ctx, "bob", &second).await.unwrap());

    store.shutdown().await;
}

#[tokio::test]
async fn test_sanitized_input_verifies() {
    let store = Arc::new(MemoryStore::new().unwrap());
    let inbox = Arc::new(Inbox::default());
    let auth = auth_over(store.clone(), inbox.clone());
    let ctx = Context::new();

    auth.request_token(&ctx, "code", "carol", "carol@example.com")
        .await
        .unwrap();
    let code = inbox.take();

    // Typed back in upper case, with 0 and 1 mistyped as O and I
    let typed = code.to_uppercase().replace('0', "O").replace('1', "I");
    assert!(
        auth.verify_sanitized(&ctx, "code", "carol", &typed)
            .await
            .unwrap()
    );

    store.shutdown().await;
}

#[tokio::test]
async fn test_sealed_store_flow() {
    let store = Arc::new(SealedStore::new(b"signing-key", &[9u8; 32]).unwrap());
    let inbox = Arc::new(Inbox::default());
    let auth = auth_over(store, inbox.clone());

    let jar = Arc::new(EnvelopeJar::new());
    let ctx = Context::new()
        .with_response_sink(jar.clone())
        .with_request_source(jar.clone());

    auth.request_token(&ctx, "pin", "dave", "+15550100")
        .await
        .unwrap();
    let pin = inbox.take();
    assert!(jar.get("passwordless").is_some());

    assert!(!auth.verify_token(&ctx, "dave", "not-it").await.unwrap());
    assert!(!auth.verify_token(&ctx, "eve", &pin).await.unwrap());
    assert!(auth.verify_token(&ctx, "dave", &pin).await.unwrap());

    // The default chain asked the client to drop the envelope
    assert!(matches!(
        auth.verify_token(&ctx, "dave", &pin).await,
        Err(TokenError::TokenNotFound)
    ));
}

#[tokio::test]
async fn test_sealed_store_requires_capabilities() {
    let store = Arc::new(SealedStore::new(b"signing-key", &[9u8; 32]).unwrap());
    let auth = auth_over(store, Arc::new(Inbox::default()));
    let ctx = Context::new();

    assert!(matches!(
        auth.request_token(&ctx, "pin", "dave", "+15550100").await,
        Err(TokenError::MissingResponseSink)
    ));
    assert!(matches!(
        auth.verify_token(&ctx, "dave", "123456").await,
        Err(TokenError::MissingRequestSource)
    ));
}

#[tokio::test]
async fn test_custom_post_verify_chain() {
    let store = Arc::new(MemoryStore::new().unwrap());
    let inbox = Arc::new(Inbox::default());
    let failures = Arc::new(AtomicU32::new(0));
    let failures_clone = Arc::clone(&failures);

    let audit = FnAction::new(move |outcome| {
        let failures = Arc::clone(&failures_clone);
        async move {
            if !outcome.valid {
                failures.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    });

    let auth = Passwordless::builder(store.clone())
        .strategy(
            "pin",
            Strategy::builder(inbox.clone(), inbox.clone())
                .ttl(Duration::from_secs(60))
                .build(),
        )
        .post_verify(vec![Arc::new(audit), Arc::new(DeleteAlways)])
        .build();
    let ctx = Context::new();

    auth.request_token(&ctx, "pin", "frank", "frank@example.com")
        .await
        .unwrap();
    let token = inbox.take();

    // One wrong guess burns the token
    assert!(!auth.verify_token(&ctx, "frank", "wrong").await.unwrap());
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert!(matches!(
        auth.verify_token(&ctx, "frank", &token).await,
        Err(TokenError::TokenNotFound)
    ));

    store.shutdown().await;
}

// Inbox doubles as a generator so the strategy above is fully deterministic.
impl passwordless_auth::TokenGenerator for Inbox {
    fn generate(&self, _ctx: &Context) -> Result<String, TokenError> {
        Ok("fixed-token".to_string())
    }

    fn sanitize(&self, _ctx: &Context, input: &str) -> Result<String, TokenError> {
        Ok(input.to_string())
    }
}

#[tokio::test]
async fn test_expired_token_rejected_before_sweep() {
    let store = Arc::new(MemoryStore::with_sweep_interval(Duration::from_secs(3600)).unwrap());
    let inbox = Arc::new(Inbox::default());
    let mut auth = Passwordless::new(store.clone());
    auth.set_transport(
        "short",
        inbox.clone(),
        Arc::new(PinGenerator::new(6)),
        Duration::from_millis(30),
    );
    let ctx = Context::new();

    auth.request_token(&ctx, "short", "gina", "gina@example.com")
        .await
        .unwrap();
    let pin = inbox.take();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(matches!(
        auth.verify_token(&ctx, "gina", &pin).await,
        Err(TokenError::TokenNotFound)
    ));
    assert_eq!(store.exists(&ctx, "gina").await.unwrap(), None);

    store.shutdown().await;
}
