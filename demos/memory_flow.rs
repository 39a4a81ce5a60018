//! Issues a PIN through the log transport and verifies it against the
//! in-memory store.
//!
//! Run with: cargo run --example memory_flow

use async_trait::async_trait;
use passwordless_auth::storage::MemoryStore;
use passwordless_auth::{
    ConfigPreset, Context, CrockfordGenerator, LogTransport, Passwordless, PasswordlessConfig,
    PinGenerator, Strategy, TokenError, TokenStore, Transport,
};
use std::sync::{Arc, Mutex};

/// Logs like `LogTransport` and also remembers the token, so the demo can
/// play the user's part.
struct DemoInbox {
    log: LogTransport,
    last: Mutex<String>,
}

#[async_trait]
impl Transport for DemoInbox {
    async fn send(
        &self,
        ctx: &Context,
        token: &str,
        uid: &str,
        recipient: &str,
    ) -> Result<(), TokenError> {
        *self.last.lock().unwrap() = token.to_string();
        self.log.send(ctx, token, uid, recipient).await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = PasswordlessConfig::from(ConfigPreset::Development);
    println!("Using {}", config.summary());
    for warning in config.validate() {
        println!("  warning: {warning}");
    }

    let store = Arc::new(MemoryStore::with_config(&config)?);
    let inbox = Arc::new(DemoInbox {
        log: LogTransport::with_message(|token, uid| format!("your code, {uid}: {token}")),
        last: Mutex::new(String::new()),
    });

    let auth = Passwordless::builder(store.clone())
        .strategy(
            "sms",
            Strategy::builder(Arc::new(PinGenerator::from_config(&config)), inbox.clone())
                .ttl(config.default_ttl)
                .valid_when(|ctx| ctx.attribute("phone") == Some("verified"))
                .build(),
        )
        .transport(
            "email",
            inbox.clone(),
            Arc::new(CrockfordGenerator::from_config(&config)),
            config.default_ttl,
        )
        .build();

    let ctx = Context::new();
    println!("Strategies for an anonymous request: {:?}", auth.list_strategies(&ctx));
    let phone_ctx = ctx.clone().with_attribute("phone", "verified");
    println!("Strategies with a verified phone: {:?}", auth.list_strategies(&phone_ctx));

    auth.request_token(&phone_ctx, "sms", "alice", "+15550100").await?;
    let pin = inbox.last.lock().unwrap().clone();

    println!("Wrong PIN accepted: {}", auth.verify_token(&ctx, "alice", "0000").await?);
    println!("Right PIN accepted: {}", auth.verify_token(&ctx, "alice", &pin).await?);

    match auth.verify_token(&ctx, "alice", &pin).await {
        Err(e) if e.is_not_found() => println!("Replay rejected: {e}"),
        other => println!("Unexpected replay result: {other:?}"),
    }

    println!("Store: {:?}", store.stats().await?);
    store.shutdown().await;
    Ok(())
}
