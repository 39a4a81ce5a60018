//! Runs a stateless login round trip: the token lives only in a sealed
//! envelope held by the client.
//!
//! Run with: cargo run --example sealed_flow

use passwordless_auth::storage::{EnvelopeJar, SealedStore};
use passwordless_auth::{Context, CrockfordGenerator, TokenGenerator, TokenStore};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let store = SealedStore::new(b"demo-signing-key", &[0x5a; 32])?
        .with_name("login")
        .with_path("/auth");
    let generator = CrockfordGenerator::new(8);

    // The jar plays the browser: it receives and presents the envelope
    let jar = Arc::new(EnvelopeJar::new());
    let ctx = Context::new()
        .with_response_sink(jar.clone())
        .with_request_source(jar.clone())
        .with_timeout(Duration::from_secs(5));

    let token = generator.generate(&ctx)?;
    store.store(&ctx, &token, "bob", Duration::from_secs(120)).await?;
    println!("Issued code {token} for bob");

    if let Some(envelope) = jar.get("login") {
        println!(
            "Envelope '{}' (path {}, {}s left): {}...",
            envelope.name,
            envelope.path,
            envelope.max_age().as_secs(),
            &envelope.value[..24.min(envelope.value.len())]
        );
    }
    println!("Expires at: {:?}", store.exists(&ctx, "bob").await?);

    let typed = token.to_uppercase();
    let sanitized = generator.sanitize(&ctx, &typed)?;
    println!("User typed {typed}, verified: {}", store.verify(&ctx, &sanitized, "bob").await?);

    // A client that edits its envelope is rejected, never trusted
    jar.present("login", "tampered-value");
    match store.verify(&ctx, &sanitized, "bob").await {
        Ok(valid) => println!("Tampered envelope verified: {valid}"),
        Err(e) => println!("Tampered envelope rejected: {e}"),
    }

    store.delete(&ctx, "bob").await?;
    println!("After delete: {:?}", store.exists(&ctx, "bob").await?);
    Ok(())
}
