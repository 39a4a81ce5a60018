// Core components
mod config;
mod context;
mod error;
mod generator;
mod passwordless;
mod strategy;
mod time_utils;
mod transport;

// Storage and verification hooks
pub mod hashing;
pub mod post_verify;
pub mod storage;

// Core components exports
pub use config::{ConfigPreset, PasswordlessConfig};
pub use context::{Context, Envelope, RequestSource, ResponseSink};
pub use error::TokenError;
pub use generator::{
    ByteGenerator, CROCKFORD_ALPHABET, CrockfordGenerator, MAX_ALPHABET_SIZE, PinGenerator,
    TokenGenerator, sample_alphabet,
};
pub use passwordless::{
    Passwordless, PasswordlessBuilder, request_token, verify_token, verify_token_with,
};
pub use strategy::{Strategy, StrategyBuilder};
pub use transport::{LogTransport, Transport};

// Storage and hook exports
pub use post_verify::{
    BoxedPostVerifyAction, DeleteAlways, DeleteOnSuccess, FnAction, PostVerifyAction,
    VerifyOutcome,
};
pub use storage::{MemoryStore, SealedStore, StorageStats, TokenStore};
