//! Token generators.
//!
//! A generator produces the secret that is delivered to the user and
//! normalizes what the user types back in. Three generators are provided:
//!
//! - [`ByteGenerator`] draws from an arbitrary alphabet of up to 256 symbols
//! - [`CrockfordGenerator`] draws from Crockford's base 32 alphabet and repairs
//!   common transcription mistakes
//! - [`PinGenerator`] produces fixed-width numeric PINs

use rand::RngCore;
use rand::rngs::OsRng;

use super::config::PasswordlessConfig;
use super::{Context, TokenError};

/// Crockford's base 32 alphabet, which avoids visually similar characters.
pub const CROCKFORD_ALPHABET: &str = "0123456789abcdefghjkmnpqrstvwxyz";

/// Largest alphabet that a single random byte can index.
pub const MAX_ALPHABET_SIZE: usize = 256;

/// Generates and sanitizes cryptographically secure tokens.
pub trait TokenGenerator: Send + Sync {
    /// Returns a fresh token, or an error if no secure randomness is available.
    fn generate(&self, ctx: &Context) -> Result<String, TokenError>;

    /// Normalizes user-provided input into the form `generate` produces, so
    /// that minor transcription errors (e.g. `O` for `0`) still verify.
    ///
    /// Implementations must be idempotent.
    fn sanitize(&self, ctx: &Context, input: &str) -> Result<String, TokenError>;
}

/// Fills a buffer from the operating system's secure random source.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<(), TokenError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| TokenError::Entropy(e.to_string()))
}

/// Picks `length` symbols from `alphabet` using secure random bytes.
///
/// Reducing a byte modulo an alphabet size that does not divide 256 favours
/// the low symbols. Each draw is therefore offset by a running reservoir that
/// accumulates the complement of the previous residues, which spreads that
/// excess over the whole alphabet:
///
/// ```text
/// index      = (reservoir + byte) mod c
/// reservoir += (c + (c - byte mod c) mod c) mod c
/// ```
///
/// The reservoir is kept reduced modulo `c`; only its residue affects `index`.
pub fn sample_alphabet(alphabet: &[char], length: usize) -> Result<String, TokenError> {
    let c = alphabet.len();
    if c == 0 {
        return Err(TokenError::EmptyAlphabet);
    }
    if c > MAX_ALPHABET_SIZE {
        return Err(TokenError::AlphabetTooLarge(c));
    }

    let mut bytes = vec![0u8; length];
    fill_random(&mut bytes)?;

    let mut reservoir = 0usize;
    let token = bytes
        .iter()
        .map(|&raw| {
            let b = raw as usize;
            let symbol = alphabet[(reservoir + b) % c];
            reservoir = (reservoir + (c + (c - b % c) % c) % c) % c;
            symbol
        })
        .collect();
    Ok(token)
}

/// Generates tokens of a fixed length from an arbitrary alphabet.
///
/// Input is passed through `sanitize` unchanged.
///
/// # Example
///
/// ```rust
/// use passwordless_auth::{ByteGenerator, Context, TokenGenerator};
///
/// let generator = ByteGenerator::new("ab", 8);
/// let token = generator.generate(&Context::new()).unwrap();
/// assert_eq!(token.len(), 8);
/// assert!(token.chars().all(|c| c == 'a' || c == 'b'));
/// ```
#[derive(Debug, Clone)]
pub struct ByteGenerator {
    alphabet: Vec<char>,
    length: usize,
}

impl ByteGenerator {
    /// Creates a generator drawing `length` symbols from `alphabet`.
    pub fn new(alphabet: &str, length: usize) -> Self {
        Self {
            alphabet: alphabet.chars().collect(),
            length,
        }
    }

    /// Creates a generator from an explicit symbol list.
    pub fn from_symbols(alphabet: Vec<char>, length: usize) -> Self {
        Self { alphabet, length }
    }

    /// Number of symbols per token.
    pub fn length(&self) -> usize {
        self.length
    }
}

impl TokenGenerator for ByteGenerator {
    fn generate(&self, _ctx: &Context) -> Result<String, TokenError> {
        if self.length == 0 {
            return Err(TokenError::InvalidLength(
                "token length must be at least 1".to_string(),
            ));
        }
        sample_alphabet(&self.alphabet, self.length)
    }

    fn sanitize(&self, _ctx: &Context, input: &str) -> Result<String, TokenError> {
        Ok(input.to_string())
    }
}

/// Generates lower-case tokens from Crockford's base 32 alphabet.
///
/// `sanitize` lower-cases the input and maps `i`, `l` and `|` to `1` and `o`
/// to `0`, repairing the mistakes people make when copying a code by hand.
#[derive(Debug, Clone)]
pub struct CrockfordGenerator {
    inner: ByteGenerator,
}

impl CrockfordGenerator {
    /// Creates a generator producing tokens of `length` symbols.
    pub fn new(length: usize) -> Self {
        Self {
            inner: ByteGenerator::new(CROCKFORD_ALPHABET, length),
        }
    }

    /// Creates a generator using the configured `token_length`.
    pub fn from_config(config: &PasswordlessConfig) -> Self {
        Self::new(config.token_length)
    }
}

impl TokenGenerator for CrockfordGenerator {
    fn generate(&self, ctx: &Context) -> Result<String, TokenError> {
        self.inner.generate(ctx)
    }

    fn sanitize(&self, _ctx: &Context, input: &str) -> Result<String, TokenError> {
        Ok(input
            .to_lowercase()
            .chars()
            .map(|c| match c {
                'i' | 'l' | '|' => '1',
                'o' => '0',
                other => other,
            })
            .collect())
    }
}

/// Generates zero-padded numeric PINs.
///
/// Eight random bytes are read as a `u64` and reduced modulo `10^length`.
/// Because `2^64` is not a multiple of `10^length`, the lowest
/// `2^64 mod 10^length` values are very slightly more likely than the rest
/// (at most about one part in `10^(19 - length)`). This residual bias is
/// known and accepted.
#[derive(Debug, Clone)]
pub struct PinGenerator {
    length: usize,
}

impl PinGenerator {
    /// Longest PIN whose modulus still fits in a `u64`.
    pub const MAX_LENGTH: usize = 19;

    /// Creates a generator producing PINs of `length` digits.
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    /// Creates a generator using the configured `pin_length`.
    pub fn from_config(config: &PasswordlessConfig) -> Self {
        Self::new(config.pin_length)
    }
}

impl TokenGenerator for PinGenerator {
    fn generate(&self, _ctx: &Context) -> Result<String, TokenError> {
        if self.length == 0 || self.length > Self::MAX_LENGTH {
            return Err(TokenError::InvalidLength(format!(
                "PIN length must be between 1 and {}, got {}",
                Self::MAX_LENGTH,
                self.length
            )));
        }

        let mut bytes = [0u8; 8];
        fill_random(&mut bytes)?;
        let modulus = 10u64.pow(self.length as u32);
        let value = u64::from_le_bytes(bytes) % modulus;
        Ok(format!("{:0width$}", value, width = self.length))
    }

    fn sanitize(&self, _ctx: &Context, input: &str) -> Result<String, TokenError> {
        Ok(input
            .chars()
            .map(|c| match c {
                'i' | 'I' | 'l' | 'L' | '|' => '1',
                'o' | 'O' => '0',
                's' | 'S' => '5',
                'b' => '6',
                'B' => '8',
                other => other.to_ascii_lowercase(),
            })
            .collect())
    }
}
