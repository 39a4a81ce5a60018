use std::time::Duration;

/// Predefined configuration presets for common use cases.
///
/// These presets provide sensible defaults for different deployment scenarios,
/// balancing security, usability, and performance requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPreset {
    /// Production-ready configuration.
    ///
    /// - Default TTL: 10 minutes (enough for e-mail delivery delays)
    /// - Sweep interval: 30 seconds
    /// - Token length: 12 Crockford symbols, PIN length: 6 digits
    Production,

    /// Development-friendly configuration.
    ///
    /// - Default TTL: 1 hour (longer window for manual testing)
    /// - Sweep interval: 5 seconds
    /// - Token length: 8 symbols, PIN length: 4 digits
    Development,

    /// High-security configuration.
    ///
    /// - Default TTL: 3 minutes
    /// - Sweep interval: 10 seconds
    /// - Token length: 16 symbols, PIN length: 8 digits
    HighSecurity,

    /// Load configuration from environment variables.
    ///
    /// Reads configuration from:
    /// - `PASSWORDLESS_DEFAULT_TTL`: Default TTL in seconds (default: 600)
    /// - `PASSWORDLESS_SWEEP_INTERVAL`: Sweep interval in seconds (default: 30)
    /// - `PASSWORDLESS_TOKEN_LENGTH`: Token length in symbols (default: 12)
    /// - `PASSWORDLESS_PIN_LENGTH`: PIN length in digits (default: 6)
    FromEnv,
}

/// Configuration for the passwordless token system.
///
/// # Environment Variables
///
/// `PasswordlessConfig::default()` honours the variables listed on
/// [`ConfigPreset::FromEnv`].
///
/// # Example
///
/// ```rust
/// use passwordless_auth::{ConfigPreset, PasswordlessConfig};
/// use std::time::Duration;
///
/// let config = PasswordlessConfig::from(ConfigPreset::Production);
/// assert_eq!(config.default_ttl, Duration::from_secs(600));
///
/// let custom = PasswordlessConfig {
///     default_ttl: Duration::from_secs(300),
///     ..config
/// };
/// assert!(custom.validate().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct PasswordlessConfig {
    /// TTL applied to strategies that do not set their own
    pub default_ttl: Duration,
    /// Interval between in-memory expiry sweeps
    pub sweep_interval: Duration,
    /// Length of alphanumeric tokens
    pub token_length: usize,
    /// Length of numeric PINs
    pub pin_length: usize,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for PasswordlessConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(env_or("PASSWORDLESS_DEFAULT_TTL", 600)),
            sweep_interval: Duration::from_secs(env_or("PASSWORDLESS_SWEEP_INTERVAL", 30)),
            token_length: env_or("PASSWORDLESS_TOKEN_LENGTH", 12),
            pin_length: env_or("PASSWORDLESS_PIN_LENGTH", 6),
        }
    }
}

impl PasswordlessConfig {
    /// Validates the configuration and returns any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.default_ttl.as_secs() < 60 {
            warnings.push("Very short token TTL (< 1 minute) may expire before delivery".to_string());
        }
        if self.default_ttl.as_secs() > 86_400 {
            warnings.push("Long token TTL (> 1 day) widens the guessing window".to_string());
        }

        if self.sweep_interval.is_zero() {
            warnings.push("Sweep interval of zero disables periodic expiry sweeps".to_string());
        } else if self.sweep_interval > self.default_ttl {
            warnings.push(
                "Sweep interval longer than the TTL keeps expired records in memory".to_string(),
            );
        }

        if self.token_length < 6 {
            warnings.push("Token length below 6 symbols is easy to guess".to_string());
        }
        if self.pin_length < 4 {
            warnings.push("PIN length below 4 digits is easy to guess".to_string());
        }
        if self.pin_length > 19 {
            warnings.push("PIN length above 19 digits is not supported".to_string());
        }

        warnings
    }

    /// Returns a summary of the current configuration.
    pub fn summary(&self) -> String {
        format!(
            "PasswordlessConfig {{ TTL: {}s, Sweep: {}s, Token length: {}, PIN length: {} }}",
            self.default_ttl.as_secs(),
            self.sweep_interval.as_secs(),
            self.token_length,
            self.pin_length,
        )
    }
}

impl From<ConfigPreset> for PasswordlessConfig {
    fn from(preset: ConfigPreset) -> Self {
        match preset {
            ConfigPreset::Production => Self {
                default_ttl: Duration::from_secs(600),
                sweep_interval: Duration::from_secs(30),
                token_length: 12,
                pin_length: 6,
            },
            ConfigPreset::Development => Self {
                default_ttl: Duration::from_secs(3600),
                sweep_interval: Duration::from_secs(5),
                token_length: 8,
                pin_length: 4,
            },
            ConfigPreset::HighSecurity => Self {
                default_ttl: Duration::from_secs(180),
                sweep_interval: Duration::from_secs(10),
                token_length: 16,
                pin_length: 8,
            },
            ConfigPreset::FromEnv => Self::default(),
        }
    }
}
