//! Sync engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BASKET_STORE_URL` - Base URL of the Collection Store (e.g., `https://api.example.com/`)
//!
//! ## Optional
//! - `BASKET_STORE_TOKEN` - Bearer token sent to the Collection Store
//! - `BASKET_GUEST_POLICY` - `shared` (default), `per_session`, or `none`
//! - `BASKET_GUEST_ID` - Placeholder identity for the `shared` policy (default: `guest`)
//! - `BASKET_SERIALIZE_MUTATIONS` - Serialize mutations per product (default: `true`)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;

use basket_core::GuestId;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::identity::GuestPolicy;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_GUEST_ID: &str = "guest";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Sync engine configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Collection Store connection settings
    pub store: StoreConfig,
    /// How unauthenticated browsers are identified
    pub guest_policy: GuestPolicy,
    /// Whether mutations on the same product are serialized
    pub serialize_mutations: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Collection Store connection settings.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct StoreConfig {
    /// Base URL; collection routes are resolved relative to it
    pub base_url: Url,
    /// Optional bearer token
    pub token: Option<SecretString>,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl StoreConfig {
    /// Settings for an unauthenticated store at `base_url`.
    #[must_use]
    pub const fn new(base_url: Url) -> Self {
        Self {
            base_url,
            token: None,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the store token fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`SyncConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("BASKET_STORE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("BASKET_STORE_URL".to_string()))?;
        let base_url = parse_base_url(&base_url)?;

        let token = match lookup("BASKET_STORE_TOKEN") {
            Some(value) => {
                validate_secret_strength(&value, "BASKET_STORE_TOKEN")?;
                Some(SecretString::from(value))
            }
            None => None,
        };

        let guest_id = lookup("BASKET_GUEST_ID").unwrap_or_else(|| DEFAULT_GUEST_ID.to_string());
        let guest_policy = parse_guest_policy(
            lookup("BASKET_GUEST_POLICY").as_deref().unwrap_or("shared"),
            guest_id,
        )?;

        let serialize_mutations = parse_bool(
            "BASKET_SERIALIZE_MUTATIONS",
            lookup("BASKET_SERIALIZE_MUTATIONS").as_deref().unwrap_or("true"),
        )?;

        Ok(Self {
            store: StoreConfig { base_url, token },
            guest_policy,
            serialize_mutations,
            sentry_dsn: lookup("SENTRY_DSN"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse the store base URL, forcing a trailing slash so relative joins keep
/// any path prefix (e.g., `https://host/api` + `collections/cart`).
fn parse_base_url(value: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar("BASKET_STORE_URL".to_string(), e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidEnvVar(
            "BASKET_STORE_URL".to_string(),
            "must be an absolute http(s) URL".to_string(),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_guest_policy(value: &str, guest_id: String) -> Result<GuestPolicy, ConfigError> {
    match value {
        "shared" => {
            if guest_id.trim().is_empty() {
                return Err(ConfigError::InvalidEnvVar(
                    "BASKET_GUEST_ID".to_string(),
                    "must not be empty".to_string(),
                ));
            }
            Ok(GuestPolicy::Shared(GuestId::new(guest_id)))
        }
        "per_session" => Ok(GuestPolicy::PerSession),
        "none" => Ok(GuestPolicy::Refuse),
        other => Err(ConfigError::InvalidEnvVar(
            "BASKET_GUEST_POLICY".to_string(),
            format!("expected shared, per_session, or none (got {other})"),
        )),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a boolean (got {other})"),
        )),
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated token."
            ),
        ));
    }

    Ok(())
}
