use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

use crate::reaper::ExpiryPolicy;

/// Default config file, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "intake.yaml";

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,

    #[error("store backend '{0}' requires store.url")]
    MissingStoreUrl(StoreBackend),
}

impl Config {
    /// Load configuration from a YAML file. A missing file yields defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        Ok(serde_saphyr::from_str(&expanded)?)
    }

    /// Check settings that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend != StoreBackend::Memory && self.store.url().is_none() {
            return Err(ConfigError::MissingStoreUrl(self.store.backend));
        }
        Ok(())
    }
}

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_ttl() -> u64 {
    1800
}

fn default_idempotency_window() -> u64 {
    1800
}

fn default_sweep_interval() -> u64 {
    300
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports the following syntax (shell-compatible):
/// - `${VAR}` - Required variable, errors if not set
/// - `${VAR:-default}` - Optional variable with default value
/// - `${VAR:-}` - Optional variable, empty string if not set
/// - `$$` - Escaped `$` (only needed before `{` to prevent expansion)
///
/// Nested expansion (`${A:-${B}}`) is not supported.
///
/// ```yaml
/// store:
///   backend: ${INTAKE_BACKEND:-sqlite}
///   url: ${DATABASE_URL}
/// ```
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                result.push('$');
            }
            Some('{') => {
                chars.next();
                result.push_str(&parse_var_reference(&mut chars)?);
            }
            _ => result.push('$'),
        }
    }

    Ok(result)
}

/// Parse `VAR}` or `VAR:-default}` after a `${`.
fn parse_var_reference(
    chars: &mut std::iter::Peekable<std::str::Chars>,
) -> Result<String, ConfigError> {
    let mut var_name = String::new();
    let mut default_value: Option<String> = None;

    loop {
        let Some(c) = chars.next() else {
            return Err(ConfigError::UnclosedVarReference);
        };
        match c {
            '}' => break,
            ':' if default_value.is_none() && chars.peek() == Some(&'-') => {
                chars.next();
                default_value = Some(String::new());
            }
            _ => match default_value.as_mut() {
                Some(default) => default.push(c),
                None => var_name.push(c),
            },
        }
    }

    match std::env::var(&var_name) {
        Ok(value) => Ok(value),
        Err(_) => default_value.ok_or(ConfigError::MissingEnvVar(var_name)),
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

// ============================================================================
// StoreConfig
// ============================================================================

/// Which storage backend holds sessions, event markers and registrations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process maps. Single instance only, lost on restart.
    #[default]
    Memory,
    Redis,
    Sqlite,
    #[serde(alias = "postgresql")]
    #[value(alias = "postgresql")]
    Postgres,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Connection URL for redis, sqlite and postgres. Empty counts as unset.
    #[serde(default)]
    pub url: Option<String>,
    /// Session TTL in seconds, 0 = never expire.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// How long a processed-event marker suppresses redeliveries.
    #[serde(default = "default_idempotency_window")]
    pub idempotency_window_seconds: u64,
    /// Background sweep period in seconds, 0 = disabled.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Fail events whose session cannot be loaded instead of starting over.
    #[serde(default)]
    pub strict_load: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: None,
            ttl_seconds: default_ttl(),
            idempotency_window_seconds: default_idempotency_window(),
            sweep_interval_seconds: default_sweep_interval(),
            strict_load: false,
        }
    }
}

impl StoreConfig {
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().filter(|url| !url.trim().is_empty())
    }

    pub fn session_expiry(&self) -> ExpiryPolicy {
        ExpiryPolicy::from_seconds(self.ttl_seconds)
    }

    pub fn event_window(&self) -> ExpiryPolicy {
        ExpiryPolicy::from_seconds(self.idempotency_window_seconds)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_seconds > 0).then(|| Duration::from_secs(self.sweep_interval_seconds))
    }
}
