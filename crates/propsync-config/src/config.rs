// crates/propsync-config/src/config.rs
// ============================================================================
// Module: PropSync Configuration
// Description: TOML configuration model, strict loading, and validation.
// Purpose: Resolve, parse, and fail-closed validate backend configuration.
// Dependencies: propsync-core, propsync-store-sqlite, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Configuration is resolved from an explicit path, the `PROPSYNC_CONFIG`
//! environment variable, or `propsync.toml` in the working directory. An
//! explicit or environment path must exist; a missing default path yields
//! the built-in defaults. Every limit violation is an error, never a
//! silent clamp.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use propsync_core::RetryPolicy;
use propsync_store_sqlite::SqliteStoreConfig;
use propsync_store_sqlite::SqliteStoreMode;
use propsync_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "PROPSYNC_CONFIG";
/// Default config file name in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "propsync.toml";
/// Maximum accepted config file size in bytes.
const MAX_CONFIG_BYTES: u64 = 1_048_576;
/// Maximum total config path length.
const MAX_PATH_LENGTH: usize = 4096;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Upper bound for retry and reconnect base delays (ms).
const MAX_BASE_DELAY_MS: u64 = 60_000;
/// Upper bound for reconnect attempt counts.
const MAX_RECONNECT_ATTEMPTS: u32 = 100;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file I/O failure.
    #[error("config io error: {0}")]
    Io(String),
    /// Config file parse failure.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Config content failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address the server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Store backend selection.
///
/// # Invariants
/// - Variants are stable for TOML parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Volatile in-memory store.
    #[default]
    Memory,
    /// Durable `SQLite` store.
    Sqlite,
}

/// Store backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSectionConfig {
    /// Backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// Database file path; required for the `SQLite` backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// `SQLite` busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreSectionConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreSectionConfig {
    /// Builds the `SQLite` store config from this section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no path is configured.
    pub fn sqlite_config(&self) -> Result<SqliteStoreConfig, ConfigError> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| ConfigError::Invalid("store.path is required for sqlite".to_string()))?;
        Ok(SqliteStoreConfig {
            path,
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
        })
    }
}

/// Gateway retry settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySectionConfig {
    /// Total attempts per gateway call, including the first.
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    /// Backoff base delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetrySectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetrySectionConfig {
    /// Builds the runtime retry policy from this section.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

/// Realtime reconnect settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSectionConfig {
    /// Consecutive reconnect attempts before giving up.
    #[serde(default = "default_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Reconnect backoff base delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
}

impl Default for SyncSectionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_reconnect_attempts(),
            reconnect_base_delay_ms: default_base_delay_ms(),
        }
    }
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Root PropSync configuration.
///
/// # Invariants
/// - `validate()` must pass before the config is used to build anything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropsyncConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Store backend settings.
    #[serde(default)]
    pub store: StoreSectionConfig,
    /// Gateway retry settings.
    #[serde(default)]
    pub retry: RetrySectionConfig,
    /// Realtime reconnect settings.
    #[serde(default)]
    pub sync: SyncSectionConfig,
}

impl PropsyncConfig {
    /// Loads configuration from an explicit path, the environment, or the
    /// default file.
    ///
    /// An explicit or environment-provided path must exist. A missing
    /// default file yields the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for path violations, unreadable or
    /// oversized files, non-UTF-8 content, or parse failures.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match std::env::var_os(CONFIG_ENV_VAR) {
                Some(value) => (PathBuf::from(value), true),
                None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
            },
        };
        validate_config_path(&resolved)?;
        if !resolved.exists() {
            if required {
                return Err(ConfigError::Io(format!(
                    "config file not found: {}",
                    resolved.display()
                )));
            }
            return Ok(Self::default());
        }
        let metadata =
            std::fs::metadata(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_BYTES {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let bytes = std::fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        toml::from_str(&text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Validates every section, failing closed on the first violation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::Invalid("server.bind must be a socket address".to_string()))?;
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self.store.store_type == StoreType::Sqlite && self.store.path.is_none() {
            return Err(ConfigError::Invalid("store.path is required for sqlite".to_string()));
        }
        if self.store.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "store.busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_ms == 0 || self.retry.base_delay_ms > MAX_BASE_DELAY_MS {
            return Err(ConfigError::Invalid("retry.base_delay_ms out of range".to_string()));
        }
        if self.sync.max_reconnect_attempts == 0
            || self.sync.max_reconnect_attempts > MAX_RECONNECT_ATTEMPTS
        {
            return Err(ConfigError::Invalid(
                "sync.max_reconnect_attempts out of range".to_string(),
            ));
        }
        if self.sync.reconnect_base_delay_ms == 0
            || self.sync.reconnect_base_delay_ms > MAX_BASE_DELAY_MS
        {
            return Err(ConfigError::Invalid(
                "sync.reconnect_base_delay_ms out of range".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Returns the default server bind address.
fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Returns the default maximum request body size.
const fn default_max_body_bytes() -> u64 {
    1_048_576
}

/// Returns the default `SQLite` busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Returns the default gateway retry attempt count.
const fn default_retry_attempts() -> u32 {
    3
}

/// Returns the default backoff base delay.
const fn default_base_delay_ms() -> u64 {
    1_000
}

/// Returns the default reconnect attempt count.
const fn default_reconnect_attempts() -> u32 {
    5
}

// ============================================================================
// SECTION: Path Validation
// ============================================================================

/// Validates config paths for safety limits.
fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}
