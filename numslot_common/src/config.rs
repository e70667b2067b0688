//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load the TOML configuration
//! shared by the producer and consumer hosts.
//!
//! # Usage
//!
//! ```rust,no_run
//! use numslot_common::config::{ConfigLoader, ConfigError, NumslotConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = NumslotConfig::load(Path::new("numslot.toml"))?;
//!     config.validate()?;
//!     println!("Object: {}", config.exchange.shm_name);
//!     Ok(())
//! }
//! ```

use crate::consts::{
    DEFAULT_ATTACH_TIMEOUT_MS, DEFAULT_CONSUMER_INTERVAL_MS, DEFAULT_PERMISSIONS,
    DEFAULT_PRODUCER_INTERVAL_MS, DEFAULT_SHM_NAME, DEFAULT_VALUE_MAX, DEFAULT_VALUE_MIN,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information, including every poll cycle.
    Debug,
    /// Lifecycle and exchanged values.
    #[default]
    Info,
    /// Warning messages for soft failures.
    Warn,
    /// Error messages for fatal problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Common configuration fields shared by both hosts.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "numslot-bench-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_service_name() -> String {
    "numslot".to_string()
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// What a SIGINT handler does with the peer pid recorded in the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForwardPolicy {
    /// Send SIGTERM to the recorded peer whenever its pid is positive.
    #[default]
    Always,
    /// Probe the pid with signal 0 first and only forward if it exists.
    ///
    /// This does not protect against a recycled pid; it only skips peers
    /// that are already gone.
    IfAlive,
}

/// Slot exchange parameters.
///
/// # TOML Example
///
/// ```toml
/// [exchange]
/// shm_name = "posix-shar-object"
/// permissions = 0o660
/// producer_interval_ms = 500
/// consumer_interval_ms = 100
/// value_min = 0
/// value_max = 999
/// forward_policy = "if_alive"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExchangeConfig {
    /// Name of the shared memory object; a leading `/` is optional.
    pub shm_name: String,
    /// Permission bits the object is created with (before umask).
    pub permissions: u32,
    /// Producer sleep between poll cycles.
    pub producer_interval_ms: u64,
    /// Consumer sleep between poll cycles.
    pub consumer_interval_ms: u64,
    /// Lower bound of generated values (inclusive).
    pub value_min: i64,
    /// Upper bound of generated values (inclusive).
    pub value_max: i64,
    /// How long the producer retries attaching to an unsized object.
    /// Zero means a single attempt.
    pub attach_timeout_ms: u64,
    /// Peer forwarding behaviour of the SIGINT handler.
    pub forward_policy: ForwardPolicy,
    /// Fixed RNG seed; `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            shm_name: DEFAULT_SHM_NAME.to_string(),
            permissions: DEFAULT_PERMISSIONS,
            producer_interval_ms: DEFAULT_PRODUCER_INTERVAL_MS,
            consumer_interval_ms: DEFAULT_CONSUMER_INTERVAL_MS,
            value_min: DEFAULT_VALUE_MIN,
            value_max: DEFAULT_VALUE_MAX,
            attach_timeout_ms: DEFAULT_ATTACH_TIMEOUT_MS,
            forward_policy: ForwardPolicy::default(),
            seed: None,
        }
    }
}

impl ExchangeConfig {
    /// Validate the exchange parameters.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `shm_name` is empty or only a `/`
    /// - either poll interval is zero
    /// - `value_min > value_max`
    /// - `permissions` has bits above `0o777`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shm_name.trim_start_matches('/').is_empty() {
            return Err(ConfigError::ValidationError(
                "shm_name cannot be empty".to_string(),
            ));
        }
        if self.producer_interval_ms == 0 || self.consumer_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll intervals must be at least 1 ms".to_string(),
            ));
        }
        if self.value_min > self.value_max {
            return Err(ConfigError::ValidationError(format!(
                "value range is empty: [{}, {}]",
                self.value_min, self.value_max
            )));
        }
        if self.permissions > 0o777 {
            return Err(ConfigError::ValidationError(format!(
                "permissions {:#o} exceed 0o777",
                self.permissions
            )));
        }
        Ok(())
    }

    /// Producer poll interval as a `Duration`.
    pub fn producer_interval(&self) -> Duration {
        Duration::from_millis(self.producer_interval_ms)
    }

    /// Consumer poll interval as a `Duration`.
    pub fn consumer_interval(&self) -> Duration {
        Duration::from_millis(self.consumer_interval_ms)
    }

    /// Attach retry budget as a `Duration`.
    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_timeout_ms)
    }
}

/// Top-level configuration file layout. Both sections are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NumslotConfig {
    /// Logging and instance identity.
    #[serde(default)]
    pub shared: SharedConfig,
    /// Slot exchange parameters.
    #[serde(default)]
    pub exchange: ExchangeConfig,
}

impl NumslotConfig {
    /// Validate both sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.exchange.validate()
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
