//! Configuration loading for the conductor.
//!
//! Configuration is loaded from a TOML file (default: `conductor.toml`).
//! Every section and field is optional.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the conductor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Player-facing listener.
    #[serde(default)]
    pub server: ServerConfig,
    /// Connection limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Barrier defaults.
    #[serde(default)]
    pub barrier: BarrierConfig,
    /// Fault command defaults.
    #[serde(default)]
    pub faults: FaultsConfig,
    /// HTTP endpoints.
    #[serde(default)]
    pub http: HttpConfig,
}

/// Player-facing listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for player connections (default: 0.0.0.0:4711).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Connection limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Timeout in seconds for receiving Hello after connection (default: 10).
    #[serde(default = "default_hello_timeout_secs")]
    pub hello_timeout_secs: u64,
    /// Maximum concurrent player connections (default: 64).
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    /// Maximum frame size in bytes (default: 64 KiB).
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

/// Barrier defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BarrierConfig {
    /// Deadline applied when a barrier is opened without one.
    /// `0` means no deadline (default: 0).
    #[serde(default)]
    pub default_timeout_secs: u64,
}

/// Fault command defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct FaultsConfig {
    /// How long the convenience methods wait for an ack (default: 30).
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Bind address for the HTTP server (default: 127.0.0.1:8711).
    #[serde(default = "default_http_bind")]
    pub bind_address: String,
    /// Serve /health, /status and /metrics (default: true).
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:4711".to_string()
}

fn default_hello_timeout_secs() -> u64 {
    10
}

fn default_max_players() -> usize {
    64
}

fn default_max_frame_size() -> usize {
    conductor_types::MAX_FRAME_SIZE
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_http_bind() -> String {
    "127.0.0.1:8711".to_string()
}

fn default_http_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            hello_timeout_secs: default_hello_timeout_secs(),
            max_players: default_max_players(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl Default for FaultsConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_http_bind(),
            enabled: default_http_enabled(),
        }
    }
}

impl LimitsConfig {
    /// Hello deadline as a [`Duration`].
    pub fn hello_timeout(&self) -> Duration {
        Duration::from_secs(self.hello_timeout_secs)
    }
}

impl BarrierConfig {
    /// Default barrier deadline, `None` when disabled.
    pub fn default_timeout(&self) -> Option<Duration> {
        (self.default_timeout_secs > 0).then(|| Duration::from_secs(self.default_timeout_secs))
    }
}

impl FaultsConfig {
    /// Ack deadline as a [`Duration`].
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
