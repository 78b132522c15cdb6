//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::websocket::{HubConfig, DEFAULT_HEARTBEAT_INTERVAL};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub websocket: WebSocketConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Real-time feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Path that accepts the WebSocket upgrade
    #[serde(default = "default_ws_path")]
    pub path: String,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Frames buffered per connection before new ones are dropped
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Largest accepted inbound message, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_heartbeat_interval() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL.as_secs()
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_max_message_size() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_max_connections() -> usize {
    10_000
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: default_ws_path(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            outbound_buffer: default_outbound_buffer(),
            max_message_size: default_max_message_size(),
            max_connections: default_max_connections(),
        }
    }
}

impl WebSocketConfig {
    /// Heartbeat period; never shorter than one second
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Settings for the connection hub
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_connections: self.max_connections,
            outbound_buffer: self.outbound_buffer,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("matchfeed").join("config.toml")),
            Some(PathBuf::from("/etc/matchfeed/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(host) = var("MATCHFEED_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("MATCHFEED_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        // WebSocket overrides
        if let Some(path) = var("MATCHFEED_WS_PATH") {
            self.websocket.path = path;
        }
        if let Some(secs) = var("MATCHFEED_HEARTBEAT_SECS").and_then(|s| s.parse().ok()) {
            self.websocket.heartbeat_interval_secs = secs;
        }

        // Logging overrides
        if let Some(level) = var("MATCHFEED_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("MATCHFEED_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Matchfeed Configuration
#
# Environment variables override these settings:
# - MATCHFEED_HOST
# - MATCHFEED_PORT
# - MATCHFEED_WS_PATH
# - MATCHFEED_HEARTBEAT_SECS
# - MATCHFEED_LOG_LEVEL
# - MATCHFEED_LOG_FORMAT

[server]
# Listener host
host = "0.0.0.0"

# Listener port
port = 8000

[websocket]
# Path that accepts WebSocket upgrades
path = "/ws"

# Seconds between heartbeat sweeps; silent clients are dropped after two
heartbeat_interval_secs = 30

# Frames queued per connection before new frames are dropped
outbound_buffer = 64

# Largest accepted client message (bytes)
max_message_size = 1048576

# Maximum concurrent connections
max_connections = 10000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
