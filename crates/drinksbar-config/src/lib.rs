#![deny(unsafe_code)]

//! Configuration loading and validation for drinksbar.
//!
//! Loads TOML configuration files and validates them before the service
//! touches any socket. Provides the [`AppConfig`] type as the central
//! configuration structure; command-line flags are layered on top of it by
//! the CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Largest payload capacity accepted by validation.
pub const MAX_PAYLOAD_LIMIT: usize = 64 * 1024;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TCP and UDP ports are required")]
    MissingPorts,

    #[error("stream and datagram paths must be different (both are {})", .0.display())]
    PathConflict(PathBuf),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Network ports reserved for the inventory protocol.
    #[serde(default)]
    pub ports: PortsConfig,

    /// Resource quantities.
    #[serde(default)]
    pub inventory: InventoryConfig,

    /// Service lifetime settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Unix domain socket endpoints.
    #[serde(default)]
    pub uds: UdsConfig,

    /// Receive buffer policy.
    #[serde(default)]
    pub payload: PayloadConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// TCP and UDP ports. Both are required and must be non-zero.
///
/// They are validated at startup but not bound by the service yet.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp_port: Option<u16>,
}

/// Atom stock held by the bar. Echoed at startup only.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default)]
    pub oxygen: u64,

    #[serde(default)]
    pub carbon: u64,

    #[serde(default)]
    pub hydrogen: u64,
}

/// Service lifetime settings.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Overall deadline in seconds (0 = no deadline).
    #[serde(default)]
    pub timeout_secs: u64,
}

impl ServiceConfig {
    /// The configured deadline, or `None` when disabled.
    pub fn deadline(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Filesystem addresses of the two local endpoints.
///
/// An absent or empty path leaves that transport inactive.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdsConfig {
    /// Path of the connection-oriented (stream) socket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_path: Option<PathBuf>,

    /// Path of the connectionless (datagram) socket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datagram_path: Option<PathBuf>,
}

impl UdsConfig {
    /// The stream endpoint, if activated.
    pub fn stream_path(&self) -> Option<&Path> {
        active_path(&self.stream_path)
    }

    /// The datagram endpoint, if activated.
    pub fn datagram_path(&self) -> Option<&Path> {
        active_path(&self.datagram_path)
    }
}

fn active_path(path: &Option<PathBuf>) -> Option<&Path> {
    path.as_deref().filter(|p| !p.as_os_str().is_empty())
}

/// What to do with a message larger than [`PayloadConfig::max_bytes`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OversizePolicy {
    /// Keep the first `max_bytes` and flag the payload as truncated.
    #[default]
    Truncate,
    /// Discard the message and report nothing received.
    Reject,
}

/// Receive buffer policy shared by both transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadConfig {
    /// Maximum number of payload bytes kept per receive.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    #[serde(default)]
    pub oversize: OversizePolicy,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            oversize: OversizePolicy::default(),
        }
    }
}

fn default_max_bytes() -> usize {
    255
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading configuration file");
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// Only the file syntax is checked here. Required values such as the
    /// ports may still come from the command line, so [`validate`] runs
    /// once everything is merged.
    ///
    /// [`validate`]: AppConfig::validate
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate_payload()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tcp = self.ports.tcp_port.unwrap_or(0);
        let udp = self.ports.udp_port.unwrap_or(0);
        if tcp == 0 || udp == 0 {
            return Err(ConfigError::MissingPorts);
        }

        if let (Some(stream), Some(datagram)) = (self.uds.stream_path(), self.uds.datagram_path())
        {
            if stream == datagram {
                return Err(ConfigError::PathConflict(stream.to_path_buf()));
            }
        }

        self.validate_payload()
    }

    fn validate_payload(&self) -> Result<(), ConfigError> {
        if self.payload.max_bytes == 0 || self.payload.max_bytes > MAX_PAYLOAD_LIMIT {
            return Err(ConfigError::Validation(format!(
                "payload.max_bytes must be in 1..={MAX_PAYLOAD_LIMIT}, got {}",
                self.payload.max_bytes
            )));
        }
        Ok(())
    }

    /// Whether at least one transport is activated.
    pub fn has_endpoints(&self) -> bool {
        self.uds.stream_path().is_some() || self.uds.datagram_path().is_some()
    }
}
