//! Configuration management for fraglet
//!
//! Handles loading the YAML configuration: logging settings, the fragment
//! options and the local forwarder.

use crate::constants::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_LISTEN_ADDR};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

/// Fragment options, kept as raw strings and parsed once at startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentConfig {
    /// `tlshello`, a write range such as `1-3`, or empty for every write
    #[serde(default)]
    pub packets: String,
    /// Chunk length range in bytes, e.g. `100-200`
    #[serde(default)]
    pub length: String,
    /// Pause range after each chunk in milliseconds, e.g. `10-20`
    #[serde(default)]
    pub interval: String,
}

/// Local forwarder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardConfig {
    /// Local address accepting client connections
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Remote `host:port` every client connection is forwarded to
    #[serde(default)]
    pub remote: String,
    /// Outbound connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Set TCP_NODELAY on outbound sockets so chunks leave as separate segments
    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,
    /// Rewrite the remote through IP4P AAAA records
    #[serde(default)]
    pub ip4p: bool,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            remote: String::new(),
            connect_timeout: default_connect_timeout(),
            tcp_nodelay: default_tcp_nodelay(),
            ip4p: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Path to logging theme configuration file
    #[serde(default = "default_log_theme_path")]
    pub log_theme_path: String,
    /// Whether to log to file
    #[serde(default)]
    pub log_to_file: bool,
    /// Path to log file (used when log_to_file is true)
    #[serde(default)]
    pub log_file_path: Option<String>,
    /// Fragmentation options
    #[serde(default)]
    pub fragment: FragmentConfig,
    /// Forwarder options
    #[serde(default)]
    pub forward: ForwardConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_theme_path: default_log_theme_path(),
            log_to_file: false,
            log_file_path: None,
            fragment: FragmentConfig::default(),
            forward: ForwardConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_log_theme_path() -> String {
    "config/logging_theme.yml".to_string()
}

fn default_listen() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_tcp_nodelay() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file
    pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        match fs::read_to_string(&path).await {
            Ok(contents) => Self::from_yaml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Configuration file not found at '{}', using default configuration",
                    path.as_ref().display()
                );
                let config = Config::default();
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read configuration file '{}': {}",
                path.as_ref().display(),
                e
            )),
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse YAML configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml).await?;
        Ok(())
    }

    /// Validate configuration fields.
    ///
    /// Fragment options are checked separately when the factory is built.
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.log_level.to_uppercase().as_str()) {
            return Err(anyhow::anyhow!("Invalid log level: {}", self.log_level));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if path.trim().is_empty() {
                    return Err(anyhow::anyhow!(
                        "Log file path cannot be empty when log_to_file is true"
                    ));
                }
            }
        }

        if self.forward.listen.trim().is_empty() {
            return Err(anyhow::anyhow!("Forward listen address cannot be empty"));
        }
        if self.forward.connect_timeout == 0 {
            return Err(anyhow::anyhow!("Connect timeout must be greater than 0"));
        }

        Ok(())
    }
}
