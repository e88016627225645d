//! Configuration management
//!
//! Handles loading and validating agent configuration from TOML files.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub relay: RelayConfig,
    #[serde(default)]
    pub quic: QuicConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Home relay and local identity
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Home relay server address (host:port)
    pub home_address: String,
    /// Local peer identifier presented to relays
    pub peer_id: String,
}

/// QUIC transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QuicConfig {
    /// Connection idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// TLS SNI override (defaults to host from each relay address)
    pub server_name: Option<String>,
    /// Skip TLS certificate verification (insecure, dev only)
    #[serde(default)]
    pub insecure: bool,
    /// ALPN protocol identifier
    #[serde(default = "default_alpn")]
    pub alpn: String,
}

impl Default for QuicConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            keep_alive_secs: default_keep_alive(),
            server_name: None,
            insecure: false,
            alpn: default_alpn(),
        }
    }
}

/// Primary session resumption policy
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// First retry delay in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    /// Upper bound for the retry delay in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics endpoint
    #[serde(default)]
    pub enabled: bool,
    /// Metrics server bind address
    #[serde(default = "default_metrics_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: default_metrics_addr(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_idle_timeout() -> u64 { 30 }
fn default_keep_alive() -> u64 { 10 }
fn default_alpn() -> String { "relayconn".to_string() }
fn default_initial_backoff() -> u64 { 500 }
fn default_max_backoff() -> u64 { 30_000 }
fn default_metrics_addr() -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], 9090)) }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.relay.home_address.is_empty() {
            anyhow::bail!("relay.home_address must not be empty");
        }
        if self.relay.peer_id.is_empty() {
            anyhow::bail!("relay.peer_id must not be empty");
        }
        if self.quic.idle_timeout_secs == 0 {
            anyhow::bail!("quic.idle_timeout_secs must be > 0");
        }
        if self.quic.alpn.is_empty() {
            anyhow::bail!("quic.alpn must not be empty");
        }
        if self.reconnect.initial_backoff_ms == 0 {
            anyhow::bail!("reconnect.initial_backoff_ms must be > 0");
        }
        if self.reconnect.max_backoff_ms < self.reconnect.initial_backoff_ms {
            anyhow::bail!("reconnect.max_backoff_ms must be >= initial_backoff_ms");
        }
        Ok(())
    }
}
