//! Configuration management for tasksync
//!
//! This module handles loading, parsing, and validation of configuration files.
//! The client and the server read the same file; each only looks at its own
//! sections.

use crate::constants::{
    CONFIG_GENERATED, DEFAULT_EXPIRY_WARNING_DAYS, DEFAULT_MAX_BUCKETS_PER_SYNC, DEFAULT_MAX_TASKS_PER_SYNC,
    DEFAULT_RETENTION_DAYS,
};
use crate::model::PayloadLimits;
use crate::sync::retry::RetryPolicy;
use crate::sync::SyncSettings;
use crate::token::RetentionPolicy;
use crate::utils::datetime;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub retention: RetentionConfig,
    pub mail: MailConfig,
    pub logging: LoggingConfig,
}

/// Sync client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the sync server
    pub server_url: String,
    /// Quiet period after a local change before syncing, in milliseconds
    pub debounce_ms: u64,
    /// Timeout of every outbound request, in seconds
    pub request_timeout_secs: u64,
    /// Consecutive failures before giving up
    pub max_retries: u32,
    /// First backoff delay in milliseconds
    pub retry_base_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub retry_max_delay_ms: u64,
    /// Data directory (defaults to the platform data dir)
    pub data_dir: Option<PathBuf>,
    /// Byte quota of the local storage (0 = unlimited)
    pub storage_quota_bytes: usize,
    /// How long to wait for the cross-process token lease, in milliseconds
    pub token_lease_timeout_ms: u64,
    /// Health probe interval in seconds (0 = disabled)
    pub connectivity_probe_secs: u64,
}

/// Reconciliation server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind_address: String,
    /// SeaORM database URL
    pub database_url: String,
    pub max_tasks_per_sync: usize,
    pub max_priorities_per_sync: usize,
    /// Public app URL used in recovery links
    pub app_url: String,
    /// Use the first X-Forwarded-For hop as client address
    pub trust_proxy_headers: bool,
    /// Retention sweep interval in hours
    pub sweep_interval_hours: u64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Fixed window length in seconds
    pub window_secs: u64,
    /// Requests allowed per window and client
    pub max_requests: u32,
    /// How often expired windows are dropped, in seconds
    pub cleanup_interval_secs: u64,
}

/// Account retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Days of inactivity before an account is deleted
    pub window_days: u32,
    /// Days before expiration at which clients warn
    pub warning_days: u32,
}

/// Recovery email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Send real emails; when disabled messages are only logged
    pub enabled: bool,
    /// Endpoint of the mail API
    pub api_url: String,
    /// Environment variable holding the mail API key
    pub api_key_env: String,
    /// Sender address
    pub from: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Level filter: off, error, warn, info, debug, trace
    pub level: String,
    /// Also append log lines to this file
    pub file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8787".to_string(),
            debounce_ms: 2_000,
            request_timeout_secs: 15,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            data_dir: None,
            storage_quota_bytes: 5 * 1024 * 1024,
            token_lease_timeout_ms: 5_000,
            connectivity_probe_secs: 30,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8787".to_string(),
            database_url: "sqlite://tasksync.db?mode=rwc".to_string(),
            max_tasks_per_sync: DEFAULT_MAX_TASKS_PER_SYNC,
            max_priorities_per_sync: DEFAULT_MAX_BUCKETS_PER_SYNC,
            app_url: "http://localhost:8787".to_string(),
            trust_proxy_headers: false,
            sweep_interval_hours: 24,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60,
            max_requests: 30,
            cleanup_interval_secs: 60,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_RETENTION_DAYS,
            warning_days: DEFAULT_EXPIRY_WARNING_DAYS,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: String::new(),
            api_key_env: "TASKSYNC_MAIL_API_KEY".to_string(),
            from: "tasksync <noreply@localhost>".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            file: None,
        }
    }
}

impl ClientConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            debounce: Duration::from_millis(self.debounce_ms),
            retry: self.retry_policy(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_lease_timeout(&self) -> Duration {
        Duration::from_millis(self.token_lease_timeout_ms)
    }

    /// Storage quota, `None` when unlimited.
    pub fn storage_quota(&self) -> Option<usize> {
        (self.storage_quota_bytes > 0).then_some(self.storage_quota_bytes)
    }

    /// Probe interval, `None` when probing is disabled.
    pub fn connectivity_probe_interval(&self) -> Option<Duration> {
        (self.connectivity_probe_secs > 0).then(|| Duration::from_secs(self.connectivity_probe_secs))
    }
}

impl ServerConfig {
    pub fn payload_limits(&self) -> PayloadLimits {
        PayloadLimits {
            max_tasks: self.max_tasks_per_sync,
            max_buckets: self.max_priorities_per_sync,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_hours * 3600)
    }
}

impl RetentionConfig {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            window_days: self.window_days,
            warning_days: self.warning_days,
        }
    }
}

impl LoggingConfig {
    /// Parsed level filter; `Off` when logging is disabled.
    pub fn level_filter(&self) -> Result<log::LevelFilter> {
        if !self.enabled {
            return Ok(log::LevelFilter::Off);
        }
        log::LevelFilter::from_str(&self.level).with_context(|| format!("Invalid log level '{}'", self.level))
    }
}

impl Config {
    /// Load configuration from file or return defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::find_config_file()?;

        if let Some(path) = config_path {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in order of precedence
    fn find_config_file() -> Result<Option<PathBuf>> {
        // 1. Check current directory
        let current_dir_config = PathBuf::from("tasksync.toml");
        if current_dir_config.exists() {
            return Ok(Some(current_dir_config));
        }

        // 2. Check XDG config directory
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("tasksync").join("config.toml");
            if xdg_config.exists() {
                return Ok(Some(xdg_config));
            }
        }

        Ok(None)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.validate_client()?;
        self.validate_server()?;

        if self.rate_limit.window_secs == 0 {
            anyhow::bail!("rate_limit.window_secs must be greater than 0");
        }
        if self.rate_limit.max_requests == 0 {
            anyhow::bail!("rate_limit.max_requests must be greater than 0");
        }

        if self.retention.window_days == 0 {
            anyhow::bail!("retention.window_days must be greater than 0");
        }
        if self.retention.warning_days >= self.retention.window_days {
            anyhow::bail!(
                "retention.warning_days ({}) must be smaller than retention.window_days ({})",
                self.retention.warning_days,
                self.retention.window_days
            );
        }

        if self.mail.enabled {
            if self.mail.api_url.is_empty() {
                anyhow::bail!("mail.api_url is required when mail is enabled");
            }
            if self.mail.api_key_env.is_empty() {
                anyhow::bail!("mail.api_key_env cannot be empty when mail is enabled");
            }
        }

        self.logging.level_filter()?;
        Ok(())
    }

    fn validate_client(&self) -> Result<()> {
        let client = &self.client;
        if !client.server_url.starts_with("http://") && !client.server_url.starts_with("https://") {
            anyhow::bail!("client.server_url must be an http(s) URL, got '{}'", client.server_url);
        }
        if client.debounce_ms > 60_000 {
            anyhow::bail!("client.debounce_ms cannot exceed 60000 (1 minute)");
        }
        if client.request_timeout_secs == 0 || client.request_timeout_secs > 300 {
            anyhow::bail!(
                "client.request_timeout_secs must be between 1 and 300, got {}",
                client.request_timeout_secs
            );
        }
        if client.max_retries == 0 || client.max_retries > 20 {
            anyhow::bail!("client.max_retries must be between 1 and 20, got {}", client.max_retries);
        }
        if client.retry_base_delay_ms > client.retry_max_delay_ms {
            anyhow::bail!("client.retry_base_delay_ms cannot exceed client.retry_max_delay_ms");
        }
        Ok(())
    }

    fn validate_server(&self) -> Result<()> {
        let server = &self.server;
        server
            .bind_address
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("Invalid server.bind_address '{}'", server.bind_address))?;
        if server.database_url.is_empty() {
            anyhow::bail!("server.database_url cannot be empty");
        }
        if server.max_tasks_per_sync == 0 || server.max_priorities_per_sync == 0 {
            anyhow::bail!("server payload limits must be greater than 0");
        }
        if server.app_url.is_empty() {
            anyhow::bail!("server.app_url cannot be empty");
        }
        if server.sweep_interval_hours == 0 {
            anyhow::bail!("server.sweep_interval_hours must be greater than 0");
        }
        Ok(())
    }

    /// Generate default configuration file
    pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let config = Self::default();
        let toml_content = toml::to_string_pretty(&config).context("Failed to serialize default config")?;

        // Add header comment
        let header = format!(
            "# tasksync Configuration File\n# Generated on {}\n\n",
            chrono::Local::now().format(datetime::DISPLAY_DATETIME_FORMAT)
        );

        let full_content = header + &toml_content;

        // Ensure the parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        std::fs::write(&path, full_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        println!("{}: {}", CONFIG_GENERATED, path.as_ref().display());
        Ok(())
    }

    /// Get the XDG config directory path
    pub fn get_xdg_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
            .map(|dir| dir.join("tasksync"))
    }

    /// Get the default config file path
    pub fn get_default_config_path() -> Result<PathBuf> {
        Ok(Self::get_xdg_config_dir()?.join("config.toml"))
    }
}
