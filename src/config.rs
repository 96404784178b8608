//! Configuration module for ephemail.

use serde::Deserialize;
use std::path::Path;

use crate::address::is_valid_domain;
use crate::{EphemailError, Result};

/// Disposable address configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Domain appended to every generated local part.
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Lifetime of an address in seconds.
    #[serde(default = "default_address_ttl")]
    pub address_ttl_secs: u64,
    /// Maximum number of candidates tried before allocation gives up.
    #[serde(default = "default_max_allocation_attempts")]
    pub max_allocation_attempts: u32,
}

fn default_domain() -> String {
    "localhost".to_string()
}

fn default_address_ttl() -> u64 {
    3600 // 1 hour
}

fn default_max_allocation_attempts() -> u32 {
    8
}

impl MailConfig {
    /// Address lifetime as a chrono duration.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.address_ttl_secs as i64)
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            address_ttl_secs: default_address_ttl(),
            max_allocation_attempts: default_max_allocation_attempts(),
        }
    }
}

/// SMTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Name announced in the greeting. Empty means the mail domain.
    #[serde(default)]
    pub hostname: String,
    /// Maximum number of concurrent sessions.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Idle timeout in seconds for a single read from the peer.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Maximum accepted message size in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// STARTTLS settings.
    #[serde(default)]
    pub tls: TlsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2525
}

fn default_max_connections() -> usize {
    100
}

fn default_idle_timeout() -> u64 {
    10
}

fn default_max_message_bytes() -> usize {
    1024 * 1024 // 1MB
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            hostname: String::new(),
            max_connections: default_max_connections(),
            idle_timeout_secs: default_idle_timeout(),
            max_message_bytes: default_max_message_bytes(),
            tls: TlsConfig::default(),
        }
    }
}

/// STARTTLS configuration (`[smtp.tls]`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    /// Offer STARTTLS to clients.
    #[serde(default)]
    pub enable: bool,
    /// PEM certificate chain.
    #[serde(default)]
    pub cert_file: String,
    /// PEM private key.
    #[serde(default)]
    pub key_file: String,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/ephemail.db".to_string()
}

fn default_db_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_db_max_connections(),
        }
    }
}

/// Retention configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Interval between sweeps in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    crate::retention::DEFAULT_SWEEP_INTERVAL_SECS
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/ephemail.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Address configuration.
    #[serde(default)]
    pub mail: MailConfig,
    /// SMTP server configuration.
    #[serde(default)]
    pub smtp: SmtpConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Retention configuration.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(EphemailError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| EphemailError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `EPHEMAIL_DOMAIN`: Override the mail domain
    pub fn apply_env_overrides(&mut self) {
        if let Ok(domain) = std::env::var("EPHEMAIL_DOMAIN") {
            if !domain.is_empty() {
                self.mail.domain = domain;
            }
        }
    }

    /// Name announced in the SMTP greeting.
    pub fn smtp_hostname(&self) -> &str {
        if self.smtp.hostname.is_empty() {
            &self.mail.domain
        } else {
            &self.smtp.hostname
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_domain(&self.mail.domain) {
            return Err(EphemailError::Config(format!(
                "mail.domain '{}' is not a valid lowercase domain name",
                self.mail.domain
            )));
        }
        if self.mail.address_ttl_secs == 0 {
            return Err(EphemailError::Config(
                "mail.address_ttl_secs must be positive".to_string(),
            ));
        }
        if self.mail.max_allocation_attempts == 0 {
            return Err(EphemailError::Config(
                "mail.max_allocation_attempts must be positive".to_string(),
            ));
        }
        if self.smtp.max_connections == 0 {
            return Err(EphemailError::Config(
                "smtp.max_connections must be positive".to_string(),
            ));
        }
        if self.smtp.idle_timeout_secs == 0 {
            return Err(EphemailError::Config(
                "smtp.idle_timeout_secs must be positive".to_string(),
            ));
        }
        if self.smtp.max_message_bytes == 0 {
            return Err(EphemailError::Config(
                "smtp.max_message_bytes must be positive".to_string(),
            ));
        }
        if self.smtp.tls.enable
            && (self.smtp.tls.cert_file.is_empty() || self.smtp.tls.key_file.is_empty())
        {
            return Err(EphemailError::Config(
                "smtp.tls requires cert_file and key_file when enabled".to_string(),
            ));
        }
        if self.retention.sweep_interval_secs == 0 {
            return Err(EphemailError::Config(
                "retention.sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
