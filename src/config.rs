/*!
 * Configuration for Paystream
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use paystream_audit::filter::{MAX_RETENTION_DAYS, MIN_RETENTION_DAYS};
use paystream_audit::DispatcherConfig;

use crate::error::{PaystreamError, Result};

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaystreamConfig {
    /// Stream database path (`:memory:` for a throwaway store)
    #[serde(default = "default_streams_db")]
    pub streams_db: PathBuf,

    /// Audit log database path
    #[serde(default = "default_audit_db")]
    pub audit_db: PathBuf,

    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Write JSON logs to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Shorthand for debug logging
    #[serde(default)]
    pub verbose: bool,

    /// Default window for `logs cleanup`
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default)]
    pub audit: AuditConfig,
}

/// Background audit dispatch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Record business operations in the audit log
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: default_channel_capacity(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl AuditConfig {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            batch_size: self.batch_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Logging level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = PaystreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(PaystreamError::Config(format!("Invalid log level: {}", s))),
        }
    }
}

impl Default for PaystreamConfig {
    fn default() -> Self {
        Self {
            streams_db: default_streams_db(),
            audit_db: default_audit_db(),
            log_level: LogLevel::default(),
            log_file: None,
            verbose: false,
            retention_days: default_retention_days(),
            audit: AuditConfig::default(),
        }
    }
}

impl PaystreamConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PaystreamError::Config(format!("{}: {}", path.display(), e)))?;
        let config: PaystreamConfig = toml::from_str(&contents)
            .map_err(|e| PaystreamError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.audit.channel_capacity == 0 {
            return Err(PaystreamError::Config(
                "audit.channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.audit.batch_size == 0 {
            return Err(PaystreamError::Config(
                "audit.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.audit.flush_interval_ms == 0 {
            return Err(PaystreamError::Config(
                "audit.flush_interval_ms must be greater than 0".to_string(),
            ));
        }
        if !(MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS).contains(&self.retention_days) {
            return Err(PaystreamError::Config(format!(
                "retention_days must be between {} and {}, got {}",
                MIN_RETENTION_DAYS, MAX_RETENTION_DAYS, self.retention_days
            )));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_streams_db() -> PathBuf {
    PathBuf::from("paystream-streams.db")
}

fn default_audit_db() -> PathBuf {
    PathBuf::from("paystream-audit.db")
}

fn default_retention_days() -> u32 {
    30
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_batch_size() -> usize {
    64
}

fn default_flush_interval_ms() -> u64 {
    250
}
