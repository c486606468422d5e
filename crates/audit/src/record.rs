//! Audit record schema
//!
//! An [`AuditEvent`] is what producers emit; once the store has accepted it
//! the event is wrapped in an [`AuditRecord`] carrying the assigned id.
//! Records are never modified after they are written.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::AuditError;

/// Identifier assigned by the store on append
pub type RecordId = i64;

/// Severity of an audit record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
    Success,
    Security,
}

impl LogLevel {
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Debug,
        LogLevel::Success,
        LogLevel::Security,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Debug => "debug",
            LogLevel::Success => "success",
            LogLevel::Security => "security",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "debug" => Ok(LogLevel::Debug),
            "success" => Ok(LogLevel::Success),
            "security" => Ok(LogLevel::Security),
            _ => Err(AuditError::Validation(format!("unknown log level: {}", s))),
        }
    }
}

/// Subsystem that produced an audit record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Http,
    Database,
    Blockchain,
    Auth,
    System,
    Business,
}

impl LogCategory {
    pub const ALL: [LogCategory; 6] = [
        LogCategory::Http,
        LogCategory::Database,
        LogCategory::Blockchain,
        LogCategory::Auth,
        LogCategory::System,
        LogCategory::Business,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Http => "http",
            LogCategory::Database => "database",
            LogCategory::Blockchain => "blockchain",
            LogCategory::Auth => "auth",
            LogCategory::System => "system",
            LogCategory::Business => "business",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogCategory {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(LogCategory::Http),
            "database" => Ok(LogCategory::Database),
            "blockchain" => Ok(LogCategory::Blockchain),
            "auth" => Ok(LogCategory::Auth),
            "system" => Ok(LogCategory::System),
            "business" => Ok(LogCategory::Business),
            _ => Err(AuditError::Validation(format!(
                "unknown log category: {}",
                s
            ))),
        }
    }
}

/// A structured event waiting to be appended
///
/// Timestamps are truncated to millisecond precision, which is the
/// resolution the store persists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub category: LogCategory,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Correlation id for http-origin records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(default)]
    pub details: Map<String, Value>,

    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl AuditEvent {
    /// Create an event stamped with the current time
    pub fn new(level: LogLevel, category: LogCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().trunc_subsecs(3),
            level,
            category,
            message: message.into(),
            user_address: None,
            endpoint: None,
            request_id: None,
            duration_ms: None,
            details: Map::new(),
            tags: BTreeSet::new(),
        }
    }

    /// Request/response record for the http layer
    pub fn http(
        level: LogLevel,
        endpoint: impl Into<String>,
        request_id: impl Into<String>,
        duration_ms: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::new(level, LogCategory::Http, message)
            .with_endpoint(endpoint)
            .with_request(request_id, duration_ms)
    }

    pub fn database(level: LogLevel, message: impl Into<String>) -> Self {
        Self::new(level, LogCategory::Database, message)
    }

    pub fn blockchain(level: LogLevel, message: impl Into<String>) -> Self {
        Self::new(level, LogCategory::Blockchain, message)
    }

    pub fn auth(level: LogLevel, message: impl Into<String>) -> Self {
        Self::new(level, LogCategory::Auth, message)
    }

    pub fn system(level: LogLevel, message: impl Into<String>) -> Self {
        Self::new(level, LogCategory::System, message)
    }

    pub fn business(level: LogLevel, message: impl Into<String>) -> Self {
        Self::new(level, LogCategory::Business, message)
    }

    /// Override the timestamp (imports, backfills, tests)
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(3);
        self
    }

    /// Attach the acting wallet address (stored lowercased)
    pub fn with_user(mut self, address: impl AsRef<str>) -> Self {
        self.user_address = Some(address.as_ref().to_ascii_lowercase());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_request(mut self, request_id: impl Into<String>, duration_ms: u64) -> Self {
        self.request_id = Some(request_id.into());
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Merge the fields of a JSON object into the details map
    ///
    /// Non-object values are stored under the `value` key.
    pub fn with_details(mut self, details: Value) -> Self {
        match details {
            Value::Object(map) => self.details.extend(map),
            other => {
                self.details.insert("value".to_string(), other);
            }
        }
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// A persisted audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub id: RecordId,

    #[serde(flatten)]
    pub event: AuditEvent,
}

impl std::ops::Deref for AuditRecord {
    type Target = AuditEvent;

    fn deref(&self) -> &Self::Target {
        &self.event
    }
}
