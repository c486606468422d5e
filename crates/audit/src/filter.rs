//! Query filters, pagination and sorting for audit records
//!
//! All filter fields are optional and AND-combined. Set-valued fields
//! (`levels`, `categories`, `tags`) match when the record carries at least
//! one of the requested values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{AuditError, Result};
use crate::record::{AuditEvent, LogCategory, LogLevel};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_QUERY_LIMIT: u32 = 500;
pub const DEFAULT_EXPORT_LIMIT: u32 = 1_000;
pub const MAX_EXPORT_LIMIT: u32 = 10_000;
pub const MIN_RETENTION_DAYS: u32 = 1;
pub const MAX_RETENTION_DAYS: u32 = 365;

/// Endpoint predicate: a trailing `*` turns the value into a prefix match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "value")]
pub enum EndpointMatch {
    Exact(String),
    Prefix(String),
}

impl EndpointMatch {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_suffix('*') {
            Some(prefix) => EndpointMatch::Prefix(prefix.to_string()),
            None => EndpointMatch::Exact(raw.to_string()),
        }
    }

    pub fn matches(&self, endpoint: &str) -> bool {
        match self {
            EndpointMatch::Exact(value) => endpoint == value,
            EndpointMatch::Prefix(prefix) => endpoint.starts_with(prefix.as_str()),
        }
    }
}

/// Filter over audit records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogFilter {
    pub levels: Vec<LogLevel>,
    pub categories: Vec<LogCategory>,
    /// Inclusive lower bound on `timestamp`
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `timestamp`
    pub end_date: Option<DateTime<Utc>>,
    pub user_address: Option<String>,
    pub endpoint: Option<EndpointMatch>,
    /// Matches records carrying any of these tags
    pub tags: Vec<String>,
    /// Case-insensitive substring over `message` and serialized `details`
    pub search: Option<String>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels(mut self, levels: impl IntoIterator<Item = LogLevel>) -> Self {
        self.levels.extend(levels);
        self
    }

    pub fn categories(mut self, categories: impl IntoIterator<Item = LogCategory>) -> Self {
        self.categories.extend(categories);
        self
    }

    pub fn between(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn user(mut self, address: impl AsRef<str>) -> Self {
        self.user_address = Some(address.as_ref().to_ascii_lowercase());
        self
    }

    pub fn endpoint(mut self, raw: &str) -> Self {
        self.endpoint = Some(EndpointMatch::parse(raw));
        self
    }

    pub fn tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn search(mut self, needle: impl Into<String>) -> Self {
        self.search = Some(needle.into());
        self
    }

    /// Keep only the date window (the filter `stats` runs with)
    pub fn date_window(&self) -> LogFilter {
        LogFilter {
            start_date: self.start_date,
            end_date: self.end_date,
            ..LogFilter::default()
        }
    }

    /// Reject filters that cannot match anything meaningful
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(AuditError::validation(format!(
                    "startDate {} is after endDate {}",
                    start.to_rfc3339(),
                    end.to_rfc3339()
                )));
            }
        }
        if matches!(self.search.as_deref(), Some(s) if s.trim().is_empty()) {
            return Err(AuditError::validation("search must not be empty"));
        }
        if self.tags.iter().any(|t| t.is_empty()) {
            return Err(AuditError::validation("tags must not be empty strings"));
        }
        Ok(())
    }

    /// In-process evaluation of the filter
    ///
    /// Mirrors the SQL the store generates and backs [`crate::EventCapture`].
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if !self.levels.is_empty() && !self.levels.contains(&event.level) {
            return false;
        }
        if !self.categories.is_empty() && !self.categories.contains(&event.category) {
            return false;
        }
        if matches!(self.start_date, Some(start) if event.timestamp < start) {
            return false;
        }
        if matches!(self.end_date, Some(end) if event.timestamp > end) {
            return false;
        }
        if let Some(ref user) = self.user_address {
            if event.user_address.as_deref() != Some(user.to_ascii_lowercase().as_str()) {
                return false;
            }
        }
        if let Some(ref endpoint) = self.endpoint {
            match event.endpoint.as_deref() {
                Some(value) if endpoint.matches(value) => {}
                _ => return false,
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| event.tags.contains(t)) {
            return false;
        }
        if let Some(ref needle) = self.search {
            let needle = needle.to_ascii_lowercase();
            if !event.message.to_ascii_lowercase().contains(&needle)
                && !details_contain(&event.details, &needle)
            {
                return false;
            }
        }
        true
    }
}

/// Case-insensitive search over detail keys and scalar values
///
/// `needle` must already be ASCII-lowercased.
fn details_contain(details: &Map<String, Value>, needle: &str) -> bool {
    details
        .iter()
        .any(|(key, value)| key.to_ascii_lowercase().contains(needle) || value_contains(value, needle))
}

fn value_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_ascii_lowercase().contains(needle),
        Value::Number(n) => n.to_string().contains(needle),
        Value::Bool(b) => b.to_string().contains(needle),
        Value::Null => false,
        Value::Array(items) => items.iter().any(|item| value_contains(item, needle)),
        Value::Object(map) => details_contain(map, needle),
    }
}

/// Validated page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    /// Interactive pagination: `page >= 1`, `limit` in `[1, 500]`
    ///
    /// Omitted values fall back to page 1 and limit 50; out-of-range values
    /// are rejected rather than clamped.
    pub fn interactive(page: Option<u32>, limit: Option<u32>) -> Result<Self> {
        Self::bounded(page, limit, DEFAULT_LIMIT, MAX_QUERY_LIMIT)
    }

    fn bounded(page: Option<u32>, limit: Option<u32>, default_limit: u32, max: u32) -> Result<Self> {
        let page = page.unwrap_or(DEFAULT_PAGE);
        let limit = limit.unwrap_or(default_limit);

        if page < 1 {
            return Err(AuditError::validation("page must be >= 1"));
        }
        if !(1..=max).contains(&limit) {
            return Err(AuditError::validation(format!(
                "limit must be between 1 and {}, got {}",
                max, limit
            )));
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Validate an export limit: `[1, 10000]`, default 1000
pub fn export_limit(limit: Option<u32>) -> Result<u32> {
    Pagination::bounded(None, limit, DEFAULT_EXPORT_LIMIT, MAX_EXPORT_LIMIT).map(|p| p.limit)
}

/// Validate a retention window in days: `[1, 365]`
pub fn retention_days(days: u32) -> Result<u32> {
    if !(MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS).contains(&days) {
        return Err(AuditError::validation(format!(
            "daysToKeep must be between {} and {}, got {}",
            MIN_RETENTION_DAYS, MAX_RETENTION_DAYS, days
        )));
    }
    Ok(days)
}

/// Sortable record fields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Timestamp,
    Level,
    Category,
    Message,
    UserAddress,
    Endpoint,
    DurationMs,
}

impl SortField {
    /// Column the SQLite backend orders by
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Timestamp => "timestamp_ms",
            SortField::Level => "level",
            SortField::Category => "category",
            SortField::Message => "message",
            SortField::UserAddress => "user_address",
            SortField::Endpoint => "endpoint",
            SortField::DurationMs => "duration_ms",
        }
    }
}

impl FromStr for SortField {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "timestamp" => Ok(SortField::Timestamp),
            "level" => Ok(SortField::Level),
            "category" => Ok(SortField::Category),
            "message" => Ok(SortField::Message),
            "userAddress" | "user_address" => Ok(SortField::UserAddress),
            "endpoint" => Ok(SortField::Endpoint),
            "durationMs" | "duration_ms" => Ok(SortField::DurationMs),
            _ => Err(AuditError::validation(format!("cannot sort by {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(AuditError::validation(format!("invalid sort order: {}", s))),
        }
    }
}

/// Sort specification; ties always fall back to insertion order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sort {
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl Sort {
    pub fn new(sort_by: SortField, sort_order: SortOrder) -> Self {
        Self {
            sort_by,
            sort_order,
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.sort_by, self.sort_order.keyword())
    }
}

/// Raw interactive query as received from a caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    #[serde(flatten)]
    pub filter: LogFilter,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(flatten)]
    pub sort: Sort,
}
