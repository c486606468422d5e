//! Storage contract for audit records
//!
//! Backends assume their inputs were validated by [`crate::LogQueryEngine`];
//! they only guarantee atomicity of each call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::filter::{LogFilter, Pagination, Sort};
use crate::record::{AuditEvent, AuditRecord, LogCategory, LogLevel, RecordId};

/// One page of query results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogPage {
    pub records: Vec<AuditRecord>,
    pub page: u32,
    pub limit: u32,
    /// Number of records matching the filter across all pages
    pub total: u64,
}

impl LogPage {
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            0
        } else {
            self.total.div_ceil(u64::from(self.limit))
        }
    }
}

/// Aggregate counts over a date window
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub total: u64,
    pub by_level: BTreeMap<LogLevel, u64>,
    pub by_category: BTreeMap<LogCategory, u64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl LogStats {
    pub fn level(&self, level: LogLevel) -> u64 {
        self.by_level.get(&level).copied().unwrap_or(0)
    }

    pub fn category(&self, category: LogCategory) -> u64 {
        self.by_category.get(&category).copied().unwrap_or(0)
    }
}

/// Append-only audit record storage
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one event and return its id
    async fn append(&self, event: &AuditEvent) -> Result<RecordId>;

    /// Append several events atomically
    ///
    /// The default implementation appends one-by-one; backends should
    /// override this with a single transaction.
    async fn append_batch(&self, events: &[AuditEvent]) -> Result<Vec<RecordId>> {
        let mut ids = Vec::with_capacity(events.len());
        for event in events {
            ids.push(self.append(event).await?);
        }
        Ok(ids)
    }

    async fn get(&self, id: RecordId) -> Result<Option<AuditRecord>>;

    /// Fetch one page of matching records plus the total match count
    async fn query(&self, filter: &LogFilter, sort: Sort, page: Pagination) -> Result<LogPage>;

    /// Fetch up to `limit` matching records in sort order
    async fn export(&self, filter: &LogFilter, sort: Sort, limit: u32) -> Result<Vec<AuditRecord>>;

    /// Count matching records grouped by level and by category
    async fn stats(&self, filter: &LogFilter) -> Result<LogStats>;

    /// Retention sweep: delete records with `timestamp < cutoff`
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
