//! Log query engine
//!
//! Validates caller input (filters, pagination, export and retention
//! bounds) before anything reaches the store. Backends never see an
//! out-of-range limit or an inverted date window.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AuditError, Result};
use crate::filter::{self, LogFilter, LogQuery, Pagination, Sort};
use crate::record::{AuditEvent, AuditRecord, RecordId};
use crate::store::{AuditStore, LogPage, LogStats};

/// Read/ingest front-end over an [`AuditStore`]
#[derive(Clone)]
pub struct LogQueryEngine {
    store: Arc<dyn AuditStore>,
}

impl LogQueryEngine {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// The underlying store, e.g. to hand to an [`crate::AuditDispatcher`]
    pub fn store(&self) -> Arc<dyn AuditStore> {
        Arc::clone(&self.store)
    }

    /// Synchronous ingestion path for callers that need the record id
    pub async fn ingest(&self, event: AuditEvent) -> Result<RecordId> {
        self.store.append(&event).await
    }

    pub async fn get(&self, id: RecordId) -> Result<AuditRecord> {
        self.store.get(id).await?.ok_or(AuditError::NotFound(id))
    }

    /// Interactive, paginated query (`limit` at most 500)
    pub async fn query(&self, query: &LogQuery) -> Result<LogPage> {
        query.filter.validate()?;
        let page = Pagination::interactive(query.page, query.limit)?;

        debug!(page = page.page, limit = page.limit, sort = %query.sort, "Querying audit log");
        self.store.query(&query.filter, query.sort, page).await
    }

    /// Counts by level and by category within an optional date window
    pub async fn stats(
        &self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<LogStats> {
        let filter = LogFilter::new().between(start_date, end_date);
        filter.validate()?;
        self.store.stats(&filter.date_window()).await
    }

    /// Bulk retrieval without a pagination wrapper (`limit` at most 10000)
    pub async fn export(
        &self,
        filter: &LogFilter,
        sort: Sort,
        limit: Option<u32>,
    ) -> Result<Vec<AuditRecord>> {
        filter.validate()?;
        let limit = filter::export_limit(limit)?;

        let records = self.store.export(filter, sort, limit).await?;
        info!(count = records.len(), limit, "Exported audit records");
        Ok(records)
    }

    /// Retention sweep relative to the current time
    pub async fn cleanup(&self, days_to_keep: u32) -> Result<u64> {
        self.cleanup_at(days_to_keep, Utc::now()).await
    }

    /// Retention sweep relative to `now`: deletes records older than
    /// `now - days_to_keep` days
    pub async fn cleanup_at(&self, days_to_keep: u32, now: DateTime<Utc>) -> Result<u64> {
        let days = filter::retention_days(days_to_keep)?;
        let cutoff = now - Duration::days(i64::from(days));

        let deleted = self.store.delete_older_than(cutoff).await?;
        info!(days_to_keep = days, cutoff = %cutoff.to_rfc3339(), deleted, "Audit retention sweep finished");
        Ok(deleted)
    }
}
