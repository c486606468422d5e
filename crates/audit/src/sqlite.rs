//! SQLite backend for audit records
//!
//! Records live in `logs`; tags are additionally exploded into `log_tags`
//! so tag filters hit an index instead of scanning JSON.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{AuditError, Result};
use crate::filter::{EndpointMatch, LogFilter, Pagination, Sort};
use crate::record::{AuditEvent, AuditRecord, LogCategory, LogLevel, RecordId};
use crate::store::{AuditStore, LogPage, LogStats};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp_ms INTEGER NOT NULL,
        level TEXT NOT NULL,
        category TEXT NOT NULL,
        message TEXT NOT NULL,
        user_address TEXT,
        endpoint TEXT,
        request_id TEXT,
        duration_ms INTEGER,
        details TEXT NOT NULL DEFAULT '{}',
        tags TEXT NOT NULL DEFAULT '[]'
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs (timestamp_ms DESC)",
    "CREATE INDEX IF NOT EXISTS idx_logs_category_level ON logs (category, level)",
    "CREATE INDEX IF NOT EXISTS idx_logs_user ON logs (user_address)",
    r#"
    CREATE TABLE IF NOT EXISTS log_tags (
        log_id INTEGER NOT NULL REFERENCES logs (id) ON DELETE CASCADE,
        tag TEXT NOT NULL,
        PRIMARY KEY (log_id, tag)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_log_tags_tag ON log_tags (tag)",
];

const RECORD_COLUMNS: &str = "id, timestamp_ms, level, category, message, user_address, \
     endpoint, request_id, duration_ms, details, tags";

/// SQLite-backed audit store
#[derive(Clone)]
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    /// Open or create an audit database at the specified path
    pub async fn open(path: &str) -> Result<Self> {
        let db_url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite://{}", path)
        };

        let options = SqliteConnectOptions::from_str(&db_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database, mainly for tests and dry runs
    ///
    /// Limited to one connection that never expires: every connection to
    /// `:memory:` would otherwise see its own empty database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Wrap an existing pool, creating the schema if needed
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!("Audit log schema initialized");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn insert_event(conn: &mut SqliteConnection, event: &AuditEvent) -> Result<RecordId> {
    let details = serde_json::to_string(&event.details)?;
    let tags = serde_json::to_string(&event.tags)?;

    let result = sqlx::query(
        "INSERT INTO logs (timestamp_ms, level, category, message, user_address, endpoint,
                           request_id, duration_ms, details, tags)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(event.timestamp.timestamp_millis())
    .bind(event.level.as_str())
    .bind(event.category.as_str())
    .bind(&event.message)
    .bind(&event.user_address)
    .bind(&event.endpoint)
    .bind(&event.request_id)
    .bind(event.duration_ms.map(|d| d as i64))
    .bind(details)
    .bind(tags)
    .execute(&mut *conn)
    .await?;

    let id = result.last_insert_rowid();

    for tag in &event.tags {
        sqlx::query("INSERT INTO log_tags (log_id, tag) VALUES (?, ?)")
            .bind(id)
            .bind(tag)
            .execute(&mut *conn)
            .await?;
    }

    Ok(id)
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| AuditError::Store(format!("timestamp out of range: {}", ms).into()))
}

fn row_to_record(row: &SqliteRow) -> Result<AuditRecord> {
    let level: String = row.try_get("level")?;
    let category: String = row.try_get("category")?;
    let details: String = row.try_get("details")?;
    let tags: String = row.try_get("tags")?;
    let duration_ms: Option<i64> = row.try_get("duration_ms")?;

    let level = LogLevel::from_str(&level)
        .map_err(|e| AuditError::Store(e.to_string().into()))?;
    let category = LogCategory::from_str(&category)
        .map_err(|e| AuditError::Store(e.to_string().into()))?;

    Ok(AuditRecord {
        id: row.try_get("id")?,
        event: AuditEvent {
            timestamp: millis_to_datetime(row.try_get("timestamp_ms")?)?,
            level,
            category,
            message: row.try_get("message")?,
            user_address: row.try_get("user_address")?,
            endpoint: row.try_get("endpoint")?,
            request_id: row.try_get("request_id")?,
            duration_ms: duration_ms.map(|d| d.max(0) as u64),
            details: serde_json::from_str(&details)?,
            tags: serde_json::from_str::<BTreeSet<String>>(&tags)?,
        },
    })
}

/// Escape LIKE wildcards so the needle is matched literally
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Append the WHERE clause for `filter` to `qb`
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &LogFilter) {
    qb.push(" WHERE 1 = 1");

    if !filter.levels.is_empty() {
        qb.push(" AND level IN (");
        let mut list = qb.separated(", ");
        for level in &filter.levels {
            list.push_bind(level.as_str());
        }
        list.push_unseparated(")");
    }

    if !filter.categories.is_empty() {
        qb.push(" AND category IN (");
        let mut list = qb.separated(", ");
        for category in &filter.categories {
            list.push_bind(category.as_str());
        }
        list.push_unseparated(")");
    }

    if let Some(start) = filter.start_date {
        qb.push(" AND timestamp_ms >= ")
            .push_bind(start.timestamp_millis());
    }
    if let Some(end) = filter.end_date {
        qb.push(" AND timestamp_ms <= ").push_bind(end.timestamp_millis());
    }

    if let Some(ref user) = filter.user_address {
        qb.push(" AND user_address = ")
            .push_bind(user.to_ascii_lowercase());
    }

    match filter.endpoint {
        Some(EndpointMatch::Exact(ref endpoint)) => {
            qb.push(" AND endpoint = ").push_bind(endpoint.clone());
        }
        Some(EndpointMatch::Prefix(ref prefix)) => {
            qb.push(" AND substr(endpoint, 1, ")
                .push_bind(prefix.chars().count() as i64)
                .push(") = ")
                .push_bind(prefix.clone());
        }
        None => {}
    }

    if !filter.tags.is_empty() {
        qb.push(" AND EXISTS (SELECT 1 FROM log_tags t WHERE t.log_id = logs.id AND t.tag IN (");
        let mut list = qb.separated(", ");
        for tag in &filter.tags {
            list.push_bind(tag.clone());
        }
        list.push_unseparated("))");
    }

    if let Some(ref needle) = filter.search {
        // match decoded detail keys and scalar values, not the escaped JSON text
        let pattern = like_pattern(needle);
        qb.push(" AND (message LIKE ")
            .push_bind(pattern.clone())
            .push(
                " ESCAPE '\\' OR EXISTS (SELECT 1 FROM json_tree(logs.details) j \
                 WHERE (typeof(j.key) = 'text' AND j.key LIKE ",
            )
            .push_bind(pattern.clone())
            .push(
                " ESCAPE '\\') OR (j.type IN ('text', 'integer', 'real', 'true', 'false') \
                 AND (CASE j.type WHEN 'true' THEN 'true' WHEN 'false' THEN 'false' \
                 ELSE j.value END) LIKE ",
            )
            .push_bind(pattern)
            .push(" ESCAPE '\\')))");
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Sqlite>, sort: Sort) {
    qb.push(" ORDER BY ")
        .push(sort.sort_by.column())
        .push(" ")
        .push(sort.sort_order.keyword())
        .push(", id ASC");
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn append(&self, event: &AuditEvent) -> Result<RecordId> {
        let mut tx = self.pool.begin().await?;
        let id = insert_event(&mut *tx, event).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn append_batch(&self, events: &[AuditEvent]) -> Result<Vec<RecordId>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(events.len());
        for event in events {
            ids.push(insert_event(&mut *tx, event).await?);
        }
        tx.commit().await?;
        debug!(count = ids.len(), "Appended audit batch");
        Ok(ids)
    }

    async fn get(&self, id: RecordId) -> Result<Option<AuditRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM logs WHERE id = ?", RECORD_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn query(&self, filter: &LogFilter, sort: Sort, page: Pagination) -> Result<LogPage> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM logs");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM logs", RECORD_COLUMNS));
        push_filter(&mut select, filter);
        push_order(&mut select, sort);
        select
            .push(" LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = select.build().fetch_all(&self.pool).await?;
        let records = rows.iter().map(row_to_record).collect::<Result<Vec<_>>>()?;

        Ok(LogPage {
            records,
            page: page.page,
            limit: page.limit,
            total: total.max(0) as u64,
        })
    }

    async fn export(&self, filter: &LogFilter, sort: Sort, limit: u32) -> Result<Vec<AuditRecord>> {
        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM logs", RECORD_COLUMNS));
        push_filter(&mut select, filter);
        push_order(&mut select, sort);
        select.push(" LIMIT ").push_bind(i64::from(limit));

        let rows = select.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn stats(&self, filter: &LogFilter) -> Result<LogStats> {
        let mut stats = LogStats {
            start_date: filter.start_date,
            end_date: filter.end_date,
            ..LogStats::default()
        };

        let mut by_level = QueryBuilder::<Sqlite>::new("SELECT level AS key, COUNT(*) AS count FROM logs");
        push_filter(&mut by_level, filter);
        by_level.push(" GROUP BY level");
        for row in by_level.build().fetch_all(&self.pool).await? {
            let key: String = row.try_get("key")?;
            let count: i64 = row.try_get("count")?;
            let level = LogLevel::from_str(&key)
                .map_err(|e| AuditError::Store(e.to_string().into()))?;
            stats.by_level.insert(level, count.max(0) as u64);
            stats.total += count.max(0) as u64;
        }

        let mut by_category =
            QueryBuilder::<Sqlite>::new("SELECT category AS key, COUNT(*) AS count FROM logs");
        push_filter(&mut by_category, filter);
        by_category.push(" GROUP BY category");
        for row in by_category.build().fetch_all(&self.pool).await? {
            let key: String = row.try_get("key")?;
            let count: i64 = row.try_get("count")?;
            let category = LogCategory::from_str(&key)
                .map_err(|e| AuditError::Store(e.to_string().into()))?;
            stats.by_category.insert(category, count.max(0) as u64);
        }

        Ok(stats)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        // records are stored at millisecond precision; round a fractional
        // cutoff up so every record strictly older than it is included
        let cutoff_ms = cutoff.timestamp_millis()
            + i64::from(cutoff.timestamp_subsec_nanos() % 1_000_000 != 0);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM log_tags WHERE log_id IN (SELECT id FROM logs WHERE timestamp_ms < ?)",
        )
        .bind(cutoff_ms)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM logs WHERE timestamp_ms < ?")
            .bind(cutoff_ms)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
