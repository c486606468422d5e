//! SQLite backend implementation
//!
//! Persistent storage using SQLite with WAL mode. The partial unique index
//! `idx_streams_open_pair` is the authoritative one-open-stream-per-pair
//! guard; mutations run as a single write transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::{Amount, Stream, StreamPatch, StreamStatus, StreamStore, WalletAddress};

const COLUMNS: &str = "id, employer_address, employee_address, monthly_salary, rate_per_second, \
     duration_months, tax_percent, start_time, end_time, withdrawn, paused, status, \
     creation_tx_hash, cancellation_tx_hash, notes, last_synced_at_ms, created_at_ms";

/// SQLite-backed stream store
#[derive(Clone)]
pub struct SqliteStreamStore {
    pool: SqlitePool,
}

impl SqliteStreamStore {
    /// Open or create a SQLite database at the specified path
    ///
    /// Automatically runs migrations to set up the schema.
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

    /// Private in-memory database, mainly for tests
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // every connection would get its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Wrap an existing pool, running migrations first
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Get the underlying pool (for advanced usage)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| LedgerError::Store(format!("timestamp {} out of range", ms).into()))
}

/// Decode a stored value that the schema guarantees is well-formed
fn stored<T>(column: &str, parsed: Result<T>) -> Result<T> {
    parsed.map_err(|e| LedgerError::Store(format!("corrupt {} column: {}", column, e).into()))
}

fn text(row: &SqliteRow, column: &str) -> Result<String> {
    Ok(row.try_get::<String, _>(column)?)
}

// Helper to convert SqliteRow to Stream
fn row_to_stream(row: &SqliteRow) -> Result<Stream> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| LedgerError::Store(format!("corrupt id column: {}", e).into()))?;
    let status: String = row.try_get("status")?;

    Ok(Stream {
        id,
        employer_address: stored("employer_address", WalletAddress::parse(&text(row, "employer_address")?))?,
        employee_address: stored("employee_address", WalletAddress::parse(&text(row, "employee_address")?))?,
        monthly_salary: stored("monthly_salary", Amount::parse(&text(row, "monthly_salary")?))?,
        rate_per_second: stored("rate_per_second", Amount::parse(&text(row, "rate_per_second")?))?,
        duration_months: row.try_get::<i64, _>("duration_months")? as u32,
        tax_percent: row.try_get::<i64, _>("tax_percent")? as u8,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        withdrawn: stored("withdrawn", Amount::parse(&text(row, "withdrawn")?))?,
        paused: row.try_get("paused")?,
        status: stored("status", StreamStatus::from_str(&status))?,
        creation_tx_hash: row.try_get("creation_tx_hash")?,
        cancellation_tx_hash: row.try_get("cancellation_tx_hash")?,
        notes: row.try_get("notes")?,
        last_synced_at: millis_to_datetime(row.try_get("last_synced_at_ms")?)?,
        created_at: millis_to_datetime(row.try_get("created_at_ms")?)?,
    })
}

impl SqliteStreamStore {
    async fn find_by_party(
        &self,
        party_column: &str,
        address: &WalletAddress,
        status: Option<StreamStatus>,
    ) -> Result<Vec<Stream>> {
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM streams WHERE {} = ? AND status = ? \
                     ORDER BY created_at_ms DESC, seq DESC",
                    COLUMNS, party_column
                );
                sqlx::query(&sql)
                    .bind(address.as_str())
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM streams WHERE {} = ? ORDER BY created_at_ms DESC, seq DESC",
                    COLUMNS, party_column
                );
                sqlx::query(&sql)
                    .bind(address.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(row_to_stream).collect()
    }
}

#[async_trait]
impl StreamStore for SqliteStreamStore {
    async fn find_open_stream(
        &self,
        employer: &WalletAddress,
        employee: &WalletAddress,
    ) -> Result<Option<Stream>> {
        let sql = format!(
            "SELECT {} FROM streams
             WHERE employer_address = ? AND employee_address = ? AND status IN ('active', 'paused')",
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(employer.as_str())
            .bind(employee.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_stream).transpose()
    }

    async fn find_streams(
        &self,
        employer: &WalletAddress,
        status: Option<StreamStatus>,
    ) -> Result<Vec<Stream>> {
        self.find_by_party("employer_address", employer, status).await
    }

    async fn find_streams_by_employee(
        &self,
        employee: &WalletAddress,
        status: Option<StreamStatus>,
    ) -> Result<Vec<Stream>> {
        self.find_by_party("employee_address", employee, status).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Stream>> {
        let sql = format!("SELECT {} FROM streams WHERE id = ?", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_stream).transpose()
    }

    async fn insert(&self, stream: &Stream) -> Result<Stream> {
        sqlx::query(
            "INSERT INTO streams (
                id, employer_address, employee_address, monthly_salary, rate_per_second,
                duration_months, tax_percent, start_time, end_time, withdrawn, paused, status,
                creation_tx_hash, cancellation_tx_hash, notes, last_synced_at_ms, created_at_ms
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(stream.id.to_string())
        .bind(stream.employer_address.as_str())
        .bind(stream.employee_address.as_str())
        .bind(stream.monthly_salary.as_str())
        .bind(stream.rate_per_second.as_str())
        .bind(i64::from(stream.duration_months))
        .bind(i64::from(stream.tax_percent))
        .bind(stream.start_time)
        .bind(stream.end_time)
        .bind(stream.withdrawn.as_str())
        .bind(stream.paused)
        .bind(stream.status.as_str())
        .bind(stream.creation_tx_hash.as_deref())
        .bind(stream.cancellation_tx_hash.as_deref())
        .bind(stream.notes.as_deref())
        .bind(stream.last_synced_at.timestamp_millis())
        .bind(stream.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(stream.clone())
    }

    async fn update_open_stream(
        &self,
        employer: &WalletAddress,
        employee: &WalletAddress,
        patch: &StreamPatch,
    ) -> Result<Stream> {
        let mut tx = self.pool.begin().await?;

        // A no-op write as the first statement takes the write lock, so the
        // read below cannot go stale before the write-back
        let sql = format!(
            "UPDATE streams SET last_synced_at_ms = last_synced_at_ms
             WHERE employer_address = ? AND employee_address = ? AND status IN ('active', 'paused')
             RETURNING seq, {}",
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(employer.as_str())
            .bind(employee.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Err(LedgerError::no_open_stream(employer, employee));
        };
        let seq: i64 = row.try_get("seq")?;
        let mut stream = row_to_stream(&row)?;
        stream.apply(patch)?;

        sqlx::query(
            "UPDATE streams
             SET withdrawn = ?, paused = ?, status = ?, cancellation_tx_hash = ?, last_synced_at_ms = ?
             WHERE seq = ?",
        )
        .bind(stream.withdrawn.as_str())
        .bind(stream.paused)
        .bind(stream.status.as_str())
        .bind(stream.cancellation_tx_hash.as_deref())
        .bind(stream.last_synced_at.timestamp_millis())
        .bind(seq)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stream)
    }

    async fn count_open(&self, employer: &WalletAddress, employee: &WalletAddress) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM streams
             WHERE employer_address = ? AND employee_address = ? AND status IN ('active', 'paused')",
        )
        .bind(employer.as_str())
        .bind(employee.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }
}
