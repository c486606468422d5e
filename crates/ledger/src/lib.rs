//! Paystream Ledger: payroll stream lifecycle with persistent storage
//!
//! # Overview
//!
//! A stream is one employer/employee payroll relationship whose state
//! mirrors what the chain reports. This crate provides:
//!
//! - **Stream model**: [`Stream`], its [`StreamStatus`] and the typed
//!   value objects in [`terms`]
//! - **Repository**: the [`StreamStore`] trait with SQLite (default) and
//!   in-memory backends, enforcing one open stream per pair
//! - **Lifecycle**: [`StreamController`] implementing
//!   `active <-> paused -> cancelled`, reconciliation against upstream
//!   snapshots, and audit emission
//!
//! # Example
//!
//! ```no_run
//! use paystream_audit::NoopSink;
//! use paystream_ledger::{Amount, StreamController, StreamTerms, WalletAddress};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = paystream_ledger::open("streams.db").await?;
//!     let controller = StreamController::new(store, Arc::new(NoopSink));
//!
//!     let employer = WalletAddress::parse("0x1111111111111111111111111111111111111111")?;
//!     let employee = WalletAddress::parse("0x2222222222222222222222222222222222222222")?;
//!     let terms = StreamTerms::new(Amount::parse("1000")?, Amount::parse("0.000385")?, 12, 1_700_000_000);
//!
//!     let stream = controller.create(&employer, &employee, terms).await?;
//!     controller.pause(&employer, &employee).await?;
//!     controller.cancel(&employer, &employee, None).await?;
//!     println!("stream {} finished", stream.id);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub mod backends;
pub mod controller;
pub mod error;
pub mod terms;

pub use backends::memory::MemoryStreamStore;
#[cfg(feature = "sqlite")]
pub use backends::sqlite::SqliteStreamStore;
pub use controller::StreamController;
pub use error::{LedgerError, Result};
pub use terms::{Amount, StreamTerms, SyncSnapshot, WalletAddress};

/// Stream lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Active,
    Paused,
    /// Terminal
    Cancelled,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Active => "active",
            StreamStatus::Paused => "paused",
            StreamStatus::Cancelled => "cancelled",
        }
    }

    /// Active or paused
    pub fn is_open(&self) -> bool {
        !matches!(self, StreamStatus::Cancelled)
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StreamStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(StreamStatus::Active),
            "paused" => Ok(StreamStatus::Paused),
            "cancelled" | "canceled" => Ok(StreamStatus::Cancelled),
            _ => Err(LedgerError::invalid_terms(format!("invalid stream status: {}", s))),
        }
    }
}

/// One employer/employee payroll stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: Uuid,
    pub employer_address: WalletAddress,
    pub employee_address: WalletAddress,
    pub monthly_salary: Amount,
    pub rate_per_second: Amount,
    pub duration_months: u32,
    pub tax_percent: u8,
    /// Unix seconds
    pub start_time: i64,
    /// Unix seconds; descriptive only, liveness comes from `status`
    pub end_time: i64,
    /// Never decreases
    pub withdrawn: Amount,
    pub paused: bool,
    pub status: StreamStatus,
    pub creation_tx_hash: Option<String>,
    pub cancellation_tx_hash: Option<String>,
    pub notes: Option<String>,
    pub last_synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Stream {
    /// A fresh active stream; timestamps are kept at millisecond precision
    pub fn new(
        employer: WalletAddress,
        employee: WalletAddress,
        terms: StreamTerms,
        now: DateTime<Utc>,
    ) -> Self {
        let now = now.trunc_subsecs(3);
        let end_time = terms.resolved_end_time();
        Self {
            id: Uuid::new_v4(),
            employer_address: employer,
            employee_address: employee,
            monthly_salary: terms.monthly_salary,
            rate_per_second: terms.rate_per_second,
            duration_months: terms.duration_months,
            tax_percent: terms.tax_percent,
            start_time: terms.start_time,
            end_time,
            withdrawn: Amount::zero(),
            paused: false,
            status: StreamStatus::Active,
            creation_tx_hash: terms.creation_tx_hash,
            cancellation_tx_hash: None,
            notes: terms.notes,
            last_synced_at: now,
            created_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Apply a mutation, keeping `paused` and `status` in step
    ///
    /// Leaves `self` untouched on error.
    pub fn apply(&mut self, patch: &StreamPatch) -> Result<()> {
        if self.status == StreamStatus::Cancelled {
            return Err(LedgerError::Terminal(self.id));
        }
        if let Some(ref withdrawn) = patch.withdrawn {
            if *withdrawn < self.withdrawn {
                return Err(LedgerError::invalid_terms(format!(
                    "withdrawn {} is below the recorded {}",
                    withdrawn, self.withdrawn
                )));
            }
            self.withdrawn = withdrawn.clone();
        }

        if patch.cancel {
            self.status = StreamStatus::Cancelled;
            self.paused = false;
            if patch.cancellation_tx_hash.is_some() {
                self.cancellation_tx_hash = patch.cancellation_tx_hash.clone();
            }
        } else if let Some(paused) = patch.paused {
            self.paused = paused;
            self.status = if paused {
                StreamStatus::Paused
            } else {
                StreamStatus::Active
            };
        }

        self.last_synced_at = patch.synced_at.trunc_subsecs(3);
        Ok(())
    }
}

/// A single atomic mutation of an open stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamPatch {
    pub paused: Option<bool>,
    pub withdrawn: Option<Amount>,
    pub cancel: bool,
    pub cancellation_tx_hash: Option<String>,
    pub synced_at: DateTime<Utc>,
}

impl StreamPatch {
    pub fn pause(paused: bool, now: DateTime<Utc>) -> Self {
        Self {
            paused: Some(paused),
            withdrawn: None,
            cancel: false,
            cancellation_tx_hash: None,
            synced_at: now,
        }
    }

    pub fn cancel(cancellation_tx_hash: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            paused: None,
            withdrawn: None,
            cancel: true,
            cancellation_tx_hash,
            synced_at: now,
        }
    }

    pub fn sync(snapshot: SyncSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            paused: snapshot.paused,
            withdrawn: snapshot.withdrawn,
            cancel: false,
            cancellation_tx_hash: None,
            synced_at: now,
        }
    }
}

/// Persistent stream repository
///
/// Addresses arrive as [`WalletAddress`] and are therefore already
/// normalised. "Open" means active or paused; mutations are scoped to open
/// streams so a cancelled stream is never resurrected.
#[async_trait]
pub trait StreamStore: Send + Sync {
    async fn find_open_stream(
        &self,
        employer: &WalletAddress,
        employee: &WalletAddress,
    ) -> Result<Option<Stream>>;

    /// Streams for an employer, newest `created_at` first
    async fn find_streams(
        &self,
        employer: &WalletAddress,
        status: Option<StreamStatus>,
    ) -> Result<Vec<Stream>>;

    /// Streams for an employee, newest `created_at` first
    async fn find_streams_by_employee(
        &self,
        employee: &WalletAddress,
        status: Option<StreamStatus>,
    ) -> Result<Vec<Stream>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Stream>>;

    /// Insert a new stream
    ///
    /// Fails with [`LedgerError::DuplicateOpenStream`] when an open stream
    /// already exists for the pair.
    async fn insert(&self, stream: &Stream) -> Result<Stream>;

    /// Atomically read, patch and write back the open stream for the pair
    ///
    /// Fails with [`LedgerError::NotFound`] when no open stream exists.
    async fn update_open_stream(
        &self,
        employer: &WalletAddress,
        employee: &WalletAddress,
        patch: &StreamPatch,
    ) -> Result<Stream>;

    /// Number of open streams for the pair (0 or 1)
    async fn count_open(&self, employer: &WalletAddress, employee: &WalletAddress) -> Result<u64>;
}

/// Open a stream store at the specified path
///
/// `:memory:` selects the in-memory backend; anything else is a SQLite
/// database file.
#[allow(clippy::needless_return)]
pub async fn open(path: &str) -> Result<Arc<dyn StreamStore>> {
    if path == ":memory:" {
        return Ok(Arc::new(MemoryStreamStore::new()));
    }

    #[cfg(feature = "sqlite")]
    {
        let store = SqliteStreamStore::open(path).await?;
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "sqlite"))]
    Err(LedgerError::Store(
        format!("no backend available for path: {}. Enable the 'sqlite' feature.", path).into(),
    ))
}
