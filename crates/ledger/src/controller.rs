//! Stream lifecycle controller
//!
//! State machine over [`StreamStatus`]:
//!
//! ```text
//!   create ──► active ◄──► paused
//!                 │           │
//!                 └──► cancelled ◄┘   (terminal)
//! ```
//!
//! Every mutation goes through the repository's atomic
//! `update_open_stream`, so concurrent pause/resume/sync calls on one pair
//! serialise there. Audit events are handed to the [`AuditSink`] after the
//! mutation succeeds and never affect its outcome.

use chrono::Utc;
use paystream_audit::{AuditEvent, AuditSink, LogLevel};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::{Stream, StreamPatch, StreamStatus, StreamStore, StreamTerms, SyncSnapshot, WalletAddress};

/// Drives stream state transitions against a [`StreamStore`]
#[derive(Clone)]
pub struct StreamController {
    store: Arc<dyn StreamStore>,
    audit: Arc<dyn AuditSink>,
}

impl StreamController {
    pub fn new(store: Arc<dyn StreamStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    pub fn store(&self) -> Arc<dyn StreamStore> {
        Arc::clone(&self.store)
    }

    /// Open a new active stream for the pair
    ///
    /// Fails with [`LedgerError::Conflict`] carrying the existing stream when
    /// the pair already has an open one.
    pub async fn create(
        &self,
        employer: &WalletAddress,
        employee: &WalletAddress,
        terms: StreamTerms,
    ) -> Result<Stream> {
        terms.validate()?;

        if let Some(existing) = self.store.find_open_stream(employer, employee).await? {
            debug!(stream_id = %existing.id, "Open stream already exists");
            return Err(LedgerError::Conflict {
                existing: Box::new(existing),
            });
        }

        let stream = Stream::new(employer.clone(), employee.clone(), terms, Utc::now());
        let stream = match self.store.insert(&stream).await {
            Ok(stream) => stream,
            // lost a race against a concurrent create
            Err(LedgerError::DuplicateOpenStream) => {
                return match self.store.find_open_stream(employer, employee).await? {
                    Some(existing) => Err(LedgerError::Conflict {
                        existing: Box::new(existing),
                    }),
                    None => Err(LedgerError::DuplicateOpenStream),
                };
            }
            Err(e) => return Err(e),
        };

        info!(
            stream_id = %stream.id,
            employer = %employer,
            employee = %employee,
            "Stream created"
        );
        self.audit.emit(
            AuditEvent::business(LogLevel::Success, "Salary stream created")
                .with_user(employer.as_str())
                .with_details(json!({
                    "streamId": stream.id,
                    "employerAddress": stream.employer_address,
                    "employeeAddress": stream.employee_address,
                    "monthlySalary": stream.monthly_salary,
                    "ratePerSecond": stream.rate_per_second,
                    "durationMonths": stream.duration_months,
                    "taxPercent": stream.tax_percent,
                    "startTime": stream.start_time,
                    "endTime": stream.end_time,
                    "creationTxHash": stream.creation_tx_hash,
                }))
                .with_tags(["stream", "created"]),
        );

        Ok(stream)
    }

    /// Pause or resume the open stream for the pair
    pub async fn set_paused(
        &self,
        employer: &WalletAddress,
        employee: &WalletAddress,
        paused: bool,
    ) -> Result<Stream> {
        let patch = StreamPatch::pause(paused, Utc::now());
        let stream = self
            .store
            .update_open_stream(employer, employee, &patch)
            .await?;

        let state = if paused { "paused" } else { "resumed" };
        info!(stream_id = %stream.id, state, "Stream {}", state);
        self.audit.emit(
            AuditEvent::business(LogLevel::Info, format!("Salary stream {}", state))
                .with_user(employer.as_str())
                .with_details(json!({
                    "streamId": stream.id,
                    "employeeAddress": stream.employee_address,
                    "paused": stream.paused,
                    "status": stream.status,
                }))
                .with_tags(["stream", state]),
        );

        Ok(stream)
    }

    pub async fn pause(&self, employer: &WalletAddress, employee: &WalletAddress) -> Result<Stream> {
        self.set_paused(employer, employee, true).await
    }

    pub async fn resume(&self, employer: &WalletAddress, employee: &WalletAddress) -> Result<Stream> {
        self.set_paused(employer, employee, false).await
    }

    /// Cancel the open stream for the pair
    ///
    /// A second cancel finds no open stream and fails with `NotFound`.
    pub async fn cancel(
        &self,
        employer: &WalletAddress,
        employee: &WalletAddress,
        cancellation_tx_hash: Option<String>,
    ) -> Result<Stream> {
        let patch = StreamPatch::cancel(cancellation_tx_hash, Utc::now());
        let stream = self
            .store
            .update_open_stream(employer, employee, &patch)
            .await?;

        warn!(stream_id = %stream.id, employer = %employer, employee = %employee, "Stream cancelled");
        self.audit.emit(
            AuditEvent::business(LogLevel::Warn, "Salary stream cancelled")
                .with_user(employer.as_str())
                .with_details(json!({
                    "streamId": stream.id,
                    "employeeAddress": stream.employee_address,
                    "withdrawn": stream.withdrawn,
                    "cancellationTxHash": stream.cancellation_tx_hash,
                }))
                .with_tags(["stream", "cancelled"]),
        );

        Ok(stream)
    }

    /// Apply an upstream snapshot to the open stream for the pair
    ///
    /// Absent snapshot fields are left untouched; `last_synced_at` always
    /// advances. No audit event is emitted.
    pub async fn sync(
        &self,
        employer: &WalletAddress,
        employee: &WalletAddress,
        snapshot: SyncSnapshot,
    ) -> Result<Stream> {
        let patch = StreamPatch::sync(snapshot, Utc::now());
        let stream = self
            .store
            .update_open_stream(employer, employee, &patch)
            .await?;

        debug!(
            stream_id = %stream.id,
            withdrawn = %stream.withdrawn,
            status = %stream.status,
            "Stream synced"
        );
        Ok(stream)
    }

    /// An employer's streams, newest first
    pub async fn streams_for_employer(
        &self,
        employer: &WalletAddress,
        status: Option<StreamStatus>,
    ) -> Result<Vec<Stream>> {
        self.store.find_streams(employer, status).await
    }

    /// An employee's streams, newest first
    pub async fn streams_for_employee(
        &self,
        employee: &WalletAddress,
        status: Option<StreamStatus>,
    ) -> Result<Vec<Stream>> {
        self.store.find_streams_by_employee(employee, status).await
    }

    pub async fn stream(&self, id: Uuid) -> Result<Stream> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("stream {}", id)))
    }
}
