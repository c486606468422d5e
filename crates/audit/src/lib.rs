//! Paystream Audit: structured event capture and log queries
//!
//! # Overview
//!
//! Every subsystem records what it did as an immutable [`AuditRecord`]
//! categorised by level, category and tags. This crate provides:
//!
//! - **Record schema**: [`AuditEvent`] with per-category constructors
//! - **Storage**: the [`AuditStore`] trait and its SQLite backend
//! - **Queries**: [`LogQueryEngine`] for filtered, paginated queries,
//!   statistics, bulk export and the retention sweep
//! - **Emission**: the [`AuditSink`] seam, a batching [`AuditDispatcher`]
//!   and the [`EventCapture`] test sink
//!
//! # Example
//!
//! ```no_run
//! use paystream_audit::{
//!     AuditDispatcher, AuditEvent, AuditSink, LogLevel, LogQuery, LogQueryEngine,
//!     SqliteAuditStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(SqliteAuditStore::open("audit.db").await?);
//!     let (dispatcher, handle) = AuditDispatcher::spawn(store.clone());
//!
//!     dispatcher.emit(AuditEvent::system(LogLevel::Info, "service started"));
//!
//!     dispatcher.shutdown();
//!     handle.await?;
//!
//!     let engine = LogQueryEngine::new(store);
//!     let page = engine.query(&LogQuery::default()).await?;
//!     println!("{} records", page.total);
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod filter;
pub mod record;
pub mod sink;
pub mod sqlite;
pub mod store;
pub mod testing;

pub use engine::LogQueryEngine;
pub use error::{AuditError, Result};
pub use filter::{EndpointMatch, LogFilter, LogQuery, Pagination, Sort, SortField, SortOrder};
pub use record::{AuditEvent, AuditRecord, LogCategory, LogLevel, RecordId};
pub use sink::{AuditDispatcher, AuditSink, DispatcherConfig, NoopSink};
pub use sqlite::SqliteAuditStore;
pub use store::{AuditStore, LogPage, LogStats};
pub use testing::EventCapture;
