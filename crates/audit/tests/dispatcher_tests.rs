//! Integration tests for the background audit dispatcher

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paystream_audit::{
    AuditDispatcher, AuditError, AuditEvent, AuditRecord, AuditSink, AuditStore,
    DispatcherConfig, LogFilter, LogLevel, LogPage, LogQuery, LogQueryEngine, LogStats,
    Pagination, RecordId, Sort, SqliteAuditStore,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Store whose every write fails
#[derive(Default)]
struct FailingStore {
    attempts: AtomicUsize,
}

fn broken() -> AuditError {
    AuditError::Store("disk unavailable".into())
}

#[async_trait]
impl AuditStore for FailingStore {
    async fn append(&self, _event: &AuditEvent) -> paystream_audit::Result<RecordId> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(broken())
    }

    async fn get(&self, _id: RecordId) -> paystream_audit::Result<Option<AuditRecord>> {
        Err(broken())
    }

    async fn query(
        &self,
        _filter: &LogFilter,
        _sort: Sort,
        _page: Pagination,
    ) -> paystream_audit::Result<LogPage> {
        Err(broken())
    }

    async fn export(
        &self,
        _filter: &LogFilter,
        _sort: Sort,
        _limit: u32,
    ) -> paystream_audit::Result<Vec<AuditRecord>> {
        Err(broken())
    }

    async fn stats(&self, _filter: &LogFilter) -> paystream_audit::Result<LogStats> {
        Err(broken())
    }

    async fn delete_older_than(&self, _cutoff: DateTime<Utc>) -> paystream_audit::Result<u64> {
        Err(broken())
    }
}

#[tokio::test]
async fn test_shutdown_flushes_buffered_events() -> Result<()> {
    let store = Arc::new(SqliteAuditStore::open_in_memory().await?);
    let config = DispatcherConfig {
        batch_size: 1000,
        flush_interval: Duration::from_secs(3600),
        channel_capacity: 64,
    };
    let (dispatcher, handle) = AuditDispatcher::spawn_with_config(store.clone(), config);

    for i in 0..10 {
        dispatcher.emit(AuditEvent::system(LogLevel::Info, format!("event {}", i)));
    }

    dispatcher.shutdown();
    handle.await?;

    let engine = LogQueryEngine::new(store);
    let page = engine.query(&LogQuery::default()).await?;
    assert_eq!(page.total, 10);
    Ok(())
}

#[tokio::test]
async fn test_full_batch_flushes_without_shutdown() -> Result<()> {
    let store = Arc::new(SqliteAuditStore::open_in_memory().await?);
    let config = DispatcherConfig {
        batch_size: 3,
        flush_interval: Duration::from_secs(3600),
        channel_capacity: 64,
    };
    let (dispatcher, handle) = AuditDispatcher::spawn_with_config(store.clone(), config);
    let engine = LogQueryEngine::new(store);

    for i in 0..3 {
        dispatcher.emit(AuditEvent::business(LogLevel::Info, format!("batched {}", i)));
    }

    let mut total = 0;
    for _ in 0..100 {
        total = engine.query(&LogQuery::default()).await?.total;
        if total == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(total, 3);

    dispatcher.shutdown();
    handle.await?;
    Ok(())
}

#[tokio::test]
async fn test_failing_store_is_not_fatal() -> Result<()> {
    let store = Arc::new(FailingStore::default());
    let (dispatcher, handle) = AuditDispatcher::spawn(store.clone());

    dispatcher.emit(AuditEvent::system(LogLevel::Error, "lost"));
    dispatcher.emit(AuditEvent::system(LogLevel::Error, "also lost"));

    dispatcher.shutdown();
    handle.await?;

    // the batch was attempted and dropped; the task still exited cleanly
    assert!(store.attempts.load(Ordering::SeqCst) >= 1);
    Ok(())
}

#[tokio::test]
async fn test_emit_after_shutdown_is_dropped() -> Result<()> {
    let store = Arc::new(SqliteAuditStore::open_in_memory().await?);
    let (dispatcher, handle) = AuditDispatcher::spawn(store.clone());

    dispatcher.shutdown();
    handle.await?;

    // must neither panic nor block
    dispatcher.emit(AuditEvent::system(LogLevel::Info, "too late"));
    dispatcher.shutdown();

    let engine = LogQueryEngine::new(store);
    assert_eq!(engine.query(&LogQuery::default()).await?.total, 0);
    Ok(())
}
