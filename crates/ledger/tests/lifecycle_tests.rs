//! Stream lifecycle tests against both backends

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paystream_audit::{
    AuditDispatcher, AuditError, AuditEvent, AuditRecord, AuditStore, EventCapture, LogFilter,
    LogLevel, LogPage, LogQuery, LogQueryEngine, LogStats, NoopSink, Pagination, RecordId, Sort,
    SqliteAuditStore,
};
use paystream_ledger::{
    Amount, LedgerError, MemoryStreamStore, SqliteStreamStore, StreamController, StreamStatus,
    StreamStore, StreamTerms, SyncSnapshot, WalletAddress,
};
use std::sync::Arc;
use tempfile::NamedTempFile;

const EMPLOYER: &str = "0xAbCdEf0000000000000000000000000000000001";
const EMPLOYEE: &str = "0x00000000000000000000000000000000000000Ee";

fn pair() -> (WalletAddress, WalletAddress) {
    (
        WalletAddress::parse(EMPLOYER).unwrap(),
        WalletAddress::parse(EMPLOYEE).unwrap(),
    )
}

fn terms() -> StreamTerms {
    StreamTerms::new(
        Amount::parse("1000").unwrap(),
        Amount::parse("0.000385").unwrap(),
        12,
        1_700_000_000,
    )
    .with_tax_percent(10)
}

async fn sqlite_store() -> Result<(Arc<dyn StreamStore>, NamedTempFile)> {
    let tmp = NamedTempFile::new()?;
    let store = SqliteStreamStore::open(tmp.path().to_str().unwrap()).await?;
    Ok((Arc::new(store), tmp))
}

/// Run `check` against a fresh controller on every backend
macro_rules! on_each_backend {
    ($check:ident) => {{
        let capture = EventCapture::new();
        let memory: Arc<dyn StreamStore> = Arc::new(MemoryStreamStore::new());
        $check(StreamController::new(memory, Arc::new(capture.clone())), capture).await?;

        let capture = EventCapture::new();
        let (sqlite, _tmp) = sqlite_store().await?;
        $check(StreamController::new(sqlite, Arc::new(capture.clone())), capture).await?;
    }};
}

async fn create_then_conflict(controller: StreamController, capture: EventCapture) -> Result<()> {
    let (employer, employee) = pair();

    let created = controller.create(&employer, &employee, terms()).await?;
    assert_eq!(created.status, StreamStatus::Active);
    assert!(!created.paused);
    assert_eq!(created.employer_address.as_str(), EMPLOYER.to_lowercase());
    assert_eq!(created.employee_address.as_str(), EMPLOYEE.to_lowercase());
    assert_eq!(created.monthly_salary.as_str(), "1000");
    assert_eq!(created.duration_months, 12);
    assert_eq!(created.tax_percent, 10);

    match controller.create(&employer, &employee, terms()).await {
        Err(LedgerError::Conflict { existing }) => assert_eq!(*existing, created),
        other => panic!("expected conflict, got {:?}", other),
    }
    assert_eq!(controller.store().count_open(&employer, &employee).await?, 1);

    // only the successful create is audited
    assert_eq!(capture.event_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_create_twice_conflicts_with_existing() -> Result<()> {
    on_each_backend!(create_then_conflict);
    Ok(())
}

async fn pause_resume_cancel(controller: StreamController, capture: EventCapture) -> Result<()> {
    let (employer, employee) = pair();
    controller.create(&employer, &employee, terms()).await?;

    let paused = controller.set_paused(&employer, &employee, true).await?;
    assert_eq!((paused.status, paused.paused), (StreamStatus::Paused, true));

    let resumed = controller.set_paused(&employer, &employee, false).await?;
    assert_eq!((resumed.status, resumed.paused), (StreamStatus::Active, false));

    let cancelled = controller
        .cancel(&employer, &employee, Some("0xcancel".to_string()))
        .await?;
    assert_eq!(cancelled.status, StreamStatus::Cancelled);
    assert_eq!(cancelled.cancellation_tx_hash.as_deref(), Some("0xcancel"));

    let err = controller.set_paused(&employer, &employee, true).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    // re-cancel is indistinguishable from a stream that never existed
    let err = controller.cancel(&employer, &employee, None).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    let stored = controller.stream(cancelled.id).await?;
    assert_eq!(stored.status, StreamStatus::Cancelled);

    let cancel_events = capture.matching(&LogFilter::new().tags(["cancelled"]));
    assert_eq!(cancel_events.len(), 1);
    assert_eq!(cancel_events[0].level, LogLevel::Warn);
    Ok(())
}

#[tokio::test]
async fn test_pause_resume_cancel_then_not_found() -> Result<()> {
    on_each_backend!(pause_resume_cancel);
    Ok(())
}

async fn sync_partial(controller: StreamController, _capture: EventCapture) -> Result<()> {
    let (employer, employee) = pair();
    let created = controller.create(&employer, &employee, terms()).await?;
    controller.pause(&employer, &employee).await?;

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let synced = controller
        .sync(
            &employer,
            &employee,
            SyncSnapshot::new().withdrawn(Amount::parse("500").unwrap()),
        )
        .await?;

    assert_eq!(synced.withdrawn.as_str(), "500");
    assert_eq!((synced.status, synced.paused), (StreamStatus::Paused, true));
    assert!(synced.last_synced_at > created.last_synced_at);

    // an empty snapshot only advances the sync timestamp
    let touched = controller.sync(&employer, &employee, SyncSnapshot::new()).await?;
    assert_eq!(touched.withdrawn.as_str(), "500");
    assert_eq!(touched.status, StreamStatus::Paused);

    // observed pause state re-derives the status
    let resumed = controller
        .sync(&employer, &employee, SyncSnapshot::new().paused(false))
        .await?;
    assert_eq!((resumed.status, resumed.paused), (StreamStatus::Active, false));

    let err = controller
        .sync(
            &employer,
            &employee,
            SyncSnapshot::new().withdrawn(Amount::parse("499").unwrap()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTerms(_)));
    Ok(())
}

#[tokio::test]
async fn test_sync_applies_only_present_fields() -> Result<()> {
    on_each_backend!(sync_partial);
    Ok(())
}

async fn cancelled_is_terminal(controller: StreamController, _capture: EventCapture) -> Result<()> {
    let (employer, employee) = pair();
    let created = controller.create(&employer, &employee, terms()).await?;
    controller.cancel(&employer, &employee, None).await?;

    assert!(controller.pause(&employer, &employee).await.is_err());
    assert!(controller.resume(&employer, &employee).await.is_err());
    assert!(controller
        .sync(&employer, &employee, SyncSnapshot::new().paused(true))
        .await
        .is_err());

    assert_eq!(controller.stream(created.id).await?.status, StreamStatus::Cancelled);

    // the pair may start over with a fresh stream
    let renewed = controller.create(&employer, &employee, terms()).await?;
    assert_ne!(renewed.id, created.id);

    let history = controller.streams_for_employer(&employer, None).await?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, renewed.id);

    let cancelled = controller
        .streams_for_employer(&employer, Some(StreamStatus::Cancelled))
        .await?;
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, created.id);

    let for_employee = controller.streams_for_employee(&employee, None).await?;
    assert_eq!(for_employee.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_status_is_terminal() -> Result<()> {
    on_each_backend!(cancelled_is_terminal);
    Ok(())
}

async fn single_open_stream(controller: StreamController, _capture: EventCapture) -> Result<()> {
    let (employer, employee) = pair();
    let store = controller.store();

    controller.create(&employer, &employee, terms()).await?;
    for round in 0..3 {
        assert!(controller.create(&employer, &employee, terms()).await.is_err());
        controller.pause(&employer, &employee).await?;
        assert!(controller.create(&employer, &employee, terms()).await.is_err());
        controller.resume(&employer, &employee).await?;
        controller
            .sync(&employer, &employee, SyncSnapshot::new().paused(round % 2 == 0))
            .await?;
        assert_eq!(store.count_open(&employer, &employee).await?, 1);

        controller.cancel(&employer, &employee, None).await?;
        assert_eq!(store.count_open(&employer, &employee).await?, 0);
        controller.create(&employer, &employee, terms()).await?;
        assert_eq!(store.count_open(&employer, &employee).await?, 1);
    }

    for stream in controller.streams_for_employer(&employer, None).await? {
        assert_eq!(stream.paused, stream.status == StreamStatus::Paused);
    }
    Ok(())
}

#[tokio::test]
async fn test_at_most_one_open_stream_per_pair() -> Result<()> {
    on_each_backend!(single_open_stream);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_creates_yield_one_stream() -> Result<()> {
    let (store, _tmp) = sqlite_store().await?;
    let controller = StreamController::new(store.clone(), Arc::new(NoopSink));
    let (employer, employee) = pair();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let controller = controller.clone();
        let (employer, employee) = (employer.clone(), employee.clone());
        handles.push(tokio::spawn(async move {
            controller.create(&employer, &employee, terms()).await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => created += 1,
            Err(e) => assert!(
                e.is_conflict() || matches!(e, LedgerError::Store(_)),
                "unexpected error: {:?}",
                e
            ),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(store.count_open(&employer, &employee).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_toggles_keep_paused_and_status_aligned() -> Result<()> {
    let (store, _tmp) = sqlite_store().await?;
    let controller = StreamController::new(store.clone(), Arc::new(NoopSink));
    let (employer, employee) = pair();
    controller.create(&employer, &employee, terms()).await?;

    let mut handles = Vec::new();
    for i in 0..10 {
        let controller = controller.clone();
        let (employer, employee) = (employer.clone(), employee.clone());
        handles.push(tokio::spawn(async move {
            controller.set_paused(&employer, &employee, i % 2 == 0).await
        }));
    }
    for handle in handles {
        if let Ok(stream) = handle.await? {
            assert_eq!(stream.paused, stream.status == StreamStatus::Paused);
        }
    }

    let current = store
        .find_open_stream(&employer, &employee)
        .await?
        .expect("stream still open");
    assert_eq!(current.paused, current.status == StreamStatus::Paused);
    Ok(())
}

/// Audit store whose every write fails
struct BrokenAuditStore;

fn broken() -> AuditError {
    AuditError::Store("audit database offline".into())
}

#[async_trait]
impl AuditStore for BrokenAuditStore {
    async fn append(&self, _event: &AuditEvent) -> paystream_audit::Result<RecordId> {
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
async fn test_audit_failure_does_not_fail_operations() -> Result<()> {
    let (dispatcher, handle) = AuditDispatcher::spawn(Arc::new(BrokenAuditStore));
    let dispatcher = Arc::new(dispatcher);
    let controller = StreamController::new(Arc::new(MemoryStreamStore::new()), dispatcher.clone());
    let (employer, employee) = pair();

    controller.create(&employer, &employee, terms()).await?;
    controller.pause(&employer, &employee).await?;
    let cancelled = controller.cancel(&employer, &employee, None).await?;
    assert_eq!(cancelled.status, StreamStatus::Cancelled);

    dispatcher.shutdown();
    handle.await?;
    Ok(())
}

#[tokio::test]
async fn test_audit_records_reach_store_after_shutdown() -> Result<()> {
    let audit_store = Arc::new(SqliteAuditStore::open_in_memory().await?);
    let (dispatcher, handle) = AuditDispatcher::spawn(audit_store.clone());
    let dispatcher = Arc::new(dispatcher);
    let controller = StreamController::new(Arc::new(MemoryStreamStore::new()), dispatcher.clone());
    let (employer, employee) = pair();

    controller.create(&employer, &employee, terms()).await?;
    controller.pause(&employer, &employee).await?;
    controller.resume(&employer, &employee).await?;
    controller.cancel(&employer, &employee, None).await?;

    // visibility is only guaranteed once the dispatcher has drained
    dispatcher.shutdown();
    handle.await?;

    let engine = LogQueryEngine::new(audit_store);
    let page = engine
        .query(&LogQuery {
            filter: LogFilter::new().user(employer.as_str()).tags(["stream"]),
            ..LogQuery::default()
        })
        .await?;
    assert_eq!(page.total, 4);
    Ok(())
}
