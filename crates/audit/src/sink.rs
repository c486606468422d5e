//! Fire-and-forget audit emission
//!
//! Business operations hand events to an [`AuditSink`] and move on. The
//! [`AuditDispatcher`] decouples them from store latency by buffering
//! events on a channel and flushing them in batches from a background task:
//!
//! ```text
//! controller ──┐
//!              ├──► emit (try_send) ──► channel ──► batch buffer ──► AuditStore::append_batch
//! http layer ──┘     never blocks,          ▲
//!                    never fails            │
//!                                    dispatcher task
//!                                    (flushes every flush_interval
//!                                     or batch_size events)
//! ```
//!
//! Delivery is best-effort: a full channel or a failed flush drops events
//! with a warning. Visibility in queries lags emission.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::record::AuditEvent;
use crate::store::AuditStore;

/// Destination for audit events
///
/// `emit` must not block on I/O and must not fail the caller.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl AuditSink for NoopSink {
    fn emit(&self, _event: AuditEvent) {}
}

impl<S: AuditSink + ?Sized> AuditSink for Arc<S> {
    fn emit(&self, event: AuditEvent) {
        (**self).emit(event)
    }
}

/// Configuration for the [`AuditDispatcher`]
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of events to buffer before flushing
    pub batch_size: usize,
    /// Maximum time between flushes
    pub flush_interval: Duration,
    /// Channel capacity; events beyond it are dropped
    pub channel_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            flush_interval: Duration::from_millis(250),
            channel_capacity: 1024,
        }
    }
}

/// Background writer feeding an [`AuditStore`]
pub struct AuditDispatcher {
    event_tx: mpsc::Sender<AuditEvent>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl AuditDispatcher {
    /// Spawn the dispatcher task with default settings
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<dyn AuditStore>) -> (Self, JoinHandle<()>) {
        Self::spawn_with_config(store, DispatcherConfig::default())
    }

    pub fn spawn_with_config(
        store: Arc<dyn AuditStore>,
        config: DispatcherConfig,
    ) -> (Self, JoinHandle<()>) {
        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(run_dispatch_loop(store, event_rx, shutdown_rx, config));

        let dispatcher = Self {
            event_tx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
        };

        (dispatcher, handle)
    }

    /// Ask the task to flush everything it holds and stop
    ///
    /// Await the `JoinHandle` returned by `spawn` to know when buffered
    /// events have reached the store.
    pub fn shutdown(&self) {
        let sender = match self.shutdown_tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tx) = sender {
            let _ = tx.send(());
            info!("Audit dispatcher shutdown signal sent");
        }
    }
}

impl AuditSink for AuditDispatcher {
    fn emit(&self, event: AuditEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    level = %event.level,
                    category = %event.category,
                    message = %event.message,
                    "Audit channel full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(
                    message = %event.message,
                    "Audit dispatcher stopped, dropping event"
                );
            }
        }
    }
}

async fn run_dispatch_loop(
    store: Arc<dyn AuditStore>,
    mut event_rx: mpsc::Receiver<AuditEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
    config: DispatcherConfig,
) {
    let batch_size = config.batch_size.max(1);
    let mut buffer = Vec::with_capacity(batch_size);
    let mut flush_timer = tokio::time::interval(config.flush_interval.max(Duration::from_millis(1)));
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    debug!(
        batch_size,
        flush_interval_ms = config.flush_interval.as_millis() as u64,
        "Audit dispatcher started"
    );

    loop {
        tokio::select! {
            received = event_rx.recv() => match received {
                Some(event) => {
                    buffer.push(event);
                    if buffer.len() >= batch_size {
                        flush(&store, &mut buffer).await;
                    }
                }
                None => {
                    // every sender is gone
                    flush(&store, &mut buffer).await;
                    break;
                }
            },

            _ = flush_timer.tick() => {
                flush(&store, &mut buffer).await;
            }

            _ = &mut shutdown_rx => {
                event_rx.close();
                while let Some(event) = event_rx.recv().await {
                    buffer.push(event);
                }
                flush(&store, &mut buffer).await;
                break;
            }
        }
    }

    info!("Audit dispatcher stopped");
}

/// Write the buffered events; failures are logged and the batch dropped
async fn flush(store: &Arc<dyn AuditStore>, buffer: &mut Vec<AuditEvent>) {
    if buffer.is_empty() {
        return;
    }

    let count = buffer.len();
    match store.append_batch(buffer).await {
        Ok(_) => debug!(count, "Flushed audit events"),
        Err(e) => warn!(count, error = ?e, "Failed to persist audit events"),
    }
    buffer.clear();
}
