/*!
 * Service wiring: stores, controller, query engine and audit dispatch
 */

use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use paystream_audit::{AuditDispatcher, AuditSink, AuditStore, LogQueryEngine, NoopSink, SqliteAuditStore};
use paystream_ledger::{StreamController, StreamStore};

use crate::config::PaystreamConfig;
use crate::error::Result;

/// A running Paystream instance
pub struct Paystream {
    controller: StreamController,
    logs: LogQueryEngine,
    dispatcher: Option<(Arc<AuditDispatcher>, JoinHandle<()>)>,
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Paystream {
    /// Open both databases and start audit dispatch
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(config: &PaystreamConfig) -> Result<Self> {
        config.validate()?;

        let streams = paystream_ledger::open(&path_str(&config.streams_db)).await?;
        let audit_db = path_str(&config.audit_db);
        let audit_store: Arc<dyn AuditStore> = if audit_db == ":memory:" {
            Arc::new(SqliteAuditStore::open_in_memory().await?)
        } else {
            Arc::new(SqliteAuditStore::open(&audit_db).await?)
        };

        debug!(streams_db = %config.streams_db.display(), audit_db = %audit_db, "Stores opened");
        Ok(Self::with_stores(config, streams, audit_store))
    }

    /// Wire pre-built stores, e.g. in-memory ones for tests
    pub fn with_stores(
        config: &PaystreamConfig,
        streams: Arc<dyn StreamStore>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        let (sink, dispatcher) = if config.audit.enabled {
            let (dispatcher, handle) = AuditDispatcher::spawn_with_config(
                audit_store.clone(),
                config.audit.dispatcher_config(),
            );
            let dispatcher = Arc::new(dispatcher);
            let sink: Arc<dyn AuditSink> = dispatcher.clone();
            (sink, Some((dispatcher, handle)))
        } else {
            info!("Audit emission disabled");
            let sink: Arc<dyn AuditSink> = Arc::new(NoopSink);
            (sink, None)
        };

        Self {
            controller: StreamController::new(streams, sink),
            logs: LogQueryEngine::new(audit_store),
            dispatcher,
        }
    }

    pub fn controller(&self) -> &StreamController {
        &self.controller
    }

    pub fn logs(&self) -> &LogQueryEngine {
        &self.logs
    }

    /// Flush pending audit events and stop the dispatcher
    pub async fn shutdown(self) {
        if let Some((dispatcher, handle)) = self.dispatcher {
            dispatcher.shutdown();
            if let Err(e) = handle.await {
                warn!(error = %e, "Audit dispatcher task failed");
            }
        }
    }
}
