//! In-memory sink for tests
//!
//! Business code under test emits into an [`EventCapture`]; assertions then
//! inspect what was emitted without a database or a background task.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::filter::LogFilter;
use crate::record::AuditEvent;
use crate::sink::AuditSink;

/// Event capture utility for testing
///
/// ```
/// use paystream_audit::{AuditEvent, AuditSink, EventCapture, LogFilter, LogLevel};
///
/// let capture = EventCapture::new();
/// capture.emit(AuditEvent::business(LogLevel::Success, "Stream created").with_tag("stream"));
///
/// assert_eq!(capture.event_count(), 1);
/// assert_eq!(capture.matching(&LogFilter::new().tags(["stream"])).len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct EventCapture {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl EventCapture {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AuditEvent>> {
        match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// All captured events, in emission order
    pub fn events(&self) -> Vec<AuditEvent> {
        self.lock().clone()
    }

    pub fn event_count(&self) -> usize {
        self.lock().len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn last(&self) -> Option<AuditEvent> {
        self.lock().last().cloned()
    }

    /// Find events matching a predicate
    pub fn find_events<F>(&self, predicate: F) -> Vec<AuditEvent>
    where
        F: Fn(&AuditEvent) -> bool,
    {
        self.events().into_iter().filter(predicate).collect()
    }

    /// Find events the given query filter would return
    pub fn matching(&self, filter: &LogFilter) -> Vec<AuditEvent> {
        self.find_events(|e| filter.matches(e))
    }
}

impl AuditSink for EventCapture {
    fn emit(&self, event: AuditEvent) {
        self.lock().push(event);
    }
}
