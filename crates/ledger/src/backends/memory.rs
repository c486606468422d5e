//! In-memory backend
//!
//! All streams live in one vector behind a `RwLock`; the write lock is the
//! atomic find-and-update boundary.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::{Stream, StreamPatch, StreamStatus, StreamStore, WalletAddress};

/// Process-local stream store
#[derive(Default)]
pub struct MemoryStreamStore {
    // insertion order
    streams: RwLock<Vec<Stream>>,
}

impl MemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_open_pair(stream: &Stream, employer: &WalletAddress, employee: &WalletAddress) -> bool {
    stream.is_open() && &stream.employer_address == employer && &stream.employee_address == employee
}

/// Newest first; later insertion wins a `created_at` tie
fn newest_first<'a, I>(streams: I, status: Option<StreamStatus>) -> Vec<Stream>
where
    I: DoubleEndedIterator<Item = &'a Stream>,
{
    let mut matching: Vec<Stream> = streams
        .rev()
        .filter(|s| status.map_or(true, |wanted| s.status == wanted))
        .cloned()
        .collect();
    matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    matching
}

#[async_trait]
impl StreamStore for MemoryStreamStore {
    async fn find_open_stream(
        &self,
        employer: &WalletAddress,
        employee: &WalletAddress,
    ) -> Result<Option<Stream>> {
        let streams = self.streams.read().await;
        Ok(streams
            .iter()
            .find(|s| is_open_pair(s, employer, employee))
            .cloned())
    }

    async fn find_streams(
        &self,
        employer: &WalletAddress,
        status: Option<StreamStatus>,
    ) -> Result<Vec<Stream>> {
        let streams = self.streams.read().await;
        Ok(newest_first(
            streams.iter().filter(|s| &s.employer_address == employer),
            status,
        ))
    }

    async fn find_streams_by_employee(
        &self,
        employee: &WalletAddress,
        status: Option<StreamStatus>,
    ) -> Result<Vec<Stream>> {
        let streams = self.streams.read().await;
        Ok(newest_first(
            streams.iter().filter(|s| &s.employee_address == employee),
            status,
        ))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Stream>> {
        let streams = self.streams.read().await;
        Ok(streams.iter().find(|s| s.id == id).cloned())
    }

    async fn insert(&self, stream: &Stream) -> Result<Stream> {
        let mut streams = self.streams.write().await;
        if stream.is_open()
            && streams
                .iter()
                .any(|s| is_open_pair(s, &stream.employer_address, &stream.employee_address))
        {
            return Err(LedgerError::DuplicateOpenStream);
        }
        streams.push(stream.clone());
        Ok(stream.clone())
    }

    async fn update_open_stream(
        &self,
        employer: &WalletAddress,
        employee: &WalletAddress,
        patch: &StreamPatch,
    ) -> Result<Stream> {
        let mut streams = self.streams.write().await;
        let current = streams
            .iter_mut()
            .find(|s| is_open_pair(s, employer, employee))
            .ok_or_else(|| LedgerError::no_open_stream(employer, employee))?;

        let mut updated = current.clone();
        updated.apply(patch)?;
        *current = updated.clone();
        Ok(updated)
    }

    async fn count_open(&self, employer: &WalletAddress, employee: &WalletAddress) -> Result<u64> {
        let streams = self.streams.read().await;
        Ok(streams
            .iter()
            .filter(|s| is_open_pair(s, employer, employee))
            .count() as u64)
    }
}
