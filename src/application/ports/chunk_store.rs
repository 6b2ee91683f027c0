//! Chunk store port interface

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::autosave::{AutosaveSummary, ChunkRecord};

/// Chunk store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Failed to open chunk store: {0}")]
    Open(String),

    #[error("Chunk write failed: {0}")]
    Write(String),

    #[error("Chunk {seq} of '{session_id}' is already stored with different content")]
    Conflict { session_id: String, seq: u64 },

    #[error("Chunk read failed: {0}")]
    Read(String),

    #[error("Chunk delete failed: {0}")]
    Delete(String),
}

/// Port for the autosave key/value store.
///
/// Records are keyed by `(session_id, seq)` and immutable once written.
/// Iteration order of `query` is unspecified; callers sort by `seq`.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert one record.
    ///
    /// Writing an existing key succeeds only when the stored blob is
    /// byte-identical; otherwise [`StoreError::Conflict`] is returned.
    async fn put(&self, record: ChunkRecord) -> Result<(), StoreError>;

    /// Insert several records atomically, with the same conflict rule as `put`
    async fn bulk_put(&self, records: Vec<ChunkRecord>) -> Result<(), StoreError>;

    /// All records stored under `session_id`
    async fn query(&self, session_id: &str) -> Result<Vec<ChunkRecord>, StoreError>;

    /// Delete every record stored under `session_id`, returning how many were removed
    async fn delete_where(&self, session_id: &str) -> Result<u64, StoreError>;

    /// Summaries of every session id present in the store
    async fn sessions(&self) -> Result<Vec<AutosaveSummary>, StoreError>;
}
