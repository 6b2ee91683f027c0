//! Autosave manager: sequence-numbered chunk append and replay

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::domain::autosave::{AutosaveSummary, ChunkRecord};
use crate::domain::config::DEFAULT_STORAGE_RETRIES;
use crate::domain::recording::{AudioData, AudioFormat};

use super::ports::{ChunkReceiver, ChunkStore, StoreError};

/// Base delay between write retries; attempt `n` waits `n` times this long
pub const RETRY_BACKOFF: StdDuration = StdDuration::from_millis(50);

/// Capacity of the event broadcast buffer
const EVENT_CAPACITY: usize = 64;

/// Errors from the autosave manager
#[derive(Debug, Clone, Error)]
pub enum AutosaveError {
    #[error("Failed to persist chunk {seq} of session '{session_id}' after {attempts} attempt(s): {reason}")]
    StorageWriteFailed {
        session_id: String,
        seq: u64,
        attempts: u32,
        reason: String,
    },

    #[error("Chunk store error: {0}")]
    Store(#[from] StoreError),
}

/// Change notifications published by the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutosaveEvent {
    ChunkSaved {
        session_id: String,
        seq: u64,
        bytes: usize,
    },
    ChunkWriteFailed {
        session_id: String,
        seq: u64,
    },
    Cleared {
        session_id: String,
        removed: u64,
    },
}

/// Owns the per-session sequence counters and talks to the chunk store.
///
/// Counters only move forward after the store acknowledges a write, so the
/// stored sequence numbers for a session are always `0..n` without gaps.
pub struct AutosaveManager<S: ChunkStore> {
    store: S,
    counters: HashMap<String, u64>,
    retries: u32,
    retry_backoff: StdDuration,
    events: broadcast::Sender<AutosaveEvent>,
}

impl<S: ChunkStore> AutosaveManager<S> {
    /// Create a manager with the default retry policy
    pub fn new(store: S) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            counters: HashMap::new(),
            retries: DEFAULT_STORAGE_RETRIES,
            retry_backoff: RETRY_BACKOFF,
            events,
        }
    }

    /// Override how many times a failed write is retried
    pub fn with_retries(mut self, retries: u32, backoff: StdDuration) -> Self {
        self.retries = retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Sequence number the next chunk of `session_id` will get
    pub fn next_seq(&self, session_id: &str) -> u64 {
        self.counters.get(session_id).copied().unwrap_or(0)
    }

    /// Start numbering `session_id` from 0 again.
    ///
    /// Clearing storage does not do this implicitly; whoever (re)initializes a
    /// session under a reused id must call it.
    pub fn reset_session(&mut self, session_id: &str) {
        self.counters.remove(session_id);
    }

    /// Subscribe to store change events
    pub fn subscribe(&self) -> broadcast::Receiver<AutosaveEvent> {
        self.events.subscribe()
    }

    /// Append one chunk under the next sequence number of `session_id`
    pub async fn on_chunk(
        &mut self,
        session_id: &str,
        chunk: &AudioData,
    ) -> Result<u64, AutosaveError> {
        let seq = self.next_seq(session_id);
        let record = ChunkRecord::new(session_id, seq, chunk);
        let max_attempts = self.retries + 1;
        let mut attempts = 0;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            match self.store.put(record.clone()).await {
                Ok(()) => {
                    self.counters.insert(session_id.to_string(), seq + 1);
                    debug!(session_id, seq, bytes = chunk.size_bytes(), "chunk autosaved");
                    let _ = self.events.send(AutosaveEvent::ChunkSaved {
                        session_id: session_id.to_string(),
                        seq,
                        bytes: chunk.size_bytes(),
                    });
                    return Ok(seq);
                }
                Err(e @ StoreError::Conflict { .. }) => {
                    // Retrying cannot change what is already stored
                    warn!(session_id, seq, error = %e, "chunk slot already taken");
                    last_error = Some(e);
                    break;
                }
                Err(e) => {
                    warn!(session_id, seq, attempt, error = %e, "chunk write failed");
                    last_error = Some(e);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry_backoff * attempt).await;
                    }
                }
            }
        }

        let _ = self.events.send(AutosaveEvent::ChunkWriteFailed {
            session_id: session_id.to_string(),
            seq,
        });
        Err(AutosaveError::StorageWriteFailed {
            session_id: session_id.to_string(),
            seq,
            attempts,
            reason: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Replay every chunk of `session_id` in sequence order as one object.
    ///
    /// Returns `None` when nothing is stored under the id.
    pub async fn load_autosave(&self, session_id: &str) -> Result<Option<AudioData>, AutosaveError> {
        let mut records = self.store.query(session_id).await?;
        if records.is_empty() {
            warn!(session_id, "No autosave found");
            return Ok(None);
        }

        // Storage iteration order is not trusted
        records.sort_by_key(|r| r.seq);

        let format = match records[0].format() {
            Some(format) => format,
            None => {
                warn!(
                    session_id,
                    content_type = %records[0].content_type,
                    "unknown chunk content type, assuming default format"
                );
                AudioFormat::default()
            }
        };

        let total: usize = records.iter().map(|r| r.blob.len()).sum();
        let mut data = Vec::with_capacity(total);
        for record in &records {
            data.extend_from_slice(&record.blob);
        }

        info!(session_id, chunks = records.len(), bytes = total, "autosave loaded");
        Ok(Some(AudioData::new(data, format)))
    }

    /// Delete every chunk of `session_id`. The counter is left untouched.
    pub async fn clear_autosave(&self, session_id: &str) -> Result<u64, AutosaveError> {
        let removed = self.store.delete_where(session_id).await?;
        info!(session_id, removed, "autosave cleared");
        let _ = self.events.send(AutosaveEvent::Cleared {
            session_id: session_id.to_string(),
            removed,
        });
        Ok(removed)
    }

    /// Summaries of every autosave slot in the store
    pub async fn list_autosaves(&self) -> Result<Vec<AutosaveSummary>, AutosaveError> {
        Ok(self.store.sessions().await?)
    }
}

/// Outcome of one autosave pump run
#[derive(Debug, Default)]
pub struct PumpReport {
    /// Chunks written to the store
    pub persisted: u64,
    /// Chunks received after autosave was disabled by a failed write
    pub skipped: u64,
    /// The write failure that disabled autosave, if any
    pub error: Option<AutosaveError>,
}

/// Consume engine chunks and persist them under `session_id` until the
/// channel closes.
///
/// After a write fails for good, later chunks are drained but not stored so
/// the persisted chunks stay a gap-free prefix of the recording.
pub async fn run_autosave_pump<S: ChunkStore>(
    manager: Arc<Mutex<AutosaveManager<S>>>,
    session_id: String,
    mut chunks: ChunkReceiver,
) -> PumpReport {
    let mut report = PumpReport::default();

    while let Some(chunk) = chunks.recv().await {
        if report.error.is_some() {
            report.skipped += 1;
            continue;
        }

        let result = manager.lock().await.on_chunk(&session_id, &chunk).await;
        match result {
            Ok(_) => report.persisted += 1,
            Err(e) => {
                error!(session_id = %session_id, error = %e, "autosave disabled for this recording");
                report.error = Some(e);
            }
        }
    }

    debug!(
        session_id = %session_id,
        persisted = report.persisted,
        skipped = report.skipped,
        "autosave pump finished"
    );
    report
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    /// In-memory store that returns records in reverse key order and can be
    /// told to fail the next N writes.
    #[derive(Default, Clone)]
    pub(crate) struct MemoryStore {
        records: Arc<StdMutex<BTreeMap<(String, u64), ChunkRecord>>>,
        failures_left: Arc<AtomicU32>,
    }

    impl MemoryStore {
        pub(crate) fn fail_next(&self, n: u32) {
            self.failures_left.store(n, Ordering::SeqCst);
        }

        pub(crate) fn seqs(&self, session_id: &str) -> Vec<u64> {
            self.records
                .lock()
                .unwrap()
                .keys()
                .filter(|(id, _)| id == session_id)
                .map(|(_, seq)| *seq)
                .collect()
        }
    }

    #[async_trait]
    impl ChunkStore for MemoryStore {
        async fn put(&self, record: ChunkRecord) -> Result<(), StoreError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Write("disk full".to_string()));
            }
            let mut records = self.records.lock().unwrap();
            let key = (record.session_id.clone(), record.seq);
            match records.get(&key) {
                Some(stored) if stored.blob == record.blob => Ok(()),
                Some(_) => Err(StoreError::Conflict {
                    session_id: key.0,
                    seq: key.1,
                }),
                None => {
                    records.insert(key, record);
                    Ok(())
                }
            }
        }

        async fn bulk_put(&self, records: Vec<ChunkRecord>) -> Result<(), StoreError> {
            for record in records {
                self.put(record).await?;
            }
            Ok(())
        }

        async fn query(&self, session_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .values()
                .rev()
                .filter(|r| r.session_id == session_id)
                .cloned()
                .collect())
        }

        async fn delete_where(&self, session_id: &str) -> Result<u64, StoreError> {
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|(id, _), _| id != session_id);
            Ok((before - records.len()) as u64)
        }

        async fn sessions(&self) -> Result<Vec<AutosaveSummary>, StoreError> {
            let records = self.records.lock().unwrap();
            let mut summaries: Vec<AutosaveSummary> = Vec::new();
            for record in records.values() {
                match summaries.iter_mut().find(|s| s.session_id == record.session_id) {
                    Some(summary) => {
                        summary.chunk_count += 1;
                        summary.total_bytes += record.blob.len() as u64;
                        summary.last_created_at = record.created_at;
                    }
                    None => summaries.push(AutosaveSummary {
                        session_id: record.session_id.clone(),
                        chunk_count: 1,
                        total_bytes: record.blob.len() as u64,
                        first_created_at: record.created_at,
                        last_created_at: record.created_at,
                    }),
                }
            }
            Ok(summaries)
        }
    }

    fn chunk(bytes: &[u8]) -> AudioData {
        AudioData::new(bytes.to_vec(), AudioFormat::Webm)
    }

    fn manager(store: MemoryStore) -> AutosaveManager<MemoryStore> {
        AutosaveManager::new(store).with_retries(2, StdDuration::from_millis(1))
    }

    #[tokio::test]
    async fn sequence_numbers_are_contiguous_from_zero() {
        let store = MemoryStore::default();
        let mut manager = manager(store.clone());

        for i in 0..5u8 {
            let seq = manager.on_chunk("slot", &chunk(&[i])).await.unwrap();
            assert_eq!(seq, i as u64);
        }

        assert_eq!(store.seqs("slot"), vec![0, 1, 2, 3, 4]);
        assert_eq!(manager.next_seq("slot"), 5);
    }

    #[tokio::test]
    async fn sessions_have_independent_counters() {
        let store = MemoryStore::default();
        let mut manager = manager(store.clone());

        manager.on_chunk("a", &chunk(&[1])).await.unwrap();
        manager.on_chunk("b", &chunk(&[2])).await.unwrap();
        manager.on_chunk("a", &chunk(&[3])).await.unwrap();

        assert_eq!(store.seqs("a"), vec![0, 1]);
        assert_eq!(store.seqs("b"), vec![0]);
    }

    #[tokio::test]
    async fn load_sorts_by_sequence_regardless_of_store_order() {
        let store = MemoryStore::default();
        let mut manager = manager(store);

        manager.on_chunk("slot", &chunk(b"c0")).await.unwrap();
        manager.on_chunk("slot", &chunk(b"c1")).await.unwrap();
        manager.on_chunk("slot", &chunk(b"c2")).await.unwrap();

        let audio = manager.load_autosave("slot").await.unwrap().unwrap();
        assert_eq!(audio.data(), b"c0c1c2");
        assert_eq!(audio.format(), AudioFormat::Webm);
    }

    #[tokio::test]
    async fn load_inherits_first_chunk_content_type() {
        let store = MemoryStore::default();
        let mut manager = manager(store);

        manager
            .on_chunk("slot", &AudioData::new(vec![1], AudioFormat::Wav))
            .await
            .unwrap();
        manager.on_chunk("slot", &chunk(&[2])).await.unwrap();

        let audio = manager.load_autosave("slot").await.unwrap().unwrap();
        assert_eq!(audio.format(), AudioFormat::Wav);
    }

    #[tokio::test]
    async fn load_of_unknown_session_is_none() {
        let manager = manager(MemoryStore::default());
        assert!(manager.load_autosave("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_then_load_finds_nothing() {
        let store = MemoryStore::default();
        let mut manager = manager(store);
        manager.on_chunk("slot", &chunk(&[1])).await.unwrap();
        manager.on_chunk("other", &chunk(&[2])).await.unwrap();

        let removed = manager.clear_autosave("slot").await.unwrap();
        assert_eq!(removed, 1);
        assert!(manager.load_autosave("slot").await.unwrap().is_none());
        assert!(manager.load_autosave("other").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clear_does_not_reset_counter_but_reset_session_does() {
        let store = MemoryStore::default();
        let mut manager = manager(store.clone());
        manager.on_chunk("slot", &chunk(&[1])).await.unwrap();
        manager.on_chunk("slot", &chunk(&[2])).await.unwrap();

        manager.clear_autosave("slot").await.unwrap();
        assert_eq!(manager.next_seq("slot"), 2);

        manager.reset_session("slot");
        assert_eq!(manager.next_seq("slot"), 0);
        manager.on_chunk("slot", &chunk(&[3])).await.unwrap();
        assert_eq!(store.seqs("slot"), vec![0]);
    }

    #[tokio::test]
    async fn transient_write_failure_is_retried() {
        let store = MemoryStore::default();
        let mut manager = manager(store.clone());

        store.fail_next(2);
        let seq = manager.on_chunk("slot", &chunk(&[1])).await.unwrap();
        assert_eq!(seq, 0);
        assert_eq!(store.seqs("slot"), vec![0]);
    }

    #[tokio::test]
    async fn exhausted_retries_do_not_advance_counter() {
        let store = MemoryStore::default();
        let mut manager = manager(store.clone());
        manager.on_chunk("slot", &chunk(&[1])).await.unwrap();

        store.fail_next(3);
        let err = manager.on_chunk("slot", &chunk(&[2])).await.unwrap_err();
        match err {
            AutosaveError::StorageWriteFailed { seq, attempts, .. } => {
                assert_eq!(seq, 1);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(manager.next_seq("slot"), 1);

        // The next successful write fills the same slot
        let seq = manager.on_chunk("slot", &chunk(&[3])).await.unwrap();
        assert_eq!(seq, 1);
        assert_eq!(store.seqs("slot"), vec![0, 1]);
    }

    #[tokio::test]
    async fn occupied_slot_is_not_overwritten() {
        let store = MemoryStore::default();
        store
            .put(ChunkRecord::new("slot", 0, &chunk(&[7, 7])))
            .await
            .unwrap();
        let mut manager = manager(store.clone());

        let err = manager.on_chunk("slot", &chunk(&[1])).await.unwrap_err();
        match err {
            AutosaveError::StorageWriteFailed { seq, attempts, .. } => {
                assert_eq!(seq, 0);
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        let replay = manager.load_autosave("slot").await.unwrap().unwrap();
        assert_eq!(replay.data(), &[7, 7]);
        assert_eq!(manager.next_seq("slot"), 0);
    }

    #[tokio::test]
    async fn subscribers_see_saves_and_clears() {
        let mut manager = manager(MemoryStore::default());
        let mut events = manager.subscribe();

        manager.on_chunk("slot", &chunk(&[1, 2])).await.unwrap();
        manager.clear_autosave("slot").await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            AutosaveEvent::ChunkSaved {
                session_id: "slot".to_string(),
                seq: 0,
                bytes: 2
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            AutosaveEvent::Cleared {
                session_id: "slot".to_string(),
                removed: 1
            }
        );
    }

    #[tokio::test]
    async fn list_reports_each_session() {
        let mut manager = manager(MemoryStore::default());
        manager.on_chunk("a", &chunk(&[1, 2, 3])).await.unwrap();
        manager.on_chunk("a", &chunk(&[4])).await.unwrap();
        manager.on_chunk("b", &chunk(&[5])).await.unwrap();

        let mut list = manager.list_autosaves().await.unwrap();
        list.sort_by(|x, y| x.session_id.cmp(&y.session_id));
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].chunk_count, 2);
        assert_eq!(list[0].total_bytes, 4);
        assert_eq!(list[1].session_id, "b");
    }

    #[tokio::test]
    async fn pump_persists_until_channel_closes() {
        let store = MemoryStore::default();
        let manager = Arc::new(Mutex::new(manager(store.clone())));
        let (tx, rx) = mpsc::unbounded_channel();

        let pump = tokio::spawn(run_autosave_pump(Arc::clone(&manager), "slot".to_string(), rx));
        for i in 0..3u8 {
            tx.send(chunk(&[i])).unwrap();
        }
        drop(tx);

        let report = pump.await.unwrap();
        assert_eq!(report.persisted, 3);
        assert!(report.error.is_none());
        assert_eq!(store.seqs("slot"), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn pump_stops_persisting_after_a_failed_write() {
        let store = MemoryStore::default();
        let manager = Arc::new(Mutex::new(manager(store.clone())));
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(chunk(&[0])).unwrap();
        let pump = tokio::spawn(run_autosave_pump(Arc::clone(&manager), "slot".to_string(), rx));
        // Let the first chunk land before breaking the store
        while store.seqs("slot").is_empty() {
            tokio::task::yield_now().await;
        }
        store.fail_next(3);
        tx.send(chunk(&[1])).unwrap();
        tx.send(chunk(&[2])).unwrap();
        drop(tx);

        let report = pump.await.unwrap();
        assert_eq!(report.persisted, 1);
        assert_eq!(report.skipped, 1);
        assert!(matches!(
            report.error,
            Some(AutosaveError::StorageWriteFailed { seq: 1, .. })
        ));
        assert_eq!(store.seqs("slot"), vec![0]);
    }
}
