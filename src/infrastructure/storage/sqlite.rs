//! SQLite chunk store adapter

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::debug;

use crate::application::ports::{ChunkStore, StoreError};
use crate::domain::autosave::{AutosaveSummary, ChunkRecord};
use crate::infrastructure::config::data_dir;

const SCHEMA: &str = r#"
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;
    CREATE TABLE IF NOT EXISTS chunks (
      session_id TEXT NOT NULL,
      seq INTEGER NOT NULL,
      blob BLOB NOT NULL,
      content_type TEXT NOT NULL,
      created_at TEXT NOT NULL,
      PRIMARY KEY (session_id, seq)
    );
"#;

const INSERT: &str = "INSERT INTO chunks (session_id, seq, blob, content_type, created_at) VALUES (?1, ?2, ?3, ?4, ?5)";

const SELECT_BLOB: &str = "SELECT blob FROM chunks WHERE session_id = ?1 AND seq = ?2";

/// Chunk store backed by a SQLite file.
///
/// A connection is opened per call on the blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteChunkStore {
    db_path: PathBuf,
}

impl SqliteChunkStore {
    /// Open (and create if needed) the database at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let db_path = path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Open(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path).map_err(|e| StoreError::Open(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Open(e.to_string()))?;

        debug!(path = %db_path.display(), "chunk store opened");
        Ok(Self { db_path })
    }

    /// Default database location under the user data directory
    pub fn default_path() -> PathBuf {
        data_dir().join("autosave.sqlite")
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Run `op` on a fresh connection in the blocking pool
    async fn with_connection<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn =
                Connection::open(&db_path).map_err(|e| StoreError::Open(e.to_string()))?;
            op(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Open(format!("Task join error: {}", e)))?
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Read(format!("Bad timestamp '{}': {}", value, e)))
}

fn seq_to_sql(seq: u64) -> Result<i64, StoreError> {
    i64::try_from(seq).map_err(|_| StoreError::Write(format!("Sequence {} out of range", seq)))
}

/// Insert one chunk. Stored chunks are never overwritten: an existing key is
/// accepted only when it already holds the same bytes.
fn insert_chunk(conn: &Connection, record: &ChunkRecord) -> Result<(), StoreError> {
    let seq = seq_to_sql(record.seq)?;
    let inserted = conn
        .prepare_cached(INSERT)
        .and_then(|mut stmt| {
            stmt.execute(params![
                record.session_id,
                seq,
                record.blob,
                record.content_type,
                timestamp(&record.created_at)
            ])
        });

    match inserted {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            let stored: Option<Vec<u8>> = conn
                .query_row(SELECT_BLOB, params![record.session_id, seq], |row| row.get(0))
                .optional()
                .map_err(|e| StoreError::Write(e.to_string()))?;
            if stored.as_deref() == Some(record.blob.as_slice()) {
                debug!(session_id = %record.session_id, seq = record.seq, "chunk already stored");
                Ok(())
            } else {
                Err(StoreError::Conflict {
                    session_id: record.session_id.clone(),
                    seq: record.seq,
                })
            }
        }
        Err(e) => Err(StoreError::Write(e.to_string())),
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn put(&self, record: ChunkRecord) -> Result<(), StoreError> {
        self.with_connection(move |conn| insert_chunk(conn, &record)).await
    }

    async fn bulk_put(&self, records: Vec<ChunkRecord>) -> Result<(), StoreError> {
        self.with_connection(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StoreError::Write(e.to_string()))?;
            for record in &records {
                insert_chunk(&tx, record)?;
            }
            tx.commit().map_err(|e| StoreError::Write(e.to_string()))
        })
        .await
    }

    async fn query(&self, session_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        let session_id = session_id.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, seq, blob, content_type, created_at FROM chunks WHERE session_id = ?1",
                )
                .map_err(|e| StoreError::Read(e.to_string()))?;
            let rows = stmt
                .query_map(params![session_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .map_err(|e| StoreError::Read(e.to_string()))?;

            let mut records = Vec::new();
            for row in rows {
                let (session_id, seq, blob, content_type, created_at) =
                    row.map_err(|e| StoreError::Read(e.to_string()))?;
                records.push(ChunkRecord {
                    session_id,
                    seq: u64::try_from(seq)
                        .map_err(|_| StoreError::Read(format!("Negative sequence {}", seq)))?,
                    blob,
                    content_type,
                    created_at: parse_timestamp(&created_at)?,
                });
            }
            Ok(records)
        })
        .await
    }

    async fn delete_where(&self, session_id: &str) -> Result<u64, StoreError> {
        let session_id = session_id.to_string();
        self.with_connection(move |conn| {
            let removed = conn
                .execute("DELETE FROM chunks WHERE session_id = ?1", params![session_id])
                .map_err(|e| StoreError::Delete(e.to_string()))?;
            Ok(removed as u64)
        })
        .await
    }

    async fn sessions(&self) -> Result<Vec<AutosaveSummary>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, COUNT(*), SUM(LENGTH(blob)), MIN(created_at), MAX(created_at) \
                     FROM chunks GROUP BY session_id ORDER BY session_id",
                )
                .map_err(|e| StoreError::Read(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .map_err(|e| StoreError::Read(e.to_string()))?;

            let mut summaries = Vec::new();
            for row in rows {
                let (session_id, count, bytes, first, last) =
                    row.map_err(|e| StoreError::Read(e.to_string()))?;
                summaries.push(AutosaveSummary {
                    session_id,
                    chunk_count: count.max(0) as u64,
                    total_bytes: bytes.max(0) as u64,
                    first_created_at: parse_timestamp(&first)?,
                    last_created_at: parse_timestamp(&last)?,
                });
            }
            Ok(summaries)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recording::{AudioData, AudioFormat};

    fn record(session_id: &str, seq: u64, bytes: &[u8]) -> ChunkRecord {
        ChunkRecord::new(session_id, seq, &AudioData::new(bytes.to_vec(), AudioFormat::Webm))
    }

    #[test]
    fn default_path_is_under_data_dir() {
        let path = SqliteChunkStore::default_path();
        assert!(path.to_string_lossy().contains("autorec"));
        assert!(path.to_string_lossy().ends_with("autosave.sqlite"));
    }

    #[test]
    fn timestamps_round_trip() {
        let now = Utc::now();
        let parsed = parse_timestamp(&timestamp(&now)).unwrap();
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }

    #[tokio::test]
    async fn put_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteChunkStore::open(dir.path().join("chunks.sqlite")).unwrap();

        store.put(record("a", 0, b"xy")).await.unwrap();
        store.put(record("a", 1, b"z")).await.unwrap();
        store.put(record("b", 0, b"other")).await.unwrap();

        let mut records = store.query("a").await.unwrap();
        records.sort_by_key(|r| r.seq);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].blob, b"xy");
        assert_eq!(records[1].content_type, "audio/webm");
    }

    #[tokio::test]
    async fn put_keeps_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteChunkStore::open(dir.path().join("chunks.sqlite")).unwrap();

        store.put(record("a", 0, b"old")).await.unwrap();
        let err = store.put(record("a", 0, b"new")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { ref session_id, seq: 0 } if session_id == "a"));

        let records = store.query("a").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].blob, b"old");
    }

    #[tokio::test]
    async fn identical_retry_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteChunkStore::open(dir.path().join("chunks.sqlite")).unwrap();

        store.put(record("a", 0, b"same")).await.unwrap();
        store.put(record("a", 0, b"same")).await.unwrap();
        store
            .bulk_put(vec![record("a", 0, b"same"), record("a", 1, b"next")])
            .await
            .unwrap();

        let mut records = store.query("a").await.unwrap();
        records.sort_by_key(|r| r.seq);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].blob, b"same");
        assert_eq!(records[1].blob, b"next");
    }

    #[tokio::test]
    async fn bulk_put_conflict_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteChunkStore::open(dir.path().join("chunks.sqlite")).unwrap();

        store.put(record("a", 1, b"first")).await.unwrap();
        let err = store
            .bulk_put(vec![record("a", 0, b"fresh"), record("a", 1, b"other")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { seq: 1, .. }));

        let records = store.query("a").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].blob, b"first");
    }

    #[tokio::test]
    async fn bulk_put_delete_and_summaries() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteChunkStore::open(dir.path().join("nested/chunks.sqlite")).unwrap();

        store
            .bulk_put(vec![record("a", 0, b"12"), record("a", 1, b"345"), record("b", 0, b"6")])
            .await
            .unwrap();

        let summaries = store.sessions().await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].session_id, "a");
        assert_eq!(summaries[0].chunk_count, 2);
        assert_eq!(summaries[0].total_bytes, 5);

        assert_eq!(store.delete_where("a").await.unwrap(), 2);
        assert_eq!(store.delete_where("a").await.unwrap(), 0);
        assert!(store.query("a").await.unwrap().is_empty());
        assert_eq!(store.sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.sqlite");
        {
            let store = SqliteChunkStore::open(&path).unwrap();
            store.put(record("crash", 0, b"kept")).await.unwrap();
        }

        let store = SqliteChunkStore::open(&path).unwrap();
        assert_eq!(store.query("crash").await.unwrap()[0].blob, b"kept");
    }
}
