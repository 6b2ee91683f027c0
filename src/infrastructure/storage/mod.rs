//! Autosave storage adapters

mod sqlite;

pub use sqlite::SqliteChunkStore;
