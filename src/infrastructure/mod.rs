//! Infrastructure layer - Adapter implementations
//!
//! Contains concrete implementations of the port interfaces, integrating
//! with the host audio system, the filesystem and SQLite.

pub mod config;
pub mod encoding;
pub mod recording;
pub mod sink;
pub mod storage;

// Re-export adapters
pub use config::XdgConfigStore;
pub use recording::{create_backend, CpalBackend, CpalEngine};
pub use sink::FileSink;
pub use storage::SqliteChunkStore;
