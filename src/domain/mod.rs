//! Domain layer - Core business logic
//!
//! Contains value objects, entities, and domain errors.
//! This layer has no dependencies on external systems.

pub mod autosave;
pub mod config;
pub mod error;
pub mod recording;
pub mod session;

// Re-export common types
pub use autosave::{AutosaveSummary, ChunkRecord};
pub use config::AppConfig;
pub use error::*;
pub use recording::{AudioData, AudioFormat, Duration, ElapsedTime};
pub use session::{InvalidStateTransition, RecordingSession, SessionStatus};
