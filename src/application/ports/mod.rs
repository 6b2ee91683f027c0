//! Port interfaces (traits) for external systems
//!
//! These traits define the boundaries between the application
//! and infrastructure layers.

pub mod chunk_store;
pub mod config;
pub mod recorder;
pub mod sink;

// Re-export common types
pub use chunk_store::{ChunkStore, StoreError};
pub use config::ConfigStore;
pub use recorder::{
    AudioBackend, ChunkReceiver, ChunkSender, DeviceError, EngineOptions, InputDevice,
    RecordingEngine, RecordingError,
};
pub use sink::{RecordingSink, SaveError};
