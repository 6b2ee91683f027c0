//! Application layer - Use cases and port interfaces
//!
//! Contains the recording session controller, the autosave manager and the
//! trait definitions for external system interactions.

pub mod autosave;
pub mod controller;
pub mod ports;

// Re-export use cases
pub use autosave::{
    run_autosave_pump, AutosaveError, AutosaveEvent, AutosaveManager, PumpReport, RETRY_BACKOFF,
};
pub use controller::{ControllerConfig, SessionController, SessionError, SessionSnapshot};
