//! Recording infrastructure module
//!
//! Provides cross-platform audio capture using cpal. Captured PCM is encoded
//! into WAV or WebM chunks by the encoders in [`crate::infrastructure::encoding`].

mod cpal_recorder;

pub use cpal_recorder::{CpalBackend, CpalEngine, DEFAULT_DEVICE_ID, PREFERRED_SAMPLE_RATE};

/// Create the audio backend for the current platform
pub fn create_backend() -> CpalBackend {
    CpalBackend::new()
}
