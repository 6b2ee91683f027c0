//! Recording port interfaces

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::recording::{AudioData, AudioFormat, Duration};

/// Device access errors
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("No audio input device available")]
    NoDevice,

    #[error("Audio device unavailable: {0}")]
    Unavailable(String),
}

/// Recording engine errors
#[derive(Debug, Clone, Error)]
pub enum RecordingError {
    #[error("Failed to start recording: {0}")]
    StartFailed(String),

    #[error("Recording failed: {0}")]
    RecordingFailed(String),

    #[error("Failed to encode audio: {0}")]
    EncodingFailed(String),

    #[error("No recording in progress")]
    NotRecording,
}

/// An audio input device as presented to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputDevice {
    /// Stable id used to reopen the device
    pub id: String,
    /// Human-readable label
    pub label: String,
    pub is_default: bool,
}

/// Channel the engine emits encoded chunks on
pub type ChunkSender = mpsc::UnboundedSender<AudioData>;

/// Receiving half of [`ChunkSender`]
pub type ChunkReceiver = mpsc::UnboundedReceiver<AudioData>;

/// Options for constructing a recording engine
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub format: AudioFormat,
    /// How often a chunk is emitted while recording
    pub chunk_interval: Duration,
    pub chunk_tx: ChunkSender,
}

/// Port for one live recording bound to an open input stream.
///
/// Chunks are emitted on the `chunk_tx` channel given at construction: one per
/// interval while recording and a final one on stop. The concatenation of all
/// emitted chunks equals the object returned by [`RecordingEngine::stop`].
#[async_trait]
pub trait RecordingEngine: Send {
    /// Begin capturing audio
    async fn start(&mut self) -> Result<(), RecordingError>;

    /// Stop capturing, flush the last chunk and return the whole recording
    async fn stop(&mut self) -> Result<AudioData, RecordingError>;

    /// Chunks emitted so far, in order
    fn internal_chunks(&self) -> Vec<AudioData>;

    /// Release the stream and every buffer. Safe to call more than once.
    async fn destroy(&mut self);
}

/// Port for the host audio system
#[async_trait]
pub trait AudioBackend: Send + Sync {
    type Engine: RecordingEngine + 'static;

    /// Ask the host for microphone access
    async fn request_access(&self) -> Result<(), DeviceError>;

    /// Enumerate audio input devices
    async fn input_devices(&self) -> Result<Vec<InputDevice>, DeviceError>;

    /// Open a capture stream on `device_id` and build an engine around it
    async fn open(
        &self,
        device_id: &str,
        options: EngineOptions,
    ) -> Result<Self::Engine, DeviceError>;

    /// Turn a finished or replayed recording into a seekable, playable file
    fn make_seekable(&self, audio: AudioData) -> Result<AudioData, RecordingError> {
        Ok(audio)
    }
}
