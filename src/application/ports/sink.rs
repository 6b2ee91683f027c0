//! Recording sink port interface

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::recording::AudioData;

/// Save errors
#[derive(Debug, Clone, Error)]
pub enum SaveError {
    #[error("Failed to create output directory: {0}")]
    CreateDir(String),

    #[error("Failed to write recording: {0}")]
    Write(String),
}

/// Port for handing a finished recording to the user
#[async_trait]
pub trait RecordingSink: Send + Sync {
    /// Save `audio` under `file_name`, returning where it ended up
    async fn save(&self, audio: &AudioData, file_name: &str) -> Result<PathBuf, SaveError>;
}
