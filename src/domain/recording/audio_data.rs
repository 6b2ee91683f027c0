//! Audio data value object

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::FormatParseError;

/// Container formats the recorder can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Webm,
}

impl AudioFormat {
    /// Every supported format, in display order
    pub const ALL: [AudioFormat; 2] = [AudioFormat::Wav, AudioFormat::Webm];

    /// Get the MIME type string
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Webm => "audio/webm",
        }
    }

    /// Get the file extension
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Webm => "webm",
        }
    }

    /// Resolve a stored MIME type back to a format
    pub fn from_mime(mime: &str) -> Option<Self> {
        let base = mime.split(';').next().unwrap_or(mime).trim();
        match base {
            "audio/wav" | "audio/x-wav" | "audio/wave" => Some(Self::Wav),
            "audio/webm" => Some(Self::Webm),
            _ => None,
        }
    }

    /// File name used when saving a recording of this format
    pub fn file_name(&self) -> String {
        format!("audio.{}", self.extension())
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wav" | "audio/wav" => Ok(Self::Wav),
            "webm" | "audio/webm" => Ok(Self::Webm),
            _ => Err(FormatParseError {
                input: s.to_string(),
            }),
        }
    }
}

/// Value object holding encoded audio bytes and their container format.
///
/// Used both for individual chunks and for a whole recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioData {
    data: Vec<u8>,
    format: AudioFormat,
}

impl AudioData {
    /// Create AudioData from raw bytes
    pub fn new(data: Vec<u8>, format: AudioFormat) -> Self {
        Self { data, format }
    }

    /// Concatenate parts in order. The result inherits the format of the first part.
    pub fn concat<'a, I>(parts: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a AudioData>,
    {
        let mut parts = parts.into_iter();
        let first = parts.next()?;
        let mut data = first.data.clone();
        for part in parts {
            data.extend_from_slice(&part.data);
        }
        Some(Self::new(data, first.format))
    }

    /// Get the raw audio data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume and return the raw audio data
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Get the container format
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Get the MIME type
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Get the size in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get human-readable size
    pub fn human_readable_size(&self) -> String {
        human_readable_bytes(self.size_bytes() as u64)
    }
}

/// Render a byte count as B / KB / MB
pub fn human_readable_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
