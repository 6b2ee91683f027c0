//! Autosave chunk records

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::recording::{AudioData, AudioFormat};

/// One persisted slice of a recording.
///
/// Keyed by `(session_id, seq)`; never mutated after it is written.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub session_id: String,
    pub seq: u64,
    pub blob: Vec<u8>,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

impl ChunkRecord {
    pub fn new(session_id: impl Into<String>, seq: u64, audio: &AudioData) -> Self {
        Self {
            session_id: session_id.into(),
            seq,
            blob: audio.data().to_vec(),
            content_type: audio.mime_type().to_string(),
            created_at: Utc::now(),
        }
    }

    /// Container format of the payload, when the stored content type is known
    pub fn format(&self) -> Option<AudioFormat> {
        AudioFormat::from_mime(&self.content_type)
    }
}

/// Overview of one autosave slot in the chunk store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutosaveSummary {
    pub session_id: String,
    pub chunk_count: u64,
    pub total_bytes: u64,
    pub first_created_at: DateTime<Utc>,
    pub last_created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_copies_payload_and_content_type() {
        let audio = AudioData::new(vec![9, 8, 7], AudioFormat::Webm);
        let record = ChunkRecord::new("slot", 4, &audio);
        assert_eq!(record.session_id, "slot");
        assert_eq!(record.seq, 4);
        assert_eq!(record.blob, vec![9, 8, 7]);
        assert_eq!(record.content_type, "audio/webm");
        assert_eq!(record.format(), Some(AudioFormat::Webm));
    }

    #[test]
    fn unknown_content_type_has_no_format() {
        let mut record = ChunkRecord::new("slot", 0, &AudioData::new(vec![], AudioFormat::Wav));
        record.content_type = "application/octet-stream".to_string();
        assert!(record.format().is_none());
    }
}
