//! Streaming audio encoders
//!
//! An encoder turns captured PCM into a byte stream that is emitted in
//! chunks. The first chunk carries the container header and every later
//! chunk carries only sample data, so concatenating the chunks in order
//! always yields one container file. Sizes and durations are unknown while
//! streaming; [`make_seekable`] fills them in afterwards.

mod wav;
mod webm;

pub use wav::WavChunkEncoder;
pub use webm::WebmChunkEncoder;

use crate::application::ports::RecordingError;
use crate::domain::recording::{AudioData, AudioFormat};

/// Bits per PCM sample in every container we write
pub const BITS_PER_SAMPLE: u16 = 16;

/// Layout of the PCM stream fed to an encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmSpec {
    pub const fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }

    /// Bytes per interleaved frame
    pub const fn frame_bytes(&self) -> usize {
        self.channels as usize * (BITS_PER_SAMPLE as usize / 8)
    }
}

/// Encoding errors
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("Failed to write container header: {0}")]
    Header(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Malformed {format} data: {reason}")]
    Malformed { format: AudioFormat, reason: String },
}

impl From<EncodingError> for RecordingError {
    fn from(err: EncodingError) -> Self {
        RecordingError::EncodingFailed(err.to_string())
    }
}

/// Incremental encoder producing concatenable chunks
pub trait ChunkEncoder: Send {
    /// Encode the samples captured since the previous call.
    ///
    /// The first call also emits the container header, even with no samples.
    /// Later calls with no samples return an empty vector.
    fn encode_chunk(&mut self, samples: &[i16]) -> Result<Vec<u8>, EncodingError>;
}

/// Build the streaming encoder for `format`
pub fn encoder_for(format: AudioFormat, spec: PcmSpec) -> Box<dyn ChunkEncoder> {
    match format {
        AudioFormat::Wav => Box::new(WavChunkEncoder::new(spec)),
        AudioFormat::Webm => Box::new(WebmChunkEncoder::new(spec)),
    }
}

/// Rewrite a streamed (or replayed) recording so that its container
/// metadata describes the whole file. Idempotent.
pub fn make_seekable(audio: &AudioData) -> Result<AudioData, EncodingError> {
    let data = match audio.format() {
        AudioFormat::Wav => wav::finalize(audio.data())?,
        AudioFormat::Webm => webm::finalize(audio.data())?,
    };
    Ok(AudioData::new(data, audio.format()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(format: AudioFormat, parts: &[&[i16]]) -> AudioData {
        let mut encoder = encoder_for(format, PcmSpec::mono(8000));
        let chunks: Vec<AudioData> = parts
            .iter()
            .map(|samples| AudioData::new(encoder.encode_chunk(samples).unwrap(), format))
            .filter(|chunk| !chunk.is_empty())
            .collect();
        AudioData::concat(&chunks).unwrap()
    }

    #[test]
    fn frame_bytes_for_mono_and_stereo() {
        assert_eq!(PcmSpec::mono(16000).frame_bytes(), 2);
        let stereo = PcmSpec {
            sample_rate: 44100,
            channels: 2,
        };
        assert_eq!(stereo.frame_bytes(), 4);
    }

    #[test]
    fn make_seekable_keeps_format() {
        for format in AudioFormat::ALL {
            let audio = stream(format, &[&[1, 2, 3], &[4, 5]]);
            let fixed = make_seekable(&audio).unwrap();
            assert_eq!(fixed.format(), format);
        }
    }

    #[test]
    fn make_seekable_is_idempotent() {
        for format in AudioFormat::ALL {
            let audio = stream(format, &[&[10; 400], &[20; 400], &[30; 12]]);
            let once = make_seekable(&audio).unwrap();
            let twice = make_seekable(&once).unwrap();
            assert_eq!(once, twice, "{} output changed on second pass", format);
        }
    }

    #[test]
    fn make_seekable_rejects_garbage() {
        for format in AudioFormat::ALL {
            let audio = AudioData::new(b"definitely not audio".to_vec(), format);
            assert!(matches!(
                make_seekable(&audio),
                Err(EncodingError::Malformed { .. })
            ));
        }
    }

    #[test]
    fn recording_error_from_encoding_error() {
        let err: RecordingError = EncodingError::Encode("boom".into()).into();
        assert!(matches!(err, RecordingError::EncodingFailed(ref m) if m.contains("boom")));
    }
}
