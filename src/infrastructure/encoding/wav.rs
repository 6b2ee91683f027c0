//! Streaming WAV (RIFF, 16-bit PCM) encoder
//!
//! The streamed header declares zero-length RIFF and data chunks; the
//! sample bytes that follow are still read back by scanning for the data
//! chunk. Finalizing rewrites the header with real sizes.

use std::io::Cursor;

use super::{ChunkEncoder, EncodingError, PcmSpec, BITS_PER_SAMPLE};
use crate::domain::recording::AudioFormat;

/// RIFF header plus the `WAVE` form type
const RIFF_PREAMBLE_LEN: usize = 12;

/// Chunk id and size fields
const CHUNK_HEADER_LEN: usize = 8;

/// Streaming WAV encoder
pub struct WavChunkEncoder {
    spec: PcmSpec,
    header_written: bool,
}

impl WavChunkEncoder {
    pub fn new(spec: PcmSpec) -> Self {
        Self {
            spec,
            header_written: false,
        }
    }
}

impl ChunkEncoder for WavChunkEncoder {
    fn encode_chunk(&mut self, samples: &[i16]) -> Result<Vec<u8>, EncodingError> {
        let mut out = Vec::with_capacity(samples.len() * 2 + 44);
        if !self.header_written {
            out.extend(streaming_header(self.spec)?);
            self.header_written = true;
        }
        for sample in samples {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(out)
    }
}

fn wav_spec(spec: PcmSpec) -> hound::WavSpec {
    hound::WavSpec {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Header of a WAV file with no samples yet
fn streaming_header(spec: PcmSpec) -> Result<Vec<u8>, EncodingError> {
    let mut cursor = Cursor::new(Vec::new());
    let writer = hound::WavWriter::new(&mut cursor, wav_spec(spec))
        .map_err(|e| EncodingError::Header(e.to_string()))?;
    writer
        .finalize()
        .map_err(|e| EncodingError::Header(e.to_string()))?;
    Ok(cursor.into_inner())
}

fn malformed(reason: impl Into<String>) -> EncodingError {
    EncodingError::Malformed {
        format: AudioFormat::Wav,
        reason: reason.into(),
    }
}

/// Offset of the first sample byte
fn data_offset(data: &[u8]) -> Result<usize, EncodingError> {
    if data.len() < RIFF_PREAMBLE_LEN || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(malformed("missing RIFF/WAVE preamble"));
    }

    let mut pos = RIFF_PREAMBLE_LEN;
    while pos + CHUNK_HEADER_LEN <= data.len() {
        let id = &data[pos..pos + 4];
        let size = u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]])
            as usize;
        if id == b"data" {
            return Ok(pos + CHUNK_HEADER_LEN);
        }
        // Chunks are word aligned
        pos += CHUNK_HEADER_LEN + size + (size & 1);
    }

    Err(malformed("no data chunk"))
}

/// Rewrite `data` with a header that matches the sample bytes present
pub(super) fn finalize(data: &[u8]) -> Result<Vec<u8>, EncodingError> {
    let offset = data_offset(data)?;
    let spec = hound::WavReader::new(Cursor::new(data))
        .map_err(|e| malformed(e.to_string()))?
        .spec();
    if spec.bits_per_sample != BITS_PER_SAMPLE || spec.sample_format != hound::SampleFormat::Int {
        return Err(malformed(format!(
            "unsupported sample layout: {} bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    // A trailing partial frame cannot be played back
    let frame_bytes = spec.channels as usize * 2;
    let payload = &data[offset..];
    let payload = &payload[..payload.len() - payload.len() % frame_bytes];

    let mut cursor = Cursor::new(Vec::with_capacity(offset + payload.len()));
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| EncodingError::Header(e.to_string()))?;
        for bytes in payload.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([bytes[0], bytes[1]]))
                .map_err(|e| EncodingError::Encode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| EncodingError::Encode(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_samples(data: &[u8]) -> (hound::WavSpec, Vec<i16>) {
        let mut reader = hound::WavReader::new(Cursor::new(data)).unwrap();
        let samples = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        (reader.spec(), samples)
    }

    #[test]
    fn header_only_in_first_chunk() {
        let mut encoder = WavChunkEncoder::new(PcmSpec::mono(16000));
        let first = encoder.encode_chunk(&[1, 2]).unwrap();
        let second = encoder.encode_chunk(&[3, 4]).unwrap();

        assert_eq!(&first[0..4], b"RIFF");
        assert_eq!(first.len(), data_offset(&first).unwrap() + 4);
        assert_eq!(second, vec![3, 0, 4, 0]);
    }

    #[test]
    fn first_chunk_without_samples_is_header() {
        let mut encoder = WavChunkEncoder::new(PcmSpec::mono(16000));
        let header = encoder.encode_chunk(&[]).unwrap();
        assert!(!header.is_empty());
        assert!(encoder.encode_chunk(&[]).unwrap().is_empty());
    }

    #[test]
    fn finalize_recovers_every_sample() {
        let mut encoder = WavChunkEncoder::new(PcmSpec::mono(22050));
        let mut stream = encoder.encode_chunk(&[100, -100]).unwrap();
        stream.extend(encoder.encode_chunk(&[i16::MAX, i16::MIN, 0]).unwrap());

        let fixed = finalize(&stream).unwrap();
        let (spec, samples) = read_samples(&fixed);
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.channels, 1);
        assert_eq!(samples, vec![100, -100, i16::MAX, i16::MIN, 0]);
    }

    #[test]
    fn finalize_drops_partial_frame() {
        let mut encoder = WavChunkEncoder::new(PcmSpec {
            sample_rate: 8000,
            channels: 2,
        });
        let mut stream = encoder.encode_chunk(&[1, 2, 3, 4]).unwrap();
        stream.extend_from_slice(&[5, 0]);

        let (_, samples) = read_samples(&finalize(&stream).unwrap());
        assert_eq!(samples, vec![1, 2, 3, 4]);
    }

    #[test]
    fn data_offset_requires_riff() {
        assert!(data_offset(b"RIFX\0\0\0\0WAVE").is_err());
        assert!(data_offset(b"short").is_err());
    }
}
