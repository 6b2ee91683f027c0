//! Streaming WebM (Matroska/EBML) muxer for 16-bit PCM
//!
//! Stream layout:
//!
//! ```text
//! EBML header
//! Segment (unknown size)
//!   Void      reserved for the SeekHead
//!   Info      Duration = 0
//!   Tracks    one A_PCM/INT/LIT audio track
//!   Cluster*  one per chunk: Timecode + SimpleBlock
//! ```
//!
//! Finalizing gives the Segment a real size, sets Info/Duration, writes the
//! SeekHead into the reserved space and appends Cues pointing at every
//! cluster.

use super::{ChunkEncoder, EncodingError, PcmSpec, BITS_PER_SAMPLE};
use crate::domain::recording::AudioFormat;

const EBML_HEADER: u32 = 0x1A45_DFA3;
const EBML_VERSION: u32 = 0x4286;
const EBML_READ_VERSION: u32 = 0x42F7;
const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
const DOC_TYPE: u32 = 0x4282;
const DOC_TYPE_VERSION: u32 = 0x4287;
const DOC_TYPE_READ_VERSION: u32 = 0x4285;

const SEGMENT: u32 = 0x1853_8067;
const SEEK_HEAD: u32 = 0x114D_9B74;
const SEEK: u32 = 0x4DBB;
const SEEK_ID: u32 = 0x53AB;
const SEEK_POSITION: u32 = 0x53AC;

const INFO: u32 = 0x1549_A966;
const TIMECODE_SCALE: u32 = 0x2A_D7B1;
const DURATION: u32 = 0x4489;
const MUXING_APP: u32 = 0x4D80;
const WRITING_APP: u32 = 0x5741;

const TRACKS: u32 = 0x1654_AE6B;
const TRACK_ENTRY: u32 = 0xAE;
const TRACK_NUMBER: u32 = 0xD7;
const TRACK_UID: u32 = 0x73C5;
const TRACK_TYPE: u32 = 0x83;
const CODEC_ID: u32 = 0x86;
const AUDIO: u32 = 0xE1;
const SAMPLING_FREQUENCY: u32 = 0xB5;
const CHANNELS: u32 = 0x9F;
const BIT_DEPTH: u32 = 0x6264;

const CLUSTER: u32 = 0x1F43_B675;
const TIMECODE: u32 = 0xE7;
const SIMPLE_BLOCK: u32 = 0xA3;

const CUES: u32 = 0x1C53_BB6B;
const CUE_POINT: u32 = 0xBB;
const CUE_TIME: u32 = 0xB3;
const CUE_TRACK_POSITIONS: u32 = 0xB7;
const CUE_TRACK: u32 = 0xF7;
const CUE_CLUSTER_POSITION: u32 = 0xF1;

const VOID: u32 = 0xEC;

/// Timestamps are in milliseconds
const TIMECODE_SCALE_NS: u64 = 1_000_000;

const TRACK_TYPE_AUDIO: u64 = 2;
const AUDIO_TRACK: u64 = 1;
const CODEC_PCM: &str = "A_PCM/INT/LIT";
const MUXER: &str = concat!("autorec ", env!("CARGO_PKG_VERSION"));

/// Bytes kept free at the start of the Segment for the SeekHead
const SEEK_RESERVED: usize = 96;

/// SimpleBlock flag: every PCM block is a keyframe
const KEYFRAME: u8 = 0x80;

/// Size field meaning "extends to the end of the file"
const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

/// Streaming WebM encoder
pub struct WebmChunkEncoder {
    spec: PcmSpec,
    header_written: bool,
    frames_written: u64,
}

impl WebmChunkEncoder {
    pub fn new(spec: PcmSpec) -> Self {
        Self {
            spec,
            header_written: false,
            frames_written: 0,
        }
    }

    fn header(&self) -> Vec<u8> {
        let mut ebml = Vec::new();
        write_uint(&mut ebml, EBML_VERSION, 1);
        write_uint(&mut ebml, EBML_READ_VERSION, 1);
        write_uint(&mut ebml, EBML_MAX_ID_LENGTH, 4);
        write_uint(&mut ebml, EBML_MAX_SIZE_LENGTH, 8);
        write_str(&mut ebml, DOC_TYPE, "webm");
        write_uint(&mut ebml, DOC_TYPE_VERSION, 4);
        write_uint(&mut ebml, DOC_TYPE_READ_VERSION, 2);

        let mut out = Vec::new();
        write_element(&mut out, EBML_HEADER, &ebml);
        write_id(&mut out, SEGMENT);
        out.extend_from_slice(&UNKNOWN_SIZE);
        write_void(&mut out, SEEK_RESERVED);
        out.extend(info_element(&[], 0.0));
        out.extend(self.tracks_element());
        out
    }

    fn tracks_element(&self) -> Vec<u8> {
        let mut audio = Vec::new();
        write_float(&mut audio, SAMPLING_FREQUENCY, f64::from(self.spec.sample_rate));
        write_uint(&mut audio, CHANNELS, u64::from(self.spec.channels));
        write_uint(&mut audio, BIT_DEPTH, u64::from(BITS_PER_SAMPLE));

        let mut entry = Vec::new();
        write_uint(&mut entry, TRACK_NUMBER, AUDIO_TRACK);
        write_uint(&mut entry, TRACK_UID, AUDIO_TRACK);
        write_uint(&mut entry, TRACK_TYPE, TRACK_TYPE_AUDIO);
        write_str(&mut entry, CODEC_ID, CODEC_PCM);
        write_element(&mut entry, AUDIO, &audio);

        let mut tracks = Vec::new();
        write_element(&mut tracks, TRACK_ENTRY, &entry);

        let mut out = Vec::new();
        write_element(&mut out, TRACKS, &tracks);
        out
    }

    fn cluster(&self, samples: &[i16]) -> Vec<u8> {
        let timecode = self.frames_written * 1000 / u64::from(self.spec.sample_rate.max(1));

        let mut block = Vec::with_capacity(4 + samples.len() * 2);
        block.push(0x80 | AUDIO_TRACK as u8);
        block.extend_from_slice(&0i16.to_be_bytes());
        block.push(KEYFRAME);
        for sample in samples {
            block.extend_from_slice(&sample.to_le_bytes());
        }

        let mut cluster = Vec::with_capacity(block.len() + 16);
        write_uint(&mut cluster, TIMECODE, timecode);
        write_element(&mut cluster, SIMPLE_BLOCK, &block);

        let mut out = Vec::with_capacity(cluster.len() + 12);
        write_element(&mut out, CLUSTER, &cluster);
        out
    }
}

impl ChunkEncoder for WebmChunkEncoder {
    fn encode_chunk(&mut self, samples: &[i16]) -> Result<Vec<u8>, EncodingError> {
        let mut out = Vec::new();
        if !self.header_written {
            out.extend(self.header());
            self.header_written = true;
        }
        if !samples.is_empty() {
            out.extend(self.cluster(samples));
            self.frames_written += (samples.len() / usize::from(self.spec.channels.max(1))) as u64;
        }
        Ok(out)
    }
}

// --- writing -------------------------------------------------------------

fn write_id(out: &mut Vec<u8>, id: u32) {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(3);
    out.extend_from_slice(&bytes[skip..]);
}

fn write_size(out: &mut Vec<u8>, size: u64) {
    let mut len = 1;
    // All-ones is reserved for "unknown"
    while len < 8 && size >= (1u64 << (7 * len)) - 1 {
        len += 1;
    }
    let marked = size | (1u64 << (7 * len));
    out.extend_from_slice(&marked.to_be_bytes()[8 - len..]);
}

fn write_element(out: &mut Vec<u8>, id: u32, payload: &[u8]) {
    write_id(out, id);
    write_size(out, payload.len() as u64);
    out.extend_from_slice(payload);
}

fn write_uint(out: &mut Vec<u8>, id: u32, value: u64) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    write_element(out, id, &bytes[skip..]);
}

fn write_float(out: &mut Vec<u8>, id: u32, value: f64) {
    write_element(out, id, &value.to_be_bytes());
}

fn write_str(out: &mut Vec<u8>, id: u32, value: &str) {
    write_element(out, id, value.as_bytes());
}

/// Void element occupying exactly `total_len` bytes (2..=128)
fn write_void(out: &mut Vec<u8>, total_len: usize) {
    debug_assert!((2..=128).contains(&total_len));
    write_id(out, VOID);
    write_size(out, (total_len - 2) as u64);
    out.resize(out.len() + total_len - 2, 0);
}

fn info_element(kept: &[u8], duration: f64) -> Vec<u8> {
    let mut info = Vec::new();
    if kept.is_empty() {
        write_uint(&mut info, TIMECODE_SCALE, TIMECODE_SCALE_NS);
        write_str(&mut info, MUXING_APP, MUXER);
        write_str(&mut info, WRITING_APP, MUXER);
    } else {
        info.extend_from_slice(kept);
    }
    write_float(&mut info, DURATION, duration);

    let mut out = Vec::new();
    write_element(&mut out, INFO, &info);
    out
}

// --- reading -------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Element {
    id: u32,
    start: usize,
    data_start: usize,
    end: usize,
}

impl Element {
    fn raw<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.end]
    }

    fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.data_start..self.end]
    }
}

fn malformed(reason: impl Into<String>) -> EncodingError {
    EncodingError::Malformed {
        format: AudioFormat::Webm,
        reason: reason.into(),
    }
}

/// Returns `(value, length, is_unknown)`
fn read_vint(data: &[u8], pos: usize) -> Result<(u64, usize, bool), EncodingError> {
    let first = *data.get(pos).ok_or_else(|| malformed("truncated size"))?;
    let len = first.leading_zeros() as usize + 1;
    if len > 8 {
        return Err(malformed("invalid variable-length integer"));
    }
    let bytes = data
        .get(pos..pos + len)
        .ok_or_else(|| malformed("truncated size"))?;

    let mut value = u64::from(first) & ((1u64 << (8 - len)) - 1);
    for &b in &bytes[1..] {
        value = (value << 8) | u64::from(b);
    }
    let unknown = value == (1u64 << (7 * len)) - 1;
    Ok((value, len, unknown))
}

fn read_id(data: &[u8], pos: usize) -> Result<(u32, usize), EncodingError> {
    let first = *data.get(pos).ok_or_else(|| malformed("truncated element id"))?;
    let len = first.leading_zeros() as usize + 1;
    if len > 4 {
        return Err(malformed("invalid element id"));
    }
    let bytes = data
        .get(pos..pos + len)
        .ok_or_else(|| malformed("truncated element id"))?;
    let id = bytes.iter().fold(0u32, |id, &b| (id << 8) | u32::from(b));
    Ok((id, len))
}

/// Read one element starting at `pos`; an unknown size extends to `limit`
fn read_element(data: &[u8], pos: usize, limit: usize) -> Result<Element, EncodingError> {
    let (id, id_len) = read_id(data, pos)?;
    let (size, size_len, unknown) = read_vint(data, pos + id_len)?;
    let data_start = pos + id_len + size_len;
    let end = if unknown {
        limit
    } else {
        usize::try_from(size)
            .ok()
            .and_then(|size| data_start.checked_add(size))
            .ok_or_else(|| malformed("element size overflow"))?
    };
    if end > limit {
        return Err(malformed(format!("element {:#X} overruns its parent", id)));
    }
    Ok(Element {
        id,
        start: pos,
        data_start,
        end,
    })
}

fn children(data: &[u8], parent: &Element) -> Result<Vec<Element>, EncodingError> {
    let mut out = Vec::new();
    let mut pos = parent.data_start;
    while pos < parent.end {
        let child = read_element(data, pos, parent.end)?;
        pos = child.end;
        out.push(child);
    }
    Ok(out)
}

fn read_uint(payload: &[u8]) -> Result<u64, EncodingError> {
    if payload.len() > 8 {
        return Err(malformed("integer wider than 8 bytes"));
    }
    Ok(payload.iter().fold(0u64, |v, &b| (v << 8) | u64::from(b)))
}

fn read_float(payload: &[u8]) -> Result<f64, EncodingError> {
    match payload.len() {
        0 => Ok(0.0),
        4 => Ok(f64::from(f32::from_be_bytes([
            payload[0], payload[1], payload[2], payload[3],
        ]))),
        8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(payload);
            Ok(f64::from_be_bytes(bytes))
        }
        n => Err(malformed(format!("float of {} bytes", n))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AudioTrack {
    sample_rate: f64,
    channels: u64,
    bit_depth: u64,
}

impl AudioTrack {
    fn frame_bytes(&self) -> u64 {
        (self.channels * self.bit_depth / 8).max(1)
    }
}

fn parse_audio_track(data: &[u8], tracks: &Element) -> Result<AudioTrack, EncodingError> {
    for entry in children(data, tracks)? {
        if entry.id != TRACK_ENTRY {
            continue;
        }
        for field in children(data, &entry)? {
            if field.id != AUDIO {
                continue;
            }
            let mut track = AudioTrack {
                sample_rate: 8000.0,
                channels: 1,
                bit_depth: u64::from(BITS_PER_SAMPLE),
            };
            for setting in children(data, &field)? {
                match setting.id {
                    SAMPLING_FREQUENCY => track.sample_rate = read_float(setting.payload(data))?,
                    CHANNELS => track.channels = read_uint(setting.payload(data))?,
                    BIT_DEPTH => track.bit_depth = read_uint(setting.payload(data))?,
                    _ => {}
                }
            }
            if track.sample_rate <= 0.0 {
                return Err(malformed("audio track without a sample rate"));
            }
            return Ok(track);
        }
    }
    Err(malformed("no audio track"))
}

/// Returns `(timecode, sample bytes)` for one cluster
fn parse_cluster(data: &[u8], cluster: &Element) -> Result<(u64, u64), EncodingError> {
    let mut timecode = 0;
    let mut sample_bytes = 0u64;
    for child in children(data, cluster)? {
        match child.id {
            TIMECODE => timecode = read_uint(child.payload(data))?,
            SIMPLE_BLOCK => {
                let (_, track_len, _) = read_vint(data, child.data_start)?;
                let header_len = track_len + 3;
                let len = child.end - child.data_start;
                if len < header_len {
                    return Err(malformed("truncated SimpleBlock"));
                }
                sample_bytes += (len - header_len) as u64;
            }
            _ => {}
        }
    }
    Ok((timecode, sample_bytes))
}

fn seek_entry(out: &mut Vec<u8>, id: u32, position: u64) {
    let mut target = Vec::new();
    write_id(&mut target, id);

    let mut seek = Vec::new();
    write_element(&mut seek, SEEK_ID, &target);
    write_element(&mut seek, SEEK_POSITION, &position.to_be_bytes());
    write_element(out, SEEK, &seek);
}

fn cues_element(points: &[(u64, u64)]) -> Vec<u8> {
    let mut cues = Vec::new();
    for &(time, position) in points {
        let mut positions = Vec::new();
        write_uint(&mut positions, CUE_TRACK, AUDIO_TRACK);
        write_uint(&mut positions, CUE_CLUSTER_POSITION, position);

        let mut point = Vec::new();
        write_uint(&mut point, CUE_TIME, time);
        write_element(&mut point, CUE_TRACK_POSITIONS, &positions);
        write_element(&mut cues, CUE_POINT, &point);
    }

    let mut out = Vec::new();
    write_element(&mut out, CUES, &cues);
    out
}

/// Rebuild a streamed WebM file with complete, seekable metadata
pub(super) fn finalize(data: &[u8]) -> Result<Vec<u8>, EncodingError> {
    let header = read_element(data, 0, data.len())?;
    if header.id != EBML_HEADER {
        return Err(malformed("missing EBML header"));
    }
    let segment = read_element(data, header.end, data.len())?;
    if segment.id != SEGMENT {
        return Err(malformed("missing Segment"));
    }
    let elements = children(data, &segment)?;

    let mut timecode_scale = TIMECODE_SCALE_NS;
    let mut track = None;
    for element in &elements {
        match element.id {
            INFO => {
                for field in children(data, element)? {
                    if field.id == TIMECODE_SCALE {
                        timecode_scale = read_uint(field.payload(data))?.max(1);
                    }
                }
            }
            TRACKS => track = Some(parse_audio_track(data, element)?),
            _ => {}
        }
    }
    let track = track.ok_or_else(|| malformed("missing Tracks"))?;

    let mut clusters = Vec::new();
    for element in elements.iter().filter(|e| e.id == CLUSTER) {
        clusters.push(parse_cluster(data, element)?);
    }
    let ticks_per_second = 1_000_000_000.0 / timecode_scale as f64;
    let duration = clusters
        .iter()
        .map(|&(timecode, bytes)| {
            let frames = (bytes / track.frame_bytes()) as f64;
            timecode as f64 + frames / track.sample_rate * ticks_per_second
        })
        .fold(0.0, f64::max);

    // Positions are relative to the first byte of Segment data
    let mut body = Vec::with_capacity(data.len());
    let mut info_position = None;
    let mut tracks_position = None;
    let mut cue_points = Vec::with_capacity(clusters.len());
    let mut cluster_times = clusters.iter().map(|&(timecode, _)| timecode);

    for element in &elements {
        let position = (SEEK_RESERVED + body.len()) as u64;
        match element.id {
            SEEK_HEAD | VOID | CUES => {}
            INFO => {
                let mut kept = Vec::new();
                for field in children(data, element)? {
                    if field.id != DURATION {
                        kept.extend_from_slice(field.raw(data));
                    }
                }
                info_position = Some(position);
                body.extend(info_element(&kept, duration));
            }
            TRACKS => {
                tracks_position = Some(position);
                body.extend_from_slice(element.raw(data));
            }
            CLUSTER => {
                let time = cluster_times.next().unwrap_or_default();
                cue_points.push((time, position));
                body.extend_from_slice(element.raw(data));
            }
            _ => body.extend_from_slice(element.raw(data)),
        }
    }

    let mut seek_head = Vec::new();
    if let Some(position) = info_position {
        seek_entry(&mut seek_head, INFO, position);
    }
    if let Some(position) = tracks_position {
        seek_entry(&mut seek_head, TRACKS, position);
    }
    if !cue_points.is_empty() {
        seek_entry(&mut seek_head, CUES, (SEEK_RESERVED + body.len()) as u64);
        body.extend(cues_element(&cue_points));
    }

    let mut reserved = Vec::with_capacity(SEEK_RESERVED);
    write_element(&mut reserved, SEEK_HEAD, &seek_head);
    if reserved.len() + 2 > SEEK_RESERVED {
        return Err(EncodingError::Encode("SeekHead does not fit".to_string()));
    }
    let void_len = SEEK_RESERVED - reserved.len();
    write_void(&mut reserved, void_len);

    let segment_size = (reserved.len() + body.len()) as u64;
    let mut out = Vec::with_capacity(header.end + 12 + segment_size as usize);
    out.extend_from_slice(header.raw(data));
    write_id(&mut out, SEGMENT);
    out.extend_from_slice(&((1u64 << 56) | segment_size).to_be_bytes());
    out.extend(reserved);
    out.extend(body);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streamed(spec: PcmSpec, parts: &[&[i16]]) -> (Vec<Vec<u8>>, Vec<u8>) {
        let mut encoder = WebmChunkEncoder::new(spec);
        let chunks: Vec<Vec<u8>> = parts
            .iter()
            .map(|samples| encoder.encode_chunk(samples).unwrap())
            .collect();
        let joined = chunks.concat();
        (chunks, joined)
    }

    fn segment_elements(data: &[u8]) -> (Element, Vec<Element>) {
        let header = read_element(data, 0, data.len()).unwrap();
        let segment = read_element(data, header.end, data.len()).unwrap();
        let elements = children(data, &segment).unwrap();
        (segment, elements)
    }

    fn duration_of(data: &[u8]) -> f64 {
        let (_, elements) = segment_elements(data);
        let info = elements.iter().find(|e| e.id == INFO).unwrap();
        let field = children(data, info)
            .unwrap()
            .into_iter()
            .find(|f| f.id == DURATION)
            .unwrap();
        read_float(field.payload(data)).unwrap()
    }

    #[test]
    fn vint_sizes() {
        let mut out = Vec::new();
        write_size(&mut out, 0);
        write_size(&mut out, 126);
        write_size(&mut out, 127);
        write_size(&mut out, 300);
        assert_eq!(out, vec![0x80, 0xFE, 0x40, 0x7F, 0x41, 0x2C]);

        assert_eq!(read_vint(&[0x40, 0x7F], 0).unwrap(), (127, 2, false));
        assert!(read_vint(&UNKNOWN_SIZE, 0).unwrap().2);
        assert!(read_vint(&[0x00], 0).is_err());
    }

    #[test]
    fn ids_keep_marker_bits() {
        let mut out = Vec::new();
        write_id(&mut out, EBML_HEADER);
        write_id(&mut out, TIMECODE);
        assert_eq!(out, vec![0x1A, 0x45, 0xDF, 0xA3, 0xE7]);
        assert_eq!(read_id(&out, 0).unwrap(), (EBML_HEADER, 4));
        assert_eq!(read_id(&out, 4).unwrap(), (TIMECODE, 1));
    }

    #[test]
    fn header_then_clusters() {
        let (chunks, _) = streamed(PcmSpec::mono(8000), &[&[1, 2], &[3, 4, 5]]);
        assert_eq!(&chunks[0][..4], &[0x1A, 0x45, 0xDF, 0xA3]);
        assert_eq!(read_id(&chunks[1], 0).unwrap().0, CLUSTER);
    }

    #[test]
    fn empty_chunks_after_header_are_empty() {
        let mut encoder = WebmChunkEncoder::new(PcmSpec::mono(8000));
        assert!(!encoder.encode_chunk(&[]).unwrap().is_empty());
        assert!(encoder.encode_chunk(&[]).unwrap().is_empty());
    }

    #[test]
    fn cluster_timecodes_follow_samples() {
        let (_, joined) = streamed(PcmSpec::mono(1000), &[&[0; 500], &[0; 250]]);
        let (_, elements) = segment_elements(&joined);
        let times: Vec<u64> = elements
            .iter()
            .filter(|e| e.id == CLUSTER)
            .map(|c| parse_cluster(&joined, c).unwrap().0)
            .collect();
        assert_eq!(times, vec![0, 500]);
    }

    #[test]
    fn finalize_sets_segment_size_and_duration() {
        let (_, joined) = streamed(PcmSpec::mono(8000), &[&[0; 8000], &[0; 4000]]);
        assert_eq!(duration_of(&joined), 0.0);

        let fixed = finalize(&joined).unwrap();
        let header = read_element(&fixed, 0, fixed.len()).unwrap();
        let (_, size_len, unknown) = read_vint(&fixed, header.end + 4).unwrap();
        assert!(!unknown);
        assert_eq!(size_len, 8);

        let (segment, _) = segment_elements(&fixed);
        assert_eq!(segment.end, fixed.len());
        assert!((duration_of(&fixed) - 1500.0).abs() < 1e-6);
    }

    #[test]
    fn finalize_indexes_every_cluster() {
        let (_, joined) = streamed(PcmSpec::mono(8000), &[&[1; 80], &[2; 80], &[3; 80]]);
        let fixed = finalize(&joined).unwrap();
        let (segment, elements) = segment_elements(&fixed);

        assert_eq!(elements[0].id, SEEK_HEAD);
        let clusters: Vec<u64> = elements
            .iter()
            .filter(|e| e.id == CLUSTER)
            .map(|e| (e.start - segment.data_start) as u64)
            .collect();

        let cues = elements.iter().find(|e| e.id == CUES).unwrap();
        let mut positions = Vec::new();
        for point in children(&fixed, cues).unwrap() {
            for field in children(&fixed, &point).unwrap() {
                if field.id == CUE_TRACK_POSITIONS {
                    for pos in children(&fixed, &field).unwrap() {
                        if pos.id == CUE_CLUSTER_POSITION {
                            positions.push(read_uint(pos.payload(&fixed)).unwrap());
                        }
                    }
                }
            }
        }
        assert_eq!(positions, clusters);
    }

    #[test]
    fn seek_head_points_at_info() {
        let (_, joined) = streamed(PcmSpec::mono(8000), &[&[1; 10]]);
        let fixed = finalize(&joined).unwrap();
        let (segment, elements) = segment_elements(&fixed);
        let info = elements.iter().find(|e| e.id == INFO).unwrap();

        let seek_head = &elements[0];
        let first_seek = children(&fixed, seek_head).unwrap()[0];
        let fields = children(&fixed, &first_seek).unwrap();
        assert_eq!(read_id(fields[0].payload(&fixed), 0).unwrap().0, INFO);
        assert_eq!(
            read_uint(fields[1].payload(&fixed)).unwrap(),
            (info.start - segment.data_start) as u64
        );
    }

    #[test]
    fn header_only_stream_finalizes() {
        let (_, joined) = streamed(PcmSpec::mono(8000), &[&[]]);
        let fixed = finalize(&joined).unwrap();
        assert_eq!(duration_of(&fixed), 0.0);
        let (_, elements) = segment_elements(&fixed);
        assert!(elements.iter().all(|e| e.id != CUES));
    }

    #[test]
    fn track_settings_round_trip() {
        let spec = PcmSpec {
            sample_rate: 44100,
            channels: 2,
        };
        let (_, joined) = streamed(spec, &[&[0; 4]]);
        let (_, elements) = segment_elements(&joined);
        let tracks = elements.iter().find(|e| e.id == TRACKS).unwrap();
        let track = parse_audio_track(&joined, tracks).unwrap();
        assert_eq!(
            track,
            AudioTrack {
                sample_rate: 44100.0,
                channels: 2,
                bit_depth: 16,
            }
        );
    }
}
