//! Cross-platform audio capture using cpal
//!
//! The input stream lives on a dedicated thread because `cpal::Stream` is not
//! `Send`. Captured samples are mixed down to mono 16-bit PCM and collected in
//! a shared buffer; a tokio task drains the buffer into an encoded chunk every
//! chunk interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration as TokioDuration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::application::ports::{
    AudioBackend, ChunkSender, DeviceError, EngineOptions, InputDevice, RecordingEngine,
    RecordingError,
};
use crate::domain::recording::{AudioData, AudioFormat, Duration};
use crate::infrastructure::encoding::{self, ChunkEncoder, PcmSpec};

/// Device id that selects the host's default input
pub const DEFAULT_DEVICE_ID: &str = "default";

/// Preferred capture rate when the device supports it
pub const PREFERRED_SAMPLE_RATE: u32 = 48_000;

/// How often the capture thread checks whether it should release the stream
const CAPTURE_POLL: std::time::Duration = std::time::Duration::from_millis(50);

/// Audio backend backed by the default cpal host
#[derive(Debug, Default, Clone)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a device id to an input device
    fn find_device(host: &cpal::Host, device_id: &str) -> Result<cpal::Device, DeviceError> {
        if device_id.is_empty() || device_id == DEFAULT_DEVICE_ID {
            return host.default_input_device().ok_or(DeviceError::NoDevice);
        }

        let mut devices = host
            .input_devices()
            .map_err(|e| DeviceError::PermissionDenied(e.to_string()))?;
        devices
            .find(|d| d.name().map(|name| name == device_id).unwrap_or(false))
            .ok_or_else(|| {
                DeviceError::Unavailable(format!("Input device '{}' not found", device_id))
            })
    }

    /// Get a suitable input configuration
    fn get_input_config(device: &cpal::Device) -> Result<(StreamConfig, SampleFormat), DeviceError> {
        let supported_configs = device
            .supported_input_configs()
            .map_err(|e| DeviceError::Unavailable(format!("Failed to get configs: {}", e)))?;

        // Prefer mono, but accept stereo (we'll mix down)
        let mut best_config: Option<cpal::SupportedStreamConfigRange> = None;

        for config in supported_configs {
            // Only consider i16 or f32 formats
            if config.sample_format() != SampleFormat::I16
                && config.sample_format() != SampleFormat::F32
            {
                continue;
            }

            let includes_preferred = config.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
                && config.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE;

            let is_better = match &best_config {
                None => true,
                Some(current) => {
                    let fewer_channels = config.channels() < current.channels();
                    let better_rate = includes_preferred
                        && !(current.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
                            && current.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE);
                    fewer_channels || better_rate
                }
            };
            if is_better {
                best_config = Some(config);
            }
        }

        let config_range = best_config
            .ok_or_else(|| DeviceError::Unavailable("No suitable input config found".into()))?;

        // Use the preferred rate if supported, otherwise the highest available
        let sample_rate = if config_range.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
            && config_range.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
        {
            SampleRate(PREFERRED_SAMPLE_RATE)
        } else {
            config_range.max_sample_rate()
        };

        let sample_format = config_range.sample_format();
        let config = StreamConfig {
            channels: config_range.channels(),
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        Ok((config, sample_format))
    }

    /// Build an input stream that feeds `shared`
    fn build_stream(
        device_id: &str,
        shared: &CaptureShared,
    ) -> Result<(cpal::Stream, PcmSpec), DeviceError> {
        let host = cpal::default_host();
        let device = Self::find_device(&host, device_id)?;
        let (config, sample_format) = Self::get_input_config(&device)?;
        let channels = config.channels;
        let spec = PcmSpec::mono(config.sample_rate.0);

        let stream = match sample_format {
            SampleFormat::I16 => {
                let sink = shared.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        sink.push(&stereo_to_mono(data, channels));
                    },
                    stream_error_callback(Arc::clone(&shared.stream_error)),
                    None,
                )
            }
            SampleFormat::F32 => {
                let sink = shared.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let i16_data: Vec<i16> = data.iter().map(|&s| f32_to_i16(s)).collect();
                        sink.push(&stereo_to_mono(&i16_data, channels));
                    },
                    stream_error_callback(Arc::clone(&shared.stream_error)),
                    None,
                )
            }
            other => {
                return Err(DeviceError::Unavailable(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        }
        .map_err(map_build_error)?;

        debug!(
            device_id,
            sample_rate = spec.sample_rate,
            device_channels = channels,
            "input stream opened"
        );
        Ok((stream, spec))
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> DeviceError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            DeviceError::Unavailable("Input device is no longer available".into())
        }
        other => DeviceError::Unavailable(other.to_string()),
    }
}

fn stream_error_callback(
    slot: Arc<StdMutex<Option<String>>>,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        error!(error = %err, "audio stream error");
        if let Ok(mut last) = slot.lock() {
            *last = Some(err.to_string());
        }
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Mix interleaved frames down to mono
fn stereo_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels as usize)
        .map(|chunk| {
            let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
            (sum / chunk.len() as i32) as i16
        })
        .collect()
}

/// State shared between the capture thread and the engine
#[derive(Clone, Default)]
struct CaptureShared {
    samples: Arc<StdMutex<Vec<i16>>>,
    /// Samples are kept only while capturing
    capturing: Arc<AtomicBool>,
    /// Cleared to make the capture thread release the stream
    alive: Arc<AtomicBool>,
    stream_error: Arc<StdMutex<Option<String>>>,
}

impl CaptureShared {
    fn push(&self, mono: &[i16]) {
        if !self.capturing.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(mut buffer) = self.samples.lock() {
            buffer.extend_from_slice(mono);
        }
    }

    fn take_samples(&self) -> Vec<i16> {
        self.samples
            .lock()
            .map(|mut buffer| std::mem::take(&mut *buffer))
            .unwrap_or_default()
    }
}

/// Drains captured samples into encoded chunks
#[derive(Clone)]
struct ChunkPipeline {
    format: AudioFormat,
    shared: CaptureShared,
    encoder: Arc<StdMutex<Box<dyn ChunkEncoder>>>,
    emitted: Arc<StdMutex<Vec<AudioData>>>,
    chunk_tx: ChunkSender,
}

impl ChunkPipeline {
    /// Encode whatever was captured since the last flush and emit it
    fn flush(&self) -> Result<Option<AudioData>, RecordingError> {
        let pending = self.shared.take_samples();
        let bytes = self
            .encoder
            .lock()
            .map_err(|_| RecordingError::EncodingFailed("encoder lock poisoned".into()))?
            .encode_chunk(&pending)?;
        if bytes.is_empty() {
            return Ok(None);
        }

        let chunk = AudioData::new(bytes, self.format);
        if let Ok(mut emitted) = self.emitted.lock() {
            emitted.push(chunk.clone());
        }
        if self.chunk_tx.send(chunk.clone()).is_err() {
            debug!("chunk receiver dropped; chunk kept in memory only");
        }
        Ok(Some(chunk))
    }
}

/// One live recording on a cpal input stream
pub struct CpalEngine {
    device_id: String,
    spec: PcmSpec,
    chunk_interval: Duration,
    shared: CaptureShared,
    pipeline: Option<ChunkPipeline>,
    emitted: Arc<StdMutex<Vec<AudioData>>>,
    chunker: Option<JoinHandle<()>>,
    capture: Option<std::thread::JoinHandle<()>>,
}

impl CpalEngine {
    /// Sample layout the engine encodes
    pub fn spec(&self) -> PcmSpec {
        self.spec
    }

    fn release(&mut self) {
        self.shared.capturing.store(false, Ordering::SeqCst);
        self.shared.alive.store(false, Ordering::SeqCst);
        if let Some(chunker) = self.chunker.take() {
            chunker.abort();
        }
        self.pipeline = None;
    }
}

#[async_trait]
impl RecordingEngine for CpalEngine {
    async fn start(&mut self) -> Result<(), RecordingError> {
        if self.chunker.is_some() {
            return Err(RecordingError::StartFailed(
                "Recording already in progress".to_string(),
            ));
        }
        let pipeline = self
            .pipeline
            .clone()
            .ok_or_else(|| RecordingError::StartFailed("Engine has been destroyed".into()))?;
        if !self.shared.alive.load(Ordering::SeqCst) {
            return Err(RecordingError::StartFailed("Input stream has stopped".into()));
        }

        self.shared.capturing.store(true, Ordering::SeqCst);

        // Emit the container header right away so chunk 0 always carries it
        pipeline.flush()?;

        let period = self.chunk_interval.as_std();
        self.chunker = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = pipeline.flush() {
                    error!(error = %e, "failed to encode chunk");
                    break;
                }
            }
        }));

        info!(device_id = %self.device_id, "capture started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<AudioData, RecordingError> {
        if !self.shared.capturing.load(Ordering::SeqCst) {
            return Err(RecordingError::NotRecording);
        }
        self.shared.capturing.store(false, Ordering::SeqCst);

        if let Some(chunker) = self.chunker.take() {
            chunker.abort();
            let _ = chunker.await;
        }

        let pipeline = self.pipeline.take().ok_or(RecordingError::NotRecording)?;
        pipeline.flush()?;
        drop(pipeline);

        if let Ok(mut last) = self.shared.stream_error.lock() {
            if let Some(err) = last.take() {
                warn!(error = %err, "input stream reported errors during recording");
            }
        }

        let chunks = self.internal_chunks();
        AudioData::concat(&chunks)
            .ok_or_else(|| RecordingError::RecordingFailed("No audio data captured".to_string()))
    }

    fn internal_chunks(&self) -> Vec<AudioData> {
        self.emitted
            .lock()
            .map(|chunks| chunks.clone())
            .unwrap_or_default()
    }

    async fn destroy(&mut self) {
        self.release();
        if let Some(capture) = self.capture.take() {
            if !matches!(
                tokio::task::spawn_blocking(move || capture.join()).await,
                Ok(Ok(()))
            ) {
                warn!("capture thread did not shut down cleanly");
            }
        }
        if let Ok(mut chunks) = self.emitted.lock() {
            chunks.clear();
        }
        self.shared.take_samples();
        debug!(device_id = %self.device_id, "engine destroyed");
    }
}

impl Drop for CpalEngine {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl AudioBackend for CpalBackend {
    type Engine = CpalEngine;

    async fn request_access(&self) -> Result<(), DeviceError> {
        tokio::task::spawn_blocking(|| {
            cpal::default_host()
                .input_devices()
                .map(|_| ())
                .map_err(|e| DeviceError::PermissionDenied(e.to_string()))
        })
        .await
        .map_err(|e| DeviceError::Unavailable(format!("Task join error: {}", e)))?
    }

    async fn input_devices(&self) -> Result<Vec<InputDevice>, DeviceError> {
        tokio::task::spawn_blocking(|| {
            let host = cpal::default_host();
            let default_name = host.default_input_device().and_then(|d| d.name().ok());
            let devices = host
                .input_devices()
                .map_err(|e| DeviceError::PermissionDenied(e.to_string()))?;

            let mut list = Vec::new();
            for device in devices {
                let Ok(name) = device.name() else {
                    continue;
                };
                list.push(InputDevice {
                    is_default: default_name.as_deref() == Some(name.as_str()),
                    label: name.clone(),
                    id: name,
                });
            }
            Ok(list)
        })
        .await
        .map_err(|e| DeviceError::Unavailable(format!("Task join error: {}", e)))?
    }

    async fn open(
        &self,
        device_id: &str,
        options: EngineOptions,
    ) -> Result<Self::Engine, DeviceError> {
        let shared = CaptureShared::default();
        shared.alive.store(true, Ordering::SeqCst);

        let (ready_tx, ready_rx) = oneshot::channel();
        let thread_shared = shared.clone();
        let thread_device = device_id.to_string();

        // Start the stream on its own thread (cpal::Stream is not Send)
        let capture = std::thread::Builder::new()
            .name("autorec-capture".into())
            .spawn(move || {
                let (stream, spec) = match CpalBackend::build_stream(&thread_device, &thread_shared)
                {
                    Ok(ok) => ok,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(DeviceError::Unavailable(e.to_string())));
                    return;
                }
                if ready_tx.send(Ok(spec)).is_err() {
                    return;
                }

                // Keep the stream alive until the engine releases it
                while thread_shared.alive.load(Ordering::SeqCst) {
                    std::thread::sleep(CAPTURE_POLL);
                }
                drop(stream);
                debug!("input stream released");
            })
            .map_err(|e| DeviceError::Unavailable(format!("Failed to spawn capture thread: {}", e)))?;

        let spec = ready_rx
            .await
            .map_err(|_| DeviceError::Unavailable("Capture thread exited".into()))??;

        let emitted = Arc::new(StdMutex::new(Vec::new()));
        let pipeline = ChunkPipeline {
            format: options.format,
            shared: shared.clone(),
            encoder: Arc::new(StdMutex::new(encoding::encoder_for(options.format, spec))),
            emitted: Arc::clone(&emitted),
            chunk_tx: options.chunk_tx,
        };

        Ok(CpalEngine {
            device_id: device_id.to_string(),
            spec,
            chunk_interval: options.chunk_interval,
            shared,
            pipeline: Some(pipeline),
            emitted,
            chunker: None,
            capture: Some(capture),
        })
    }

    fn make_seekable(&self, audio: AudioData) -> Result<AudioData, RecordingError> {
        Ok(encoding::make_seekable(&audio)?)
    }
}
