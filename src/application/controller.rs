//! Session controller: recording lifecycle, autosave wiring and elapsed time

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::domain::autosave::AutosaveSummary;
use crate::domain::recording::{AudioData, AudioFormat, Duration};
use crate::domain::session::{InvalidStateTransition, RecordingSession, SessionStatus};

use super::autosave::{run_autosave_pump, AutosaveError, AutosaveEvent, AutosaveManager, PumpReport};
use super::ports::{
    AudioBackend, ChunkStore, DeviceError, EngineOptions, InputDevice, RecordingEngine,
    RecordingError, RecordingSink, SaveError, StoreError,
};

/// Resolution of the elapsed-time ticker
const TICK_INTERVAL: StdDuration = StdDuration::from_millis(100);

/// Errors from the session controller
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("No audio input device available")]
    NoDevice,

    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("No recording to save")]
    NothingToSave,

    #[error("No autosave found for session '{0}'")]
    NoAutosaveFound(String),

    #[error("Autosave write failed: {0}")]
    StorageWriteFailed(String),

    #[error("Autosave storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("{0}")]
    InvalidState(#[from] InvalidStateTransition),

    #[error("{0}")]
    Recording(#[from] RecordingError),

    #[error("{0}")]
    Save(#[from] SaveError),
}

impl SessionError {
    /// Signals that are logged and otherwise ignored
    pub fn is_non_fatal(&self) -> bool {
        matches!(self, Self::NothingToSave | Self::NoAutosaveFound(_))
    }
}

impl From<DeviceError> for SessionError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            DeviceError::NoDevice => Self::NoDevice,
            DeviceError::Unavailable(msg) => Self::DeviceUnavailable(msg),
        }
    }
}

impl From<AutosaveError> for SessionError {
    fn from(err: AutosaveError) -> Self {
        match err {
            AutosaveError::StorageWriteFailed { .. } => Self::StorageWriteFailed(err.to_string()),
            AutosaveError::Store(e) => Self::Storage(e),
        }
    }
}

/// Controller settings
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub session_id: String,
    pub format: AudioFormat,
    pub chunk_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            session_id: crate::domain::session::DEFAULT_SESSION_ID.to_string(),
            format: AudioFormat::default(),
            chunk_interval: Duration::default_chunk_interval(),
        }
    }
}

/// Read-only view of the controller for presentation
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub elapsed_ms: u64,
    pub session_id: String,
    pub format: AudioFormat,
    pub device_id: Option<String>,
    pub devices: Vec<InputDevice>,
    pub autosaves: Vec<AutosaveSummary>,
    /// Size of the recording held for saving
    pub retained_bytes: Option<usize>,
    pub last_autosave_error: Option<String>,
}

/// Resources owned for the duration of one recording
struct ActiveRecording<E> {
    engine: E,
    pump: JoinHandle<PumpReport>,
    ticker: JoinHandle<()>,
}

/// Coordinates device selection, the recording engine, autosave and the
/// elapsed-time ticker for one recording session.
///
/// State machine: IDLE -> RECORDING -> RECORDED -> (RECORDING | RECORDED).
/// The engine, stream and ticker exist only while RECORDING.
pub struct SessionController<B, S, K>
where
    B: AudioBackend,
    S: ChunkStore + 'static,
    K: RecordingSink,
{
    backend: B,
    autosave: Arc<Mutex<AutosaveManager<S>>>,
    sink: K,
    session: RecordingSession,
    chunk_interval: Duration,
    devices: Vec<InputDevice>,
    active: Option<ActiveRecording<B::Engine>>,
    retained: Option<AudioData>,
    elapsed_ms: Arc<AtomicU64>,
    ticker_generation: Arc<AtomicU64>,
    last_autosave_error: Option<AutosaveError>,
}

impl<B, S, K> SessionController<B, S, K>
where
    B: AudioBackend,
    S: ChunkStore + 'static,
    K: RecordingSink,
{
    /// Create a controller in the IDLE state
    pub fn new(backend: B, autosave: AutosaveManager<S>, sink: K, config: ControllerConfig) -> Self {
        Self {
            backend,
            autosave: Arc::new(Mutex::new(autosave)),
            sink,
            session: RecordingSession::new(config.session_id, config.format),
            chunk_interval: config.chunk_interval,
            devices: Vec::new(),
            active: None,
            retained: None,
            elapsed_ms: Arc::new(AtomicU64::new(0)),
            ticker_generation: Arc::new(AtomicU64::new(0)),
            last_autosave_error: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn session_id(&self) -> &str {
        self.session.session_id()
    }

    /// Elapsed time of the current (or last) recording as seen by the ticker
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms.load(Ordering::SeqCst)
    }

    /// The recording held for saving, if any
    pub fn retained(&self) -> Option<&AudioData> {
        self.retained.as_ref()
    }

    /// Subscribe to autosave store changes
    pub async fn subscribe_autosave(&self) -> broadcast::Receiver<AutosaveEvent> {
        self.autosave.lock().await.subscribe()
    }

    /// Fails with `StorageWriteFailed` if autosave was disabled during the last recording
    pub fn autosave_health(&self) -> Result<(), SessionError> {
        match &self.last_autosave_error {
            Some(e) => Err(SessionError::from(e.clone())),
            None => Ok(()),
        }
    }

    /// Request microphone access and enumerate input devices. Idempotent.
    pub async fn load_devices(&mut self) -> Result<Vec<InputDevice>, SessionError> {
        self.backend.request_access().await?;
        let devices = self.backend.input_devices().await?;
        if devices.is_empty() {
            return Err(SessionError::NoDevice);
        }

        debug!(count = devices.len(), "input devices loaded");
        self.devices = devices.clone();
        Ok(devices)
    }

    /// Start recording `device_id` into `format`.
    ///
    /// Allowed from IDLE and RECORDED; a retained recording is discarded. The
    /// autosave slot of the current session id is reset once the device has
    /// opened and capture has started, so a failed start leaves it intact.
    pub async fn start_recording(
        &mut self,
        device_id: &str,
        format: AudioFormat,
    ) -> Result<(), SessionError> {
        if self.session.is_recording() {
            return Err(InvalidStateTransition {
                current_state: self.session.status(),
                action: "start recording".to_string(),
            }
            .into());
        }

        self.retained = None;
        self.last_autosave_error = None;
        self.elapsed_ms.store(0, Ordering::SeqCst);
        let session_id = self.session.session_id().to_string();

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let options = EngineOptions {
            format,
            chunk_interval: self.chunk_interval,
            chunk_tx,
        };

        let mut engine = match self.backend.open(device_id, options).await {
            Ok(engine) => engine,
            Err(e) => {
                self.session.abort();
                return Err(e.into());
            }
        };

        if let Err(e) = engine.start().await {
            engine.destroy().await;
            self.session.abort();
            return Err(SessionError::DeviceUnavailable(e.to_string()));
        }

        // The previous autosave survives until capture is actually running.
        // Chunks emitted meanwhile wait in the channel until the pump starts.
        {
            let mut autosave = self.autosave.lock().await;
            autosave.reset_session(&session_id);
            match autosave.clear_autosave(&session_id).await {
                Ok(0) => {}
                Ok(removed) => {
                    warn!(session_id = %session_id, removed, "discarded previous autosave for this session");
                }
                Err(e) => {
                    drop(autosave);
                    engine.destroy().await;
                    self.session.abort();
                    return Err(e.into());
                }
            }
        }

        let started_at = Instant::now();
        self.session.start(device_id, format, started_at)?;

        let pump = tokio::spawn(run_autosave_pump(
            Arc::clone(&self.autosave),
            session_id.clone(),
            chunk_rx,
        ));
        let ticker = self.spawn_ticker(started_at);

        self.active = Some(ActiveRecording {
            engine,
            pump,
            ticker,
        });

        info!(session_id = %session_id, device_id, format = %format, "recording started");
        Ok(())
    }

    /// Stop the active recording and retain it for saving.
    ///
    /// A no-op when nothing is recording.
    pub async fn stop_recording(&mut self) -> Result<(), SessionError> {
        let Some(active) = self.active.take() else {
            debug!("stop requested with no active recording");
            return Ok(());
        };
        let ActiveRecording {
            mut engine,
            pump,
            ticker,
        } = active;

        let now = Instant::now();
        self.cancel_ticker(ticker);
        self.elapsed_ms
            .store(self.session.elapsed_ms(now), Ordering::SeqCst);

        let result = engine.stop().await;
        engine.destroy().await;
        drop(engine);
        self.collect_pump(pump).await;

        let audio = match result {
            Ok(audio) => audio,
            Err(e) => {
                error!(error = %e, "recording failed to stop cleanly");
                self.session.abort();
                return Err(e.into());
            }
        };

        let audio = self.seekable_or_raw(audio);
        info!(
            session_id = %self.session.session_id(),
            size = %audio.human_readable_size(),
            "recording stopped"
        );
        self.retained = Some(audio);
        self.session.finish()?;
        Ok(())
    }

    /// Save the retained recording as `audio.<ext>`
    pub async fn save_recording(&self) -> Result<PathBuf, SessionError> {
        let Some(audio) = self.retained.as_ref() else {
            warn!("No recording to save");
            return Err(SessionError::NothingToSave);
        };

        let path = self.sink.save(audio, &audio.format().file_name()).await?;
        info!(path = %path.display(), "recording saved");
        Ok(path)
    }

    /// Rebuild a recording from the chunks stored under `session_id`
    pub async fn recover_from_autosave(&mut self, session_id: &str) -> Result<(), SessionError> {
        if self.session.is_recording() {
            return Err(InvalidStateTransition {
                current_state: self.session.status(),
                action: "load an autosave".to_string(),
            }
            .into());
        }

        let loaded = self.autosave.lock().await.load_autosave(session_id).await?;
        let Some(audio) = loaded else {
            return Err(SessionError::NoAutosaveFound(session_id.to_string()));
        };

        let audio = self.seekable_or_raw(audio);
        let format = audio.format();
        self.session.set_session_id(session_id)?;
        self.session.load_recovered(format)?;
        info!(session_id, size = %audio.human_readable_size(), "recording recovered from autosave");
        self.retained = Some(audio);
        Ok(())
    }

    /// Delete every chunk stored under `session_id` and restart its numbering
    pub async fn clear_autosave(&mut self, session_id: &str) -> Result<u64, SessionError> {
        let mut autosave = self.autosave.lock().await;
        let removed = autosave.clear_autosave(session_id).await?;
        autosave.reset_session(session_id);
        Ok(removed)
    }

    /// Autosave slots currently in the store
    pub async fn autosaves(&self) -> Result<Vec<AutosaveSummary>, SessionError> {
        Ok(self.autosave.lock().await.list_autosaves().await?)
    }

    /// Current state for presentation
    pub async fn snapshot(&self) -> SessionSnapshot {
        let autosaves = match self.autosaves().await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "failed to list autosaves");
                Vec::new()
            }
        };

        SessionSnapshot {
            status: self.session.status(),
            elapsed_ms: self.elapsed_ms(),
            session_id: self.session.session_id().to_string(),
            format: self.session.format(),
            device_id: self.session.device_id().map(str::to_string),
            devices: self.devices.clone(),
            autosaves,
            retained_bytes: self.retained.as_ref().map(AudioData::size_bytes),
            last_autosave_error: self.last_autosave_error.as_ref().map(|e| e.to_string()),
        }
    }

    /// Release the active recording without finishing it.
    ///
    /// Chunks persisted so far stay in the store for recovery.
    pub async fn shutdown(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let ActiveRecording {
            mut engine,
            pump,
            ticker,
        } = active;

        self.cancel_ticker(ticker);
        engine.destroy().await;
        drop(engine);
        self.collect_pump(pump).await;
        self.session.abort();
        info!(session_id = %self.session.session_id(), "recording abandoned; autosave kept");
    }

    fn spawn_ticker(&self, started_at: Instant) -> JoinHandle<()> {
        let generation = self.ticker_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.ticker_generation);
        let elapsed = Arc::clone(&self.elapsed_ms);

        tokio::spawn(async move {
            let mut ticker = interval(TICK_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                // A tick that fires after cancellation must not write
                if current.load(Ordering::SeqCst) != generation {
                    break;
                }
                elapsed.store(started_at.elapsed().as_millis() as u64, Ordering::SeqCst);
            }
        })
    }

    fn cancel_ticker(&self, ticker: JoinHandle<()>) {
        self.ticker_generation.fetch_add(1, Ordering::SeqCst);
        ticker.abort();
    }

    async fn collect_pump(&mut self, pump: JoinHandle<PumpReport>) {
        match pump.await {
            Ok(report) => {
                if let Some(e) = report.error {
                    warn!(
                        persisted = report.persisted,
                        skipped = report.skipped,
                        "autosave incomplete for this recording"
                    );
                    self.last_autosave_error = Some(e);
                }
            }
            Err(e) => error!(error = %e, "autosave task failed"),
        }
    }

    fn seekable_or_raw(&self, audio: AudioData) -> AudioData {
        match self.backend.make_seekable(audio.clone()) {
            Ok(fixed) => fixed,
            Err(e) => {
                warn!(error = %e, "could not make recording seekable; keeping raw data");
                audio
            }
        }
    }
}

impl<B, S, K> Drop for SessionController<B, S, K>
where
    B: AudioBackend,
    S: ChunkStore + 'static,
    K: RecordingSink,
{
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            self.ticker_generation.fetch_add(1, Ordering::SeqCst);
            active.ticker.abort();
            // Dropping the engine releases the input stream and its chunk
            // sender; the detached pump then drains what is queued and exits.
            drop(active.engine);
        }
    }
}
