//! Recording session state machine

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::domain::recording::AudioFormat;

/// Session id used when none is configured
pub const DEFAULT_SESSION_ID: &str = "default";

/// Recording session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Recording,
    Recorded,
}

impl SessionStatus {
    /// Get the string representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "waiting to record",
            Self::Recording => "recording",
            Self::Recorded => "recorded",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error when an invalid state transition is attempted
#[derive(Debug, Clone, Error)]
#[error("Invalid state transition: cannot {action} while {current_state}")]
pub struct InvalidStateTransition {
    pub current_state: SessionStatus,
    pub action: String,
}

/// Recording session entity.
///
/// State machine:
///   IDLE | RECORDED -> RECORDING (start)
///   RECORDING -> RECORDED (finish)
///   RECORDING -> IDLE (abort)
///   IDLE | RECORDED -> RECORDED (load_recovered)
#[derive(Debug, Clone)]
pub struct RecordingSession {
    session_id: String,
    status: SessionStatus,
    started_at: Option<Instant>,
    device_id: Option<String>,
    format: AudioFormat,
}

impl RecordingSession {
    /// Create a new idle session bound to an autosave slot
    pub fn new(session_id: impl Into<String>, format: AudioFormat) -> Self {
        Self {
            session_id: session_id.into(),
            status: SessionStatus::Idle,
            started_at: None,
            device_id: None,
            format,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn is_recording(&self) -> bool {
        self.status == SessionStatus::Recording
    }

    /// Rebind the session to another autosave slot. Only allowed while not recording.
    pub fn set_session_id(&mut self, session_id: impl Into<String>) -> Result<(), InvalidStateTransition> {
        self.ensure_not_recording("change session")?;
        self.session_id = session_id.into();
        Ok(())
    }

    /// Transition from IDLE or RECORDED to RECORDING
    pub fn start(
        &mut self,
        device_id: impl Into<String>,
        format: AudioFormat,
        now: Instant,
    ) -> Result<(), InvalidStateTransition> {
        self.ensure_not_recording("start recording")?;
        self.status = SessionStatus::Recording;
        self.device_id = Some(device_id.into());
        self.format = format;
        self.started_at = Some(now);
        Ok(())
    }

    /// Transition from RECORDING to RECORDED
    pub fn finish(&mut self) -> Result<(), InvalidStateTransition> {
        if self.status != SessionStatus::Recording {
            return Err(InvalidStateTransition {
                current_state: self.status,
                action: "stop recording".to_string(),
            });
        }
        self.status = SessionStatus::Recorded;
        self.started_at = None;
        Ok(())
    }

    /// Transition from RECORDING back to IDLE after a failure
    pub fn abort(&mut self) {
        self.status = SessionStatus::Idle;
        self.started_at = None;
    }

    /// Enter RECORDED with a recording restored from autosave
    pub fn load_recovered(&mut self, format: AudioFormat) -> Result<(), InvalidStateTransition> {
        self.ensure_not_recording("load an autosave")?;
        self.status = SessionStatus::Recorded;
        self.format = format;
        Ok(())
    }

    /// Milliseconds since the recording started, measured from the start
    /// timestamp rather than accumulated ticks.
    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        self.started_at
            .map(|start| now.saturating_duration_since(start).as_millis() as u64)
            .unwrap_or(0)
    }

    fn ensure_not_recording(&self, action: &str) -> Result<(), InvalidStateTransition> {
        if self.status == SessionStatus::Recording {
            return Err(InvalidStateTransition {
                current_state: self.status,
                action: action.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_ID, AudioFormat::default())
    }
}
