//! Recording session domain module

#[allow(clippy::module_inception)]
mod session;

pub use session::{InvalidStateTransition, RecordingSession, SessionStatus, DEFAULT_SESSION_ID};
