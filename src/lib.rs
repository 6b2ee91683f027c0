//! autorec - crash-safe microphone recorder
//!
//! This crate records an audio input device into WAV or WebM, persists every
//! encoded chunk to a local SQLite store while recording, and rebuilds the
//! recording from those chunks after a crash.
//!
//! # Architecture
//!
//! The crate follows hexagonal (ports & adapters) architecture:
//!
//! - **Domain**: Value objects, the recording session state machine and errors
//! - **Application**: Session controller, autosave manager and port interfaces (traits)
//! - **Infrastructure**: Adapter implementations (cpal capture, WAV/WebM encoders, SQLite, files)
//! - **CLI**: Command-line interface, argument parsing, logging and signal handling

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
