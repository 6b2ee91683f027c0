//! Autosave domain module

mod chunk;

pub use chunk::{AutosaveSummary, ChunkRecord};
