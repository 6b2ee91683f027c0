//! Recording domain module

mod audio_data;
mod duration;
mod elapsed;

pub use audio_data::{human_readable_bytes, AudioData, AudioFormat};
pub use duration::{Duration, DEFAULT_CHUNK_INTERVAL_MS, MIN_CHUNK_INTERVAL_MS};
pub use elapsed::{format_elapsed, ElapsedTime};
