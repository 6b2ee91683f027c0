//! Application configuration value object

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::recording::{AudioFormat, Duration, MIN_CHUNK_INTERVAL_MS};
use crate::domain::session::DEFAULT_SESSION_ID;

/// Default number of retries for a failed chunk write
pub const DEFAULT_STORAGE_RETRIES: u32 = 2;

/// Application configuration.
/// All fields are optional to support partial configs and merging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Input device id (device name as reported by the host)
    pub device: Option<String>,
    pub format: Option<String>,
    pub chunk_interval: Option<String>,
    pub session_id: Option<String>,
    pub output_dir: Option<String>,
    /// Path of the autosave database
    pub database: Option<String>,
    pub storage_retries: Option<u32>,
}

impl AppConfig {
    /// Create config with default values
    pub fn defaults() -> Self {
        Self {
            device: None,
            format: Some(AudioFormat::default().to_string()),
            chunk_interval: Some(Duration::default_chunk_interval().to_string()),
            session_id: Some(DEFAULT_SESSION_ID.to_string()),
            output_dir: Some(".".to_string()),
            database: None,
            storage_retries: Some(DEFAULT_STORAGE_RETRIES),
        }
    }

    /// Create an empty config (all None)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge this config with another, where other takes precedence.
    /// Only non-None values from other will override this.
    pub fn merge(self, other: Self) -> Self {
        Self {
            device: other.device.or(self.device),
            format: other.format.or(self.format),
            chunk_interval: other.chunk_interval.or(self.chunk_interval),
            session_id: other.session_id.or(self.session_id),
            output_dir: other.output_dir.or(self.output_dir),
            database: other.database.or(self.database),
            storage_retries: other.storage_retries.or(self.storage_retries),
        }
    }

    /// Get format as parsed AudioFormat, or default if not set/invalid
    pub fn format_or_default(&self) -> AudioFormat {
        self.format
            .as_ref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Get chunk interval, or the 3s default if not set/invalid/too short
    pub fn chunk_interval_or_default(&self) -> Duration {
        self.chunk_interval
            .as_ref()
            .and_then(|s| s.parse::<Duration>().ok())
            .filter(|d| d.as_millis() >= MIN_CHUNK_INTERVAL_MS)
            .unwrap_or_else(Duration::default_chunk_interval)
    }

    pub fn session_id_or_default(&self) -> &str {
        self.session_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SESSION_ID)
    }

    pub fn output_dir_or_default(&self) -> PathBuf {
        PathBuf::from(self.output_dir.as_deref().unwrap_or("."))
    }

    pub fn storage_retries_or_default(&self) -> u32 {
        self.storage_retries.unwrap_or(DEFAULT_STORAGE_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_expected_values() {
        let config = AppConfig::defaults();
        assert!(config.device.is_none());
        assert_eq!(config.format, Some("wav".to_string()));
        assert_eq!(config.chunk_interval, Some("3s".to_string()));
        assert_eq!(config.session_id, Some("default".to_string()));
        assert_eq!(config.storage_retries, Some(2));
    }

    #[test]
    fn empty_has_all_none() {
        let config = AppConfig::empty();
        assert!(config.format.is_none());
        assert!(config.chunk_interval.is_none());
        assert!(config.session_id.is_none());
        assert!(config.database.is_none());
    }

    #[test]
    fn merge_other_takes_precedence() {
        let base = AppConfig {
            device: Some("built-in".to_string()),
            format: Some("wav".to_string()),
            session_id: Some("a".to_string()),
            ..Default::default()
        };
        let other = AppConfig {
            device: None,
            format: Some("webm".to_string()),
            session_id: Some("b".to_string()),
            ..Default::default()
        };

        let merged = base.merge(other);
        assert_eq!(merged.device, Some("built-in".to_string()));
        assert_eq!(merged.format, Some("webm".to_string()));
        assert_eq!(merged.session_id, Some("b".to_string()));
    }

    #[test]
    fn typed_accessors_fall_back_on_invalid_values() {
        let config = AppConfig {
            format: Some("flac".to_string()),
            chunk_interval: Some("soon".to_string()),
            session_id: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.format_or_default(), AudioFormat::Wav);
        assert_eq!(config.chunk_interval_or_default().as_millis(), 3000);
        assert_eq!(config.session_id_or_default(), "default");
        assert_eq!(config.storage_retries_or_default(), 2);
    }

    #[test]
    fn chunk_interval_rejects_too_short() {
        let config = AppConfig {
            chunk_interval: Some("10ms".to_string()),
            ..Default::default()
        };
        assert_eq!(config.chunk_interval_or_default().as_millis(), 3000);

        let config = AppConfig {
            chunk_interval: Some("500ms".to_string()),
            ..Default::default()
        };
        assert_eq!(config.chunk_interval_or_default().as_millis(), 500);
    }
}
