//! Config command handler

use crate::application::ports::ConfigStore;
use crate::domain::error::ConfigError;
use crate::domain::recording::{AudioFormat, Duration, MIN_CHUNK_INTERVAL_MS};

use super::args::{is_valid_config_key, ConfigAction, VALID_CONFIG_KEYS};
use super::presenter::Presenter;

const NOT_SET: &str = "(not set)";

/// Handle config subcommand
pub async fn handle_config_command<S: ConfigStore>(
    action: ConfigAction,
    store: &S,
    presenter: &Presenter,
) -> Result<(), ConfigError> {
    match action {
        ConfigAction::Init => handle_init(store, presenter).await,
        ConfigAction::Set { key, value } => handle_set(store, presenter, &key, &value).await,
        ConfigAction::Get { key } => handle_get(store, presenter, &key).await,
        ConfigAction::List => handle_list(store, presenter).await,
        ConfigAction::Path => handle_path(store, presenter),
    }
}

async fn handle_init<S: ConfigStore>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    store.init().await?;
    presenter.success(&format!(
        "Config file created at: {}",
        store.path().display()
    ));
    Ok(())
}

fn ensure_known_key(key: &str) -> Result<(), ConfigError> {
    if is_valid_config_key(key) {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            key: key.to_string(),
            message: format!("Unknown key. Valid keys: {}", VALID_CONFIG_KEYS.join(", ")),
        })
    }
}

async fn handle_set<S: ConfigStore>(
    store: &S,
    presenter: &Presenter,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    ensure_known_key(key)?;
    validate_config_value(key, value)?;

    store
        .update(|config| {
            match key {
                "device" => config.device = Some(value.to_string()),
                "format" => config.format = Some(value.to_lowercase()),
                "chunk_interval" => config.chunk_interval = Some(value.to_string()),
                "session_id" => config.session_id = Some(value.trim().to_string()),
                "output_dir" => config.output_dir = Some(value.to_string()),
                "database" => config.database = Some(value.to_string()),
                "storage_retries" => config.storage_retries = Some(parse_retries(key, value)?),
                _ => unreachable!(), // Already validated
            }
            Ok(())
        })
        .await?;
    presenter.success(&format!("{} = {}", key, value));

    Ok(())
}

async fn handle_get<S: ConfigStore>(
    store: &S,
    presenter: &Presenter,
    key: &str,
) -> Result<(), ConfigError> {
    ensure_known_key(key)?;

    let config = store.load().await?;

    let value = match key {
        "device" => config.device,
        "format" => config.format,
        "chunk_interval" => config.chunk_interval,
        "session_id" => config.session_id,
        "output_dir" => config.output_dir,
        "database" => config.database,
        "storage_retries" => config.storage_retries.map(|n| n.to_string()),
        _ => unreachable!(),
    };

    presenter.output(value.as_deref().unwrap_or(NOT_SET));

    Ok(())
}

async fn handle_list<S: ConfigStore>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    let config = store.load().await?;

    presenter.key_value("device", config.device.as_deref().unwrap_or(NOT_SET));
    presenter.key_value("format", config.format.as_deref().unwrap_or(NOT_SET));
    presenter.key_value(
        "chunk_interval",
        config.chunk_interval.as_deref().unwrap_or(NOT_SET),
    );
    presenter.key_value("session_id", config.session_id.as_deref().unwrap_or(NOT_SET));
    presenter.key_value("output_dir", config.output_dir.as_deref().unwrap_or(NOT_SET));
    presenter.key_value("database", config.database.as_deref().unwrap_or(NOT_SET));
    presenter.key_value(
        "storage_retries",
        &config
            .storage_retries
            .map(|n| n.to_string())
            .unwrap_or_else(|| NOT_SET.to_string()),
    );

    Ok(())
}

fn handle_path<S: ConfigStore>(store: &S, presenter: &Presenter) -> Result<(), ConfigError> {
    presenter.output(&store.path().to_string_lossy());
    Ok(())
}

/// Validate a config value based on key type
fn validate_config_value(key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::ValidationError {
        key: key.to_string(),
        message,
    };

    match key {
        "format" => {
            value
                .parse::<AudioFormat>()
                .map_err(|e| invalid(e.to_string()))?;
        }
        "chunk_interval" => {
            let interval = value
                .parse::<Duration>()
                .map_err(|e| invalid(e.to_string()))?;
            if interval.as_millis() < MIN_CHUNK_INTERVAL_MS {
                return Err(invalid(format!(
                    "Chunk interval must be at least {}ms",
                    MIN_CHUNK_INTERVAL_MS
                )));
            }
        }
        "storage_retries" => {
            parse_retries(key, value)?;
        }
        "session_id" | "output_dir" | "database" => {
            if value.trim().is_empty() {
                return Err(invalid("Value must not be empty".to_string()));
            }
        }
        _ => {} // device accepts any string
    }
    Ok(())
}

fn parse_retries(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::ValidationError {
            key: key.to_string(),
            message: "Value must be a non-negative integer".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::AppConfig;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct MemoryConfigStore {
        config: Mutex<AppConfig>,
    }

    impl MemoryConfigStore {
        fn new() -> Self {
            Self {
                config: Mutex::new(AppConfig::empty()),
            }
        }
    }

    #[async_trait]
    impl ConfigStore for MemoryConfigStore {
        async fn load(&self) -> Result<AppConfig, ConfigError> {
            Ok(self.config.lock().unwrap().clone())
        }

        async fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
            *self.config.lock().unwrap() = config.clone();
            Ok(())
        }

        fn path(&self) -> PathBuf {
            PathBuf::from("/tmp/autorec/config.toml")
        }

        fn exists(&self) -> bool {
            true
        }

        async fn init(&self) -> Result<(), ConfigError> {
            Ok(())
        }
    }

    #[test]
    fn validate_format() {
        assert!(validate_config_value("format", "wav").is_ok());
        assert!(validate_config_value("format", "WebM").is_ok());
        assert!(validate_config_value("format", "mp3").is_err());
    }

    #[test]
    fn validate_chunk_interval() {
        assert!(validate_config_value("chunk_interval", "3s").is_ok());
        assert!(validate_config_value("chunk_interval", "100ms").is_ok());
        assert!(validate_config_value("chunk_interval", "50ms").is_err());
        assert!(validate_config_value("chunk_interval", "often").is_err());
    }

    #[test]
    fn validate_storage_retries() {
        assert!(validate_config_value("storage_retries", "0").is_ok());
        assert!(validate_config_value("storage_retries", "5").is_ok());
        assert!(validate_config_value("storage_retries", "-1").is_err());
        assert!(validate_config_value("storage_retries", "many").is_err());
    }

    #[test]
    fn validate_rejects_blank_session() {
        assert!(validate_config_value("session_id", "  ").is_err());
        assert!(validate_config_value("session_id", "meeting").is_ok());
        assert!(validate_config_value("device", "").is_ok());
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = MemoryConfigStore::new();
        let presenter = Presenter::new();

        handle_set(&store, &presenter, "format", "WEBM").await.unwrap();
        handle_set(&store, &presenter, "storage_retries", "4").await.unwrap();
        handle_set(&store, &presenter, "session_id", " meeting ").await.unwrap();

        let config = store.load().await.unwrap();
        assert_eq!(config.format.as_deref(), Some("webm"));
        assert_eq!(config.storage_retries, Some(4));
        assert_eq!(config.session_id.as_deref(), Some("meeting"));
        assert!(handle_get(&store, &presenter, "format").await.is_ok());
    }

    #[tokio::test]
    async fn set_unknown_key_fails() {
        let store = MemoryConfigStore::new();
        let presenter = Presenter::new();

        let err = handle_set(&store, &presenter, "api_key", "x").await.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref key, .. } if key == "api_key"));
        assert!(handle_get(&store, &presenter, "api_key").await.is_err());
    }

    #[tokio::test]
    async fn invalid_value_is_not_saved() {
        let store = MemoryConfigStore::new();
        let presenter = Presenter::new();

        assert!(handle_set(&store, &presenter, "chunk_interval", "1ms").await.is_err());
        assert!(store.load().await.unwrap().chunk_interval.is_none());
    }
}
