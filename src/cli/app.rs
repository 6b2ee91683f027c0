//! App runners for the `autorec` subcommands

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration as StdDuration;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::application::ports::{AudioBackend, ConfigStore};
use crate::application::{
    AutosaveEvent, AutosaveManager, ControllerConfig, SessionController, SessionError,
    RETRY_BACKOFF,
};
use crate::domain::autosave::AutosaveSummary;
use crate::domain::config::AppConfig;
use crate::domain::recording::{
    format_elapsed, human_readable_bytes, AudioFormat, Duration, MIN_CHUNK_INTERVAL_MS,
};
use crate::infrastructure::recording::DEFAULT_DEVICE_ID;
use crate::infrastructure::{create_backend, CpalBackend, FileSink, SqliteChunkStore, XdgConfigStore};

use super::args::RecordOptions;
use super::presenter::Presenter;
use super::signals::ShutdownSignal;

/// Exit codes
pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_USAGE_ERROR: u8 = 2;

/// How often the recording status line is refreshed
const STATUS_REFRESH: StdDuration = StdDuration::from_millis(100);

type CliController = SessionController<CpalBackend, SqliteChunkStore, FileSink>;

/// Load and merge configuration from file, env, and CLI
pub async fn load_merged_config(cli_config: AppConfig) -> AppConfig {
    let store = XdgConfigStore::new();
    let file_config = store.load().await.unwrap_or_else(|e| {
        debug!(error = %e, "ignoring unreadable config file");
        AppConfig::empty()
    });

    let env_config = AppConfig {
        session_id: env::var("AUTOREC_SESSION").ok().filter(|s| !s.is_empty()),
        output_dir: env::var("AUTOREC_OUTPUT_DIR").ok().filter(|s| !s.is_empty()),
        ..Default::default()
    };

    // Merge: defaults < file < env < cli
    AppConfig::defaults()
        .merge(file_config)
        .merge(env_config)
        .merge(cli_config)
}

/// Turn a merged config into record options.
///
/// Unlike the lenient `*_or_default` accessors, a value that was set but does
/// not parse is an error here.
pub fn resolve_record_options(
    config: &AppConfig,
    max_duration: Option<&str>,
) -> Result<RecordOptions, String> {
    let format = match config.format.as_deref() {
        Some(s) => s.parse::<AudioFormat>().map_err(|e| e.to_string())?,
        None => AudioFormat::default(),
    };

    let chunk_interval = match config.chunk_interval.as_deref() {
        Some(s) => {
            let interval = s
                .parse::<Duration>()
                .map_err(|e| format!("Invalid chunk interval: {}", e))?;
            if interval.as_millis() < MIN_CHUNK_INTERVAL_MS {
                return Err(format!(
                    "Invalid chunk interval: must be at least {}ms",
                    MIN_CHUNK_INTERVAL_MS
                ));
            }
            interval
        }
        None => Duration::default_chunk_interval(),
    };

    let max_duration = match max_duration {
        Some(s) => {
            let limit = s
                .parse::<Duration>()
                .map_err(|e| format!("Invalid duration: {}", e))?;
            if limit.as_millis() == 0 {
                return Err("Invalid duration: must be greater than zero".to_string());
            }
            Some(limit)
        }
        None => None,
    };

    let database = config
        .database
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(SqliteChunkStore::default_path);

    Ok(RecordOptions {
        device: config
            .device
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string()),
        format,
        chunk_interval,
        session_id: config.session_id_or_default().to_string(),
        output_dir: config.output_dir_or_default(),
        max_duration,
        storage_retries: config.storage_retries_or_default(),
        database,
    })
}

fn open_autosave(options: &RecordOptions) -> Result<AutosaveManager<SqliteChunkStore>, SessionError> {
    let store = SqliteChunkStore::open(&options.database)?;
    Ok(AutosaveManager::new(store).with_retries(options.storage_retries, RETRY_BACKOFF))
}

fn open_controller(options: &RecordOptions) -> Result<CliController, SessionError> {
    let autosave = open_autosave(options)?;
    let config = ControllerConfig {
        session_id: options.session_id.clone(),
        format: options.format,
        chunk_interval: options.chunk_interval,
    };
    Ok(SessionController::new(
        create_backend(),
        autosave,
        FileSink::new(&options.output_dir),
        config,
    ))
}

fn exit_for(error: &SessionError) -> ExitCode {
    if error.is_non_fatal() {
        debug!(error = %error, "non-fatal session signal");
    }
    ExitCode::from(EXIT_ERROR)
}

/// List audio input devices
pub async fn run_devices() -> ExitCode {
    let presenter = Presenter::new();
    let backend = create_backend();

    let devices = async {
        backend.request_access().await?;
        backend.input_devices().await
    }
    .await
    .map_err(SessionError::from);

    match devices {
        Ok(devices) if devices.is_empty() => {
            presenter.error(&SessionError::NoDevice.to_string());
            ExitCode::from(EXIT_ERROR)
        }
        Ok(devices) => {
            for device in &devices {
                presenter.output(&presenter.format_device(device));
            }
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            presenter.error(&e.to_string());
            exit_for(&e)
        }
    }
}

/// Record until Ctrl-C or the duration limit, then save
pub async fn run_record(options: RecordOptions) -> ExitCode {
    let mut presenter = Presenter::new();

    let shutdown = ShutdownSignal::new();
    if let Err(e) = shutdown.setup().await {
        presenter.error(&format!("Failed to setup signal handler: {}", e));
        return ExitCode::from(EXIT_ERROR);
    }

    let mut controller = match open_controller(&options) {
        Ok(controller) => controller,
        Err(e) => {
            presenter.error(&e.to_string());
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if let Err(e) = controller.load_devices().await {
        presenter.error(&e.to_string());
        return exit_for(&e);
    }

    if let Err(e) = controller
        .start_recording(&options.device, options.format)
        .await
    {
        presenter.error(&e.to_string());
        return exit_for(&e);
    }

    let mut events = controller.subscribe_autosave().await;
    let limit_ms = options.max_duration.map(|d| d.as_millis());
    let mut autosave_failed = false;

    let initial_status = presenter.format_elapsed_status(0, limit_ms);
    presenter.start_spinner(&initial_status);
    let mut refresh = interval(STATUS_REFRESH);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        refresh.tick().await;

        loop {
            match events.try_recv() {
                Ok(AutosaveEvent::ChunkWriteFailed { .. }) => autosave_failed = true,
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }

        let elapsed = controller.elapsed_ms();
        let status = presenter.format_elapsed_status(elapsed, limit_ms);
        if autosave_failed {
            presenter.update_spinner(&format!("{} (autosave off)", status));
        } else {
            presenter.update_spinner(&status);
        }

        if shutdown.is_shutdown() {
            break;
        }
        if limit_ms.is_some_and(|limit| elapsed >= limit) {
            break;
        }
    }

    if let Err(e) = controller.stop_recording().await {
        presenter.spinner_fail("Recording failed");
        presenter.error(&e.to_string());
        controller.shutdown().await;
        return ExitCode::from(EXIT_ERROR);
    }

    let snapshot = controller.snapshot().await;
    debug!(?snapshot, "recording finished");
    presenter.spinner_success(&format!(
        "Recorded {} ({})",
        format_elapsed(snapshot.elapsed_ms),
        human_readable_bytes(snapshot.retained_bytes.unwrap_or(0) as u64)
    ));

    if let Err(e) = controller.autosave_health() {
        presenter.warn(&e.to_string());
    }

    match save_retained(&controller, &presenter).await {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            presenter.error(&e.to_string());
            presenter.info(&format!(
                "Autosave kept; run 'autorec recover -s {}' to retry",
                options.session_id
            ));
            exit_for(&e)
        }
    }
}

async fn save_retained(controller: &CliController, presenter: &Presenter) -> Result<(), SessionError> {
    let path = controller.save_recording().await?;
    presenter.success("Recording saved");
    presenter.output(&path.to_string_lossy());
    Ok(())
}

/// Rebuild the recording of a session from its autosave and save it
pub async fn run_recover(options: RecordOptions, clear: bool) -> ExitCode {
    let presenter = Presenter::new();

    match recover_and_save(&options, clear, &presenter).await {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            if e.is_non_fatal() {
                presenter.warn(&e.to_string());
            } else {
                presenter.error(&e.to_string());
            }
            exit_for(&e)
        }
    }
}

async fn recover_and_save(
    options: &RecordOptions,
    clear: bool,
    presenter: &Presenter,
) -> Result<(), SessionError> {
    let mut controller = open_controller(options)?;
    controller.recover_from_autosave(&options.session_id).await?;

    if let Some(audio) = controller.retained() {
        presenter.info(&format!(
            "Recovered {} recording ({})",
            audio.format(),
            audio.human_readable_size()
        ));
    }

    save_retained(&controller, presenter).await?;

    if clear {
        let removed = controller.clear_autosave(&options.session_id).await?;
        presenter.info(&format!("Cleared {} autosaved chunk(s)", removed));
    }
    Ok(())
}

async fn list_autosaves(options: &RecordOptions) -> Result<Vec<AutosaveSummary>, SessionError> {
    let manager = open_autosave(options)?;
    Ok(manager.list_autosaves().await?)
}

async fn clear_autosave(options: &RecordOptions) -> Result<u64, SessionError> {
    let manager = open_autosave(options)?;
    Ok(manager.clear_autosave(&options.session_id).await?)
}

/// List stored autosave slots
pub async fn run_autosave_list(options: RecordOptions, json: bool) -> ExitCode {
    let presenter = Presenter::new();

    let summaries = match list_autosaves(&options).await {
        Ok(summaries) => summaries,
        Err(e) => {
            presenter.error(&e.to_string());
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if json {
        match serde_json::to_string_pretty(&summaries) {
            Ok(text) => presenter.output(&text),
            Err(e) => {
                presenter.error(&format!("Failed to serialize autosaves: {}", e));
                return ExitCode::from(EXIT_ERROR);
            }
        }
    } else if summaries.is_empty() {
        presenter.info("No autosaves stored");
    } else {
        for summary in &summaries {
            presenter.output(&presenter.format_autosave(summary));
        }
    }

    ExitCode::from(EXIT_SUCCESS)
}

/// Delete every chunk of one autosave slot
pub async fn run_autosave_clear(options: RecordOptions) -> ExitCode {
    let presenter = Presenter::new();

    match clear_autosave(&options).await {
        Ok(removed) => {
            presenter.success(&format!(
                "Cleared {} chunk(s) from '{}'",
                removed, options.session_id
            ));
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            presenter.error(&e.to_string());
            ExitCode::from(EXIT_ERROR)
        }
    }
}
