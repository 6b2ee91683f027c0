//! CLI argument definitions using Clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::domain::recording::{AudioFormat, Duration};

/// autorec - crash-safe microphone recorder
#[derive(Parser, Debug)]
#[command(name = "autorec")]
#[command(version)]
#[command(about = "Record the microphone to WAV or WebM with crash-safe autosave")]
#[command(long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List audio input devices
    Devices,
    /// Record until Ctrl-C (or the duration elapses), then save
    Record(RecordArgs),
    /// Rebuild a recording from its autosave and save it
    Recover(RecoverArgs),
    /// Inspect or clear stored autosaves
    Autosave {
        #[command(subcommand)]
        action: AutosaveAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments of `autorec record`
#[derive(clap::Args, Debug, Default)]
pub struct RecordArgs {
    /// Input device id (see `autorec devices`)
    #[arg(short = 'i', long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Container format
    #[arg(short = 'f', long, value_name = "FORMAT")]
    pub format: Option<FormatArg>,

    /// How often a chunk is autosaved (e.g., 500ms, 3s)
    #[arg(long, value_name = "TIME")]
    pub chunk_interval: Option<String>,

    /// Autosave slot for this recording
    #[arg(short = 's', long, value_name = "SESSION", env = "AUTOREC_SESSION")]
    pub session: Option<String>,

    /// Directory the recording is saved to
    #[arg(short = 'o', long, value_name = "DIR", env = "AUTOREC_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Stop automatically after this long (e.g., 10s, 1m30s)
    #[arg(short = 'd', long, value_name = "TIME")]
    pub duration: Option<String>,
}

/// Arguments of `autorec recover`
#[derive(clap::Args, Debug, Default)]
pub struct RecoverArgs {
    /// Autosave slot to recover
    #[arg(short = 's', long, value_name = "SESSION", env = "AUTOREC_SESSION")]
    pub session: Option<String>,

    /// Directory the recording is saved to
    #[arg(short = 'o', long, value_name = "DIR", env = "AUTOREC_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Delete the autosave once the recording is saved
    #[arg(long)]
    pub clear: bool,
}

/// Autosave action subcommands
#[derive(Subcommand, Debug)]
pub enum AutosaveAction {
    /// List stored autosave slots
    List {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every chunk of one autosave slot
    Clear {
        /// Autosave slot to clear
        #[arg(short = 's', long, value_name = "SESSION", env = "AUTOREC_SESSION")]
        session: Option<String>,
    },
}

/// Config action subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Create config file with defaults
    Init,
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// Config value
        value: String,
    },
    /// Get a config value
    Get {
        /// Config key
        key: String,
    },
    /// List all config values
    List,
    /// Show config file path
    Path,
}

/// Format argument for clap ValueEnum
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Wav,
    Webm,
}

impl From<FormatArg> for AudioFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Wav => AudioFormat::Wav,
            FormatArg::Webm => AudioFormat::Webm,
        }
    }
}

impl From<AudioFormat> for FormatArg {
    fn from(format: AudioFormat) -> Self {
        match format {
            AudioFormat::Wav => FormatArg::Wav,
            AudioFormat::Webm => FormatArg::Webm,
        }
    }
}

/// Fully resolved options for `autorec record`
#[derive(Debug, Clone)]
pub struct RecordOptions {
    pub device: String,
    pub format: AudioFormat,
    pub chunk_interval: Duration,
    pub session_id: String,
    pub output_dir: PathBuf,
    pub max_duration: Option<Duration>,
    pub storage_retries: u32,
    pub database: PathBuf,
}

/// Valid config keys
pub const VALID_CONFIG_KEYS: &[&str] = &[
    "device",
    "format",
    "chunk_interval",
    "session_id",
    "output_dir",
    "database",
    "storage_retries",
];

/// Check if a config key is valid
pub fn is_valid_config_key(key: &str) -> bool {
    VALID_CONFIG_KEYS.contains(&key)
}
