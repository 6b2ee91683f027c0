//! CLI layer - Command-line interface
//!
//! Contains argument parsing, output formatting, logging and signal
//! handling, and the subcommand runners.

pub mod app;
pub mod args;
pub mod config_cmd;
pub mod logging;
pub mod presenter;
pub mod signals;

// Re-export commonly used types
pub use app::{
    run_autosave_clear, run_autosave_list, run_devices, run_record, run_recover, EXIT_ERROR,
    EXIT_SUCCESS, EXIT_USAGE_ERROR,
};
pub use args::{AutosaveAction, Cli, Commands, ConfigAction, RecordOptions};
pub use presenter::Presenter;
