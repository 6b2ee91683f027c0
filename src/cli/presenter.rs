//! CLI presenter for output formatting

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::application::ports::InputDevice;
use crate::domain::autosave::AutosaveSummary;
use crate::domain::recording::{format_elapsed, human_readable_bytes};

/// Presenter for CLI output formatting
pub struct Presenter {
    spinner: Option<ProgressBar>,
    is_spinner_active: Arc<AtomicBool>,
}

impl Presenter {
    /// Create a new presenter
    pub fn new() -> Self {
        Self {
            spinner: None,
            is_spinner_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start a spinner with message
    pub fn start_spinner(&mut self, message: &str) {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .template("{spinner:.red} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        self.spinner = Some(spinner);
        self.is_spinner_active.store(true, Ordering::SeqCst);
    }

    /// Update spinner message
    pub fn update_spinner(&self, message: &str) {
        if let Some(ref spinner) = self.spinner {
            spinner.set_message(message.to_string());
        }
    }

    /// Mark spinner as success and finish
    pub fn spinner_success(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_with_message(format!("{} {}", "✓".green(), message));
        }
        self.is_spinner_active.store(false, Ordering::SeqCst);
    }

    /// Mark spinner as failed and finish
    pub fn spinner_fail(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_with_message(format!("{} {}", "✗".red(), message));
        }
        self.is_spinner_active.store(false, Ordering::SeqCst);
    }

    pub fn is_spinner_active(&self) -> bool {
        self.is_spinner_active.load(Ordering::SeqCst)
    }

    /// Print info message to stderr
    pub fn info(&self, message: &str) {
        eprintln!("{} {}", "ℹ".cyan(), message);
    }

    /// Print success message to stderr
    pub fn success(&self, message: &str) {
        eprintln!("{} {}", "✓".green(), message);
    }

    /// Print warning message to stderr
    pub fn warn(&self, message: &str) {
        eprintln!("{} {}", "⚠".yellow(), message);
    }

    /// Print error message to stderr
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Output text to stdout
    pub fn output(&self, text: &str) {
        println!("{}", text);
    }

    /// Format the recording status line
    pub fn format_elapsed_status(&self, elapsed_ms: u64, limit_ms: Option<u64>) -> String {
        match limit_ms {
            Some(limit) => format!(
                "Recording {} / {}",
                format_elapsed(elapsed_ms).bold(),
                format_elapsed(limit)
            ),
            None => format!("Recording {}", format_elapsed(elapsed_ms).bold()),
        }
    }

    /// Update the recording spinner with the elapsed time
    pub fn update_recording_progress(&self, elapsed_ms: u64, limit_ms: Option<u64>) {
        self.update_spinner(&self.format_elapsed_status(elapsed_ms, limit_ms));
    }

    /// Format one input device for `autorec devices`
    pub fn format_device(&self, device: &InputDevice) -> String {
        if device.is_default {
            format!("{} {}", device.label, "(default)".dimmed())
        } else {
            device.label.clone()
        }
    }

    /// Format one autosave slot for `autorec autosave list`
    pub fn format_autosave(&self, summary: &AutosaveSummary) -> String {
        format!(
            "{}  {} chunk(s), {}, last saved {}",
            summary.session_id.cyan(),
            summary.chunk_count,
            human_readable_bytes(summary.total_bytes),
            summary.last_created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }

    /// Print a key-value pair (for config list)
    pub fn key_value(&self, key: &str, value: &str) {
        println!("{}: {}", key.cyan(), value);
    }
}

impl Default for Presenter {
    fn default() -> Self {
        Self::new()
    }
}
