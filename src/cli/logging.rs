//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Default filter directive for a verbosity count
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "autorec=warn",
        1 => "autorec=info",
        _ => "autorec=debug",
    }
}

/// Install the global subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over the verbosity flags.
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // A second init (e.g. in tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
