//! autorec CLI entry point

use std::process::ExitCode;

use clap::Parser;

use autorec::cli::{
    app::{
        load_merged_config, resolve_record_options, run_autosave_clear, run_autosave_list,
        run_devices, run_record, run_recover, EXIT_ERROR, EXIT_USAGE_ERROR,
    },
    args::{AutosaveAction, Cli, Commands},
    config_cmd::handle_config_command,
    logging,
    presenter::Presenter,
};
use autorec::domain::config::AppConfig;
use autorec::infrastructure::XdgConfigStore;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let presenter = Presenter::new();

    // Build CLI config and the optional duration limit from args
    let (cli_config, duration, action) = match cli.command {
        Commands::Config { action } => {
            let store = XdgConfigStore::new();
            if let Err(e) = handle_config_command(action, &store, &presenter).await {
                presenter.error(&e.to_string());
                return ExitCode::from(EXIT_ERROR);
            }
            return ExitCode::SUCCESS;
        }
        Commands::Devices => return run_devices().await,
        Commands::Record(args) => {
            let cli_config = AppConfig {
                device: args.device,
                format: args.format.map(|f| autorec::domain::AudioFormat::from(f).to_string()),
                chunk_interval: args.chunk_interval,
                session_id: args.session,
                output_dir: args.output_dir.map(|p| p.to_string_lossy().into_owned()),
                ..Default::default()
            };
            (cli_config, args.duration, Route::Record)
        }
        Commands::Recover(args) => {
            let cli_config = AppConfig {
                session_id: args.session,
                output_dir: args.output_dir.map(|p| p.to_string_lossy().into_owned()),
                ..Default::default()
            };
            (cli_config, None, Route::Recover { clear: args.clear })
        }
        Commands::Autosave { action } => match action {
            AutosaveAction::List { json } => (AppConfig::empty(), None, Route::List { json }),
            AutosaveAction::Clear { session } => {
                let cli_config = AppConfig {
                    session_id: session,
                    ..Default::default()
                };
                (cli_config, None, Route::Clear)
            }
        },
    };

    // Merge config
    let config = load_merged_config(cli_config).await;

    let options = match resolve_record_options(&config, duration.as_deref()) {
        Ok(options) => options,
        Err(e) => {
            presenter.error(&e);
            return ExitCode::from(EXIT_USAGE_ERROR);
        }
    };

    match action {
        Route::Record => run_record(options).await,
        Route::Recover { clear } => run_recover(options, clear).await,
        Route::List { json } => run_autosave_list(options, json).await,
        Route::Clear => run_autosave_clear(options).await,
    }
}

/// Subcommands that run on merged config
enum Route {
    Record,
    Recover { clear: bool },
    List { json: bool },
    Clear,
}
