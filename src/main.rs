use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use semindex::cli::{Cli, Commands};
use semindex::commands::index::{InterruptAction, InterruptHandler, EXIT_INTERRUPTED};
use semindex::config::Config;
use semindex::logging::{init_early_logging, init_logging};
use semindex::metrics;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let config = match Config::load(&working_dir) {
        Ok(config) => config,
        Err(e) => {
            init_early_logging();
            tracing::error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    // Held until exit so buffered log lines are flushed
    let _logging_guard = match init_logging(&config.logging, &working_dir, cli.verbose()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    metrics::register_metrics();

    let cancel = CancellationToken::new();
    let interrupts = InterruptHandler::new(cancel.clone());
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match interrupts.on_signal() {
                InterruptAction::Drain => {
                    eprintln!("Interrupt received; finishing in-flight files (press Ctrl-C again to abort)");
                }
                InterruptAction::ForceExit => {
                    eprintln!("Second interrupt; aborting");
                    std::process::exit(i32::from(EXIT_INTERRUPTED));
                }
            }
        }
    });

    let result = match cli.command {
        Commands::Index(args) => semindex::commands::index::run(args, config, cancel).await,
        Commands::Search(args) => semindex::commands::search::run(args, config)
            .await
            .map(|_| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
