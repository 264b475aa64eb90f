use super::cli::args::{Args, Command};
use super::cli::config::Settings;
use super::commands::{self, Engine};
use crate::core::cancel::{cancel_on_signal, CancelToken};
use crate::core::error_handling::log_error_with_context;
use crate::core::logging::init_logging;
use clap::Parser;
use std::io::IsTerminal;

/// Parse arguments, load settings, initialise logging and run the command.
///
/// Returns the process exit code.
pub async fn startup() -> i32 {
    let args = Args::parse();

    let settings = match Settings::load(&args).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return 2;
        }
    };

    let use_color = settings
        .color
        .unwrap_or_else(|| std::io::stdout().is_terminal());
    colored::control::set_override(use_color);

    let log_file = settings
        .log_file
        .as_ref()
        .map(|p| p.to_string_lossy().to_string());
    if let Err(e) = init_logging(
        settings.log_level.as_deref(),
        settings.log_format.as_deref(),
        log_file.as_deref(),
        use_color,
    ) {
        eprintln!("Failed to initialise logging: {}", e);
        return 2;
    }
    log::debug!("Effective settings: {:?}", settings);

    let engine = match Engine::build(settings) {
        Ok(engine) => engine,
        Err(e) => {
            log_error_with_context(&e, "Engine startup");
            return 1;
        }
    };

    let cancel = CancelToken::new();
    if matches!(args.command, Command::Scan { .. }) {
        cancel_on_signal(cancel.clone());
    }

    match commands::run(&engine, &args.command, &cancel).await {
        Ok(()) => 0,
        Err(e) => {
            log_error_with_context(&e, command_label(&args.command));
            1
        }
    }
}

fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Scan { .. } => "Repository scan",
        Command::Branches { .. } => "Branch listing",
        Command::Cache(_) => "Cache maintenance",
        Command::Stage(_) => "Staging",
    }
}
