use clap::Parser;
use colored::Colorize;

use patchsmith::cli::{Cli, ColorMode, Command};
use patchsmith::commands;
use patchsmith::commands::apply::ApplyCommandOptions;
use patchsmith::commands::paths::PathsCommandOptions;
use patchsmith::commands::stats::StatsCommandOptions;
use patchsmith::error::PatchError;
use patchsmith::merge::Severity;

fn main() {
    let cli = Cli::parse();

    // Configure color output
    match cli.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {}
    }

    // Init tracing
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            std::process::exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<i32, PatchError> {
    match cli.command {
        Command::Apply {
            patch,
            root,
            strip,
            keep_trailing_whitespace,
            backup,
            email,
        } => {
            let worst = commands::apply::run(ApplyCommandOptions {
                patch,
                root,
                strip,
                keep_trailing_whitespace,
                backup,
                email,
                quiet: cli.quiet,
                config_path: cli.config,
            })?;
            // Exit like patch(1): only unapplied hunks are a failure.
            Ok(if worst == Severity::Error { 1 } else { 0 })
        }
        Command::Stats {
            patch,
            strip,
            format,
            email,
        } => {
            commands::stats::run(StatsCommandOptions {
                patch,
                strip,
                format,
                email,
                config_path: cli.config,
            })?;
            Ok(0)
        }
        Command::Paths {
            patch,
            strip,
            format,
            email,
        } => {
            commands::paths::run(PathsCommandOptions {
                patch,
                strip,
                format,
                email,
                config_path: cli.config,
            })?;
            Ok(0)
        }
    }
}
