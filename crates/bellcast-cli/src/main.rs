//! Command-line interface for Bluetooth school-bell controllers.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scan` | Scan for bell controllers over BLE and paired serial ports |
//! | `send` | Send the active schedules to a controller |
//! | `schedules` | List the schedule file |
//! | `config` | Show the configuration file |
//! | `completions` | Generate shell completions |
//!
//! # Configuration
//!
//! Settings live in `~/.config/bellcast/config.toml` (or platform
//! equivalent). `send` records the device it reached there, so the next
//! `send` without `--device` goes to the same controller over the same
//! transport.
//!
//! # Environment Variables
//!
//! - `BELLCAST_DEVICE`: Default device identifier (overridden by `--device`)
//! - `NO_COLOR`: Disable colored output when set

mod cli;
mod commands;
mod config;
mod format;
mod schedules;
mod style;
mod util;

use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::{cmd_config, cmd_scan, cmd_schedules, cmd_send};
use crate::config::Config;
use crate::format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "bellcast", &mut io::stdout());
        return Ok(());
    }

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = Config::load();
    let opts = FormatOptions::new(cli.no_color || config.no_color);
    let output = cli.output.as_ref();

    match cli.command {
        Commands::Scan { timeout, format } => {
            cmd_scan(timeout, format, output, cli.quiet, &opts, &config).await
        }
        Commands::Send {
            device,
            schedules,
            dry_run,
            format,
        } => {
            cmd_send(
                device, schedules, dry_run, format, output, cli.quiet, &opts, &config,
            )
            .await
        }
        Commands::Schedules { schedules, format } => {
            cmd_schedules(schedules, format, output, &opts, &config)
        }
        Commands::Config { path } => cmd_config(path, output, &config),
        Commands::Completions { .. } => Ok(()),
    }
}
