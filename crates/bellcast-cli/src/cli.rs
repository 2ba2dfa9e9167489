//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use bellcast_core::TransportKind;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Transport to try first
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    /// Bluetooth Low Energy
    Le,
    /// Bluetooth Classic serial port
    Classic,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Le => TransportKind::LowEnergy,
            TransportArg::Classic => TransportKind::ClassicSerial,
        }
    }
}

/// Reusable device connection arguments
#[derive(Debug, Clone, Args)]
pub struct DeviceArgs {
    /// Device identifier (BLE address, UUID or serial port), or use BELLCAST_DEVICE env var
    #[arg(short, long, env = "BELLCAST_DEVICE")]
    pub device: Option<String>,

    /// Transport to try first (the other one is tried if it fails)
    #[arg(short, long, value_enum)]
    pub transport: Option<TransportArg>,
}

#[derive(Parser)]
#[command(name = "bellcast")]
#[command(author, version, about = "CLI for Bluetooth school-bell controllers", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for bell controllers over Bluetooth LE and paired serial ports
    Scan {
        /// Scan timeout in seconds (default: config, then 12)
        #[arg(short = 'T', long)]
        timeout: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Send the active bell schedules to a controller
    Send {
        #[command(flatten)]
        device: DeviceArgs,

        /// Schedule file (JSON)
        #[arg(short, long)]
        schedules: Option<PathBuf>,

        /// Print the payload instead of sending it
        #[arg(long)]
        dry_run: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List the schedules in the schedule file
    Schedules {
        /// Schedule file (JSON)
        #[arg(short, long)]
        schedules: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the configuration and the last connected device
    Config {
        /// Print the config file path only
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send_arguments() {
        let cli = Cli::try_parse_from([
            "bellcast",
            "send",
            "--device",
            "/dev/rfcomm0",
            "--transport",
            "classic",
            "--schedules",
            "bells.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Send {
                device, schedules, dry_run, ..
            } => {
                assert_eq!(device.device.as_deref(), Some("/dev/rfcomm0"));
                assert_eq!(device.transport.map(TransportKind::from), Some(TransportKind::ClassicSerial));
                assert_eq!(schedules, Some(PathBuf::from("bells.json")));
                assert!(!dry_run);
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn test_parse_scan_json() {
        let cli = Cli::try_parse_from(["bellcast", "-q", "scan", "-T", "5", "-f", "json"]).unwrap();
        assert!(cli.quiet);
        match cli.command {
            Commands::Scan { timeout, format } => {
                assert_eq!(timeout, Some(5));
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_unknown_transport_rejected() {
        assert!(Cli::try_parse_from(["bellcast", "send", "--transport", "wifi"]).is_err());
    }
}
