//! Scan command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::debug;

use bellcast_core::BellEvent;

use super::platform_controller;
use crate::cli::OutputFormat;
use crate::config::Config;
use crate::format::{FormatOptions, format_scan_json, format_scan_text};
use crate::util::write_output;

pub async fn cmd_scan(
    timeout: Option<u64>,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
    opts: &FormatOptions,
    config: &Config,
) -> Result<()> {
    let options = config.scan_options(timeout);
    let controller = platform_controller(config, timeout);

    // Live sightings go to stderr so the table or JSON on stdout stays clean.
    let progress = (!quiet && format == OutputFormat::Text).then(|| {
        eprintln!("Scanning for {}s...", options.duration.as_secs());
        let mut rx = controller.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(BellEvent::DeviceDiscovered { device }) => eprintln!("  {}", device),
                    Ok(BellEvent::ScanCompleted { .. }) | Err(RecvError::Closed) => break,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                }
            }
        })
    });

    let result = controller.scan().await;
    if let Some(task) = progress {
        finish_progress(task, result.is_ok()).await;
    }
    let (summary, devices) = result.context("Failed to scan for devices")?;

    let content = match format {
        OutputFormat::Json => format_scan_json(&summary, &devices)?,
        OutputFormat::Text => format_scan_text(&summary, &devices, &options.controller_hints, opts),
    };
    write_output(output, &content)
}

/// Let the progress printer drain after a completed scan, or stop it after a
/// failed one.
async fn finish_progress(task: JoinHandle<()>, drain: bool) {
    if !drain {
        task.abort();
    }
    match task.await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => debug!("Scan progress printer failed: {}", e),
    }
}
