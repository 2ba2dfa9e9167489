//! Send command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::info;

use bellcast_core::{ScheduleRepository, TransmissionPayload};

use super::platform_controller;
use super::schedules::schedule_path;
use crate::cli::{DeviceArgs, OutputFormat};
use crate::config::{Config, DeviceSource, resolve_device};
use crate::format::{FormatOptions, format_report_json, format_report_text};
use crate::schedules::ScheduleFile;
use crate::style;
use crate::util::write_output;

#[allow(clippy::too_many_arguments)]
pub async fn cmd_send(
    device: DeviceArgs,
    schedules: Option<PathBuf>,
    dry_run: bool,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
    opts: &FormatOptions,
    config: &Config,
) -> Result<()> {
    let file = ScheduleFile::new(schedule_path(schedules, config));
    let entries = file
        .list_active()
        .with_context(|| format!("Failed to read schedules from {}", file.path().display()))?;

    if dry_run {
        let bytes = TransmissionPayload::from_entries(&entries).to_bytes()?;
        return write_output(output, &String::from_utf8_lossy(&bytes));
    }

    if let Some(school) = &config.school_name
        && !quiet
    {
        eprintln!("Sending {} schedule(s) for {}", entries.len(), school);
    }
    if entries.is_empty() && !quiet {
        eprintln!(
            "{}",
            style::format_warning(
                &format!("No active schedules in {}", file.path().display()),
                opts.no_color
            )
        );
    }

    let (id, preferred, source) =
        resolve_device(device.device, device.transport.map(Into::into), config).ok_or_else(|| {
            anyhow!(
                "No device specified. Use --device, set BELLCAST_DEVICE, or set `device` in {}",
                Config::path().display()
            )
        })?;
    if source == DeviceSource::Last && !quiet {
        eprintln!(
            "Using last connected device {}",
            config.last_device_name.as_deref().unwrap_or(&id)
        );
    }

    let controller = platform_controller(config, None);
    let transport = controller
        .connect_by_id(&id, preferred)
        .await
        .with_context(|| format!("Failed to connect to {}", id))?;
    info!("Connected to {} over {}", id, transport);

    let result = controller.send(&entries).await;
    controller.disconnect().await;
    let report = result.context("Failed to send schedules")?;

    let content = match format {
        OutputFormat::Json => format_report_json(&report)?,
        OutputFormat::Text => format_report_text(&report, opts),
    };
    write_output(output, &content)
}
