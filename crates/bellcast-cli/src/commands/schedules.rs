//! Schedules command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::format::{FormatOptions, format_schedules_json, format_schedules_text};
use crate::schedules::ScheduleFile;
use crate::util::write_output;

pub fn cmd_schedules(
    schedules: Option<PathBuf>,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
    config: &Config,
) -> Result<()> {
    let file = ScheduleFile::new(schedule_path(schedules, config));
    let entries = file
        .load()
        .with_context(|| format!("Failed to read schedules from {}", file.path().display()))?;

    let content = match format {
        OutputFormat::Json => format_schedules_json(&entries)?,
        OutputFormat::Text => format_schedules_text(&entries, opts),
    };
    write_output(output, &content)
}

/// Schedule file: argument, then config, then the default location.
pub(super) fn schedule_path(arg: Option<PathBuf>, config: &Config) -> PathBuf {
    arg.or_else(|| config.schedules.clone())
        .unwrap_or_else(ScheduleFile::default_path)
}
