//! Output formatting for text and JSON output.

use anyhow::Result;
use serde::Serialize;
use tabled::{Table, Tabled};

use bellcast_core::{DeviceDescriptor, ScanSummary, ScheduleEntry, TransmissionReport};
use bellcast_types::matches_controller_hint;

use crate::style;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool) -> Self {
        Self { no_color }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(format!("{}\n", serde_json::to_string_pretty(value)?))
}

#[must_use]
pub fn format_scan_text(
    summary: &ScanSummary,
    devices: &[DeviceDescriptor],
    hints: &[String],
    opts: &FormatOptions,
) -> String {
    let cut_short = if summary.session_duration_elapsed {
        ""
    } else {
        " (scan stopped early)"
    };
    if devices.is_empty() {
        return format!("No bell controllers found{}.\n", cut_short);
    }

    #[derive(Tabled)]
    struct DeviceRow {
        #[tabled(rename = "#")]
        index: usize,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Transport")]
        transport: String,
        #[tabled(rename = "Signal")]
        signal: String,
        #[tabled(rename = "Identifier")]
        identifier: String,
    }

    let rows: Vec<DeviceRow> = devices
        .iter()
        .enumerate()
        .map(|(i, d)| DeviceRow {
            index: i + 1,
            name: style::format_name(
                &d.display_name,
                matches_controller_hint(&d.display_name, hints),
                opts.no_color,
            ),
            transport: d.transport_kind.to_string(),
            signal: style::format_signal(d.signal_strength, opts.no_color),
            identifier: d.id.clone(),
        })
        .collect();

    let mut table = Table::new(rows);
    style::apply_table_style(&mut table, opts.no_color);

    format!(
        "Found {} device(s) in {:.1}s{}\n\n{}\n",
        devices.len(),
        summary.elapsed.as_secs_f64(),
        cut_short,
        table
    )
}

pub fn format_scan_json(summary: &ScanSummary, devices: &[DeviceDescriptor]) -> Result<String> {
    #[derive(Serialize)]
    struct ScanResult<'a> {
        summary: &'a ScanSummary,
        devices: &'a [DeviceDescriptor],
    }

    to_json(&ScanResult { summary, devices })
}

#[must_use]
pub fn format_report_text(report: &TransmissionReport, opts: &FormatOptions) -> String {
    let mut output = style::format_success(
        &format!(
            "Sent {} schedule(s) ({} bytes) to {} over {}",
            report.entry_count, report.bytes_written, report.device.display_name, report.transport
        ),
        opts.no_color,
    );
    output.push('\n');
    if report.used_fallback {
        output.push_str(&style::format_warning(
            &format!(
                "{} write failed, delivered over {} instead",
                report.transport.alternate(),
                report.transport
            ),
            opts.no_color,
        ));
        output.push('\n');
    }
    output
}

pub fn format_report_json(report: &TransmissionReport) -> Result<String> {
    to_json(report)
}

#[must_use]
pub fn format_schedules_text(entries: &[ScheduleEntry], opts: &FormatOptions) -> String {
    if entries.is_empty() {
        return "No schedules.\n".to_string();
    }

    #[derive(Tabled)]
    struct ScheduleRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Repeats")]
        repeats: String,
        #[tabled(rename = "Interval")]
        interval: String,
        #[tabled(rename = "Active")]
        active: String,
    }

    let rows: Vec<ScheduleRow> = entries
        .iter()
        .map(|e| ScheduleRow {
            id: e.id.clone(),
            name: style::format_name(&e.name, false, opts.no_color),
            time: e.time_string(),
            repeats: if e.is_recurring {
                "daily".to_string()
            } else {
                e.date_string().unwrap_or_default()
            },
            interval: e.interval_category.to_string(),
            active: if e.is_active { "yes" } else { "no" }.to_string(),
        })
        .collect();

    let active = entries.iter().filter(|e| e.is_active).count();
    let mut table = Table::new(rows);
    style::apply_table_style(&mut table, opts.no_color);
    format!("{} schedule(s), {} active\n\n{}\n", entries.len(), active, table)
}

pub fn format_schedules_json(entries: &[ScheduleEntry]) -> Result<String> {
    to_json(&entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bellcast_core::{IntervalCategory, TransportKind};
    use std::time::Duration;
    use time::macros::time;

    fn summary(count: usize, elapsed: bool) -> ScanSummary {
        ScanSummary {
            device_count: count,
            session_duration_elapsed: elapsed,
            elapsed: Duration::from_secs(12),
        }
    }

    fn plain() -> FormatOptions {
        FormatOptions::new(true)
    }

    #[test]
    fn test_scan_text_empty() {
        let text = format_scan_text(&summary(0, true), &[], &[], &plain());
        assert_eq!(text, "No bell controllers found.\n");

        let text = format_scan_text(&summary(0, false), &[], &[], &plain());
        assert!(text.contains("stopped early"));
    }

    #[test]
    fn test_scan_text_lists_devices_in_order() {
        let devices = vec![
            DeviceDescriptor::new("/dev/rfcomm0", "HC-05 Bell", TransportKind::ClassicSerial),
            DeviceDescriptor::new("AA:BB:CC:DD:EE:FF", "Speaker", TransportKind::LowEnergy)
                .with_signal_strength(-55),
        ];
        let hints = vec!["hc-05".to_string()];
        let text = format_scan_text(&summary(2, true), &devices, &hints, &plain());

        assert!(text.starts_with("Found 2 device(s) in 12.0s\n"));
        let bell = text.find("HC-05 Bell").unwrap();
        let speaker = text.find("Speaker").unwrap();
        assert!(bell < speaker);
        assert!(text.contains("Bluetooth Classic (serial)"));
        assert!(text.contains("-55"));
    }

    #[test]
    fn test_scan_json_shape() {
        let devices = vec![DeviceDescriptor::new("A", "Bell", TransportKind::LowEnergy)];
        let json = format_scan_json(&summary(1, true), &devices).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["device_count"], 1);
        assert_eq!(value["devices"][0]["transport_kind"], "low_energy");
    }

    #[test]
    fn test_report_text_mentions_fallback() {
        let report = TransmissionReport {
            device: DeviceDescriptor::new("B", "HC-05 Bell", TransportKind::LowEnergy),
            transport: TransportKind::ClassicSerial,
            used_fallback: true,
            entry_count: 3,
            bytes_written: 240,
        };
        let text = format_report_text(&report, &plain());
        assert!(text.starts_with("[OK] Sent 3 schedule(s) (240 bytes) to HC-05 Bell"));
        assert!(text.contains("[!!] Bluetooth LE write failed"));
    }

    #[test]
    fn test_schedules_text_counts_active() {
        let entries = vec![
            ScheduleEntry::recurring("s1", "Period 1", time!(8:15:00), IntervalCategory::First),
            ScheduleEntry::recurring("s2", "Lunch", time!(12:00:00), IntervalCategory::Lunch)
                .active(false),
        ];
        let text = format_schedules_text(&entries, &plain());
        assert!(text.starts_with("2 schedule(s), 1 active\n"));
        assert!(text.contains("08:15:00"));
        assert!(text.contains("daily"));
    }
}
