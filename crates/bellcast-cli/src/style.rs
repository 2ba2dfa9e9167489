//! Terminal styling helpers.

use bellcast_core::SignalQuality;
use owo_colors::OwoColorize;
use tabled::Table;
use tabled::settings::Style;

/// Signal column for a sighting: bar and dBm colored by quality, or "N/A" for serial
/// ports, which report no RSSI.
pub fn format_signal(rssi: Option<i16>, no_color: bool) -> String {
    let Some(rssi) = rssi else {
        return "N/A".to_string();
    };

    // -30 dBm fills all 10 blocks, -100 dBm none
    let filled = ((rssi + 100).clamp(0, 70) as f32 / 7.0).round() as usize;
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled));
    let label = format!("{} dBm", rssi);

    if no_color {
        return format!("{} {}", bar, label);
    }
    match SignalQuality::from_rssi(rssi) {
        SignalQuality::Excellent | SignalQuality::Good => format!("{} {}", bar.green(), label),
        SignalQuality::Fair => format!("{} {}", bar.yellow(), label),
        SignalQuality::Poor => format!("{} {}", bar.red(), label),
    }
}

/// Format a success message.
pub fn format_success(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[OK] {}", message)
    } else {
        format!("{} {}", "[OK]".green(), message)
    }
}

/// Format a warning message.
pub fn format_warning(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[!!] {}", message)
    } else {
        format!("{} {}", "[!!]".yellow(), message)
    }
}

/// Highlight a device or entry name.
pub fn format_name(name: &str, highlight: bool, no_color: bool) -> String {
    match (highlight, no_color) {
        (_, true) => name.to_string(),
        (true, false) => format!("{}", name.green().bold()),
        (false, false) => format!("{}", name.cyan()),
    }
}

pub fn apply_table_style(table: &mut Table, no_color: bool) {
    if no_color {
        table.with(Style::ascii());
    } else {
        table.with(Style::rounded());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_plain() {
        assert_eq!(format_signal(None, true), "N/A");
        assert_eq!(format_signal(Some(-30), true), "██████████ -30 dBm");
        assert_eq!(format_signal(Some(-100), true), "░░░░░░░░░░ -100 dBm");
        assert_eq!(format_signal(Some(-65), true), "█████░░░░░ -65 dBm");
    }

    #[test]
    fn test_plain_messages() {
        assert_eq!(format_success("Sent", true), "[OK] Sent");
        assert_eq!(format_warning("Careful", true), "[!!] Careful");
        assert_eq!(format_name("HC-05", true, true), "HC-05");
    }
}
