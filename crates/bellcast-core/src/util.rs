//! Utility functions for bellcast-core.
//!
//! This module contains identifier helpers shared by the two adapters.

use btleplug::platform::PeripheralId;

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats. This function extracts the useful
/// identifier string.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Create an identifier string from an address and peripheral ID.
///
/// On macOS where addresses are 00:00:00:00:00:00, uses the peripheral ID.
/// On other platforms, uses the Bluetooth address.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if is_null_address(address) {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

fn is_null_address(address: &str) -> bool {
    address == "00:00:00:00:00:00"
}

/// Derive an operator-facing name from a serial port path.
///
/// `/dev/cu.HC-05-DevB` becomes `HC-05-DevB`, `/dev/rfcomm0` becomes
/// `rfcomm0`, and Windows names such as `COM7` are kept as-is.
pub fn serial_display_name(port_name: &str) -> String {
    let base = port_name.rsplit('/').next().unwrap_or(port_name);
    let base = base
        .strip_prefix("cu.")
        .or_else(|| base.strip_prefix("tty."))
        .unwrap_or(base);
    if base.is_empty() {
        port_name.to_string()
    } else {
        base.to_string()
    }
}

/// Whether an identifier the operator typed refers to `candidate`.
///
/// Comparison ignores case and, for MAC-style addresses, separators.
pub fn identifiers_match(candidate: &str, wanted: &str) -> bool {
    if candidate.eq_ignore_ascii_case(wanted) {
        return true;
    }
    let strip = |s: &str| s.replace([':', '-'], "").to_lowercase();
    !is_null_address(candidate) && strip(candidate) == strip(wanted)
}
