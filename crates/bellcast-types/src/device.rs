//! Discovered-device records and controller name hints.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Name fragments that identify likely bell controllers.
///
/// Matching is a case-insensitive substring test. HC-05/HC-06 are the
/// classic serial modules the controllers ship with, HM-10 the low-energy
/// variant, and "bell" catches renamed units ("School Bell", "Bell Ctl").
pub const DEFAULT_CONTROLLER_HINTS: &[&str] = &["hc-05", "hc-06", "hm-10", "bell"];

/// Check a display name against a hint allow-list.
///
/// # Examples
///
/// ```
/// use bellcast_types::device::{matches_controller_hint, DEFAULT_CONTROLLER_HINTS};
///
/// assert!(matches_controller_hint("HC-05 Bell Controller", DEFAULT_CONTROLLER_HINTS));
/// assert!(matches_controller_hint("my school BELL", DEFAULT_CONTROLLER_HINTS));
/// assert!(!matches_controller_hint("Unknown Device", DEFAULT_CONTROLLER_HINTS));
/// ```
#[must_use]
pub fn matches_controller_hint<S: AsRef<str>>(name: &str, hints: &[S]) -> bool {
    let name_lower = name.to_lowercase();
    hints
        .iter()
        .map(|h| h.as_ref().to_lowercase())
        .any(|h| !h.is_empty() && name_lower.contains(&h))
}

/// The two incompatible short-range transport families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TransportKind {
    /// Advertisement-based discovery with per-sighting signal strength.
    LowEnergy,
    /// Pairing-based serial link, batch discovery, no signal strength.
    ClassicSerial,
}

impl TransportKind {
    /// The other transport family.
    #[must_use]
    pub fn alternate(self) -> Self {
        match self {
            TransportKind::LowEnergy => TransportKind::ClassicSerial,
            TransportKind::ClassicSerial => TransportKind::LowEnergy,
        }
    }

    /// Short tag used in config files and command lines.
    #[must_use]
    pub fn as_tag(&self) -> &'static str {
        match self {
            TransportKind::LowEnergy => "le",
            TransportKind::ClassicSerial => "classic",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::LowEnergy => write!(f, "Bluetooth LE"),
            TransportKind::ClassicSerial => write!(f, "Bluetooth Classic (serial)"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "le" | "ble" | "low_energy" | "lowenergy" => Ok(TransportKind::LowEnergy),
            "classic" | "serial" | "spp" | "classic_serial" => Ok(TransportKind::ClassicSerial),
            _ => Err(ParseError::UnknownTransport(s.to_string())),
        }
    }
}

/// Signal strength quality levels based on RSSI values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SignalQuality {
    /// Signal too weak for reliable operation (< -85 dBm).
    Poor,
    /// Usable but may have issues (-85 to -75 dBm).
    Fair,
    /// Good signal strength (-75 to -60 dBm).
    Good,
    /// Excellent signal strength (> -60 dBm).
    Excellent,
}

impl SignalQuality {
    /// Determine signal quality from RSSI value in dBm.
    pub fn from_rssi(rssi: i16) -> Self {
        match rssi {
            r if r > -60 => SignalQuality::Excellent,
            r if r > -75 => SignalQuality::Good,
            r if r > -85 => SignalQuality::Fair,
            _ => SignalQuality::Poor,
        }
    }

    /// Get a human-readable description of the signal quality.
    pub fn description(&self) -> &'static str {
        match self {
            SignalQuality::Excellent => "Excellent signal",
            SignalQuality::Good => "Good signal",
            SignalQuality::Fair => "Fair signal - connection may be unstable",
            SignalQuality::Poor => "Poor signal - consider moving closer",
        }
    }
}

/// A device seen during a scan session.
///
/// Identity is `(transport_kind, id)`: the same id reported by both
/// transports yields two distinct descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceDescriptor {
    /// Opaque transport-scoped identifier (MAC, CoreBluetooth UUID, port path).
    pub id: String,
    /// Name shown to the operator.
    pub display_name: String,
    /// RSSI in dBm; `None` for transports that don't report it.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub signal_strength: Option<i16>,
    /// Transport that reported the sighting.
    pub transport_kind: TransportKind,
}

impl DeviceDescriptor {
    /// Create a descriptor without a signal reading.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        transport_kind: TransportKind,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            signal_strength: None,
            transport_kind,
        }
    }

    /// Attach an RSSI reading.
    #[must_use]
    pub fn with_signal_strength(mut self, rssi: i16) -> Self {
        self.signal_strength = Some(rssi);
        self
    }

    /// The deduplication key.
    #[must_use]
    pub fn key(&self) -> (TransportKind, &str) {
        (self.transport_kind, self.id.as_str())
    }

    /// Signal quality, when the transport reports strength.
    #[must_use]
    pub fn signal_quality(&self) -> Option<SignalQuality> {
        self.signal_strength.map(SignalQuality::from_rssi)
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.display_name, self.id, self.transport_kind.as_tag())
    }
}
