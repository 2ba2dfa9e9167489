//! Error types for bellcast-core.
//!
//! This module defines every error the connectivity core can surface, from
//! the caller-facing taxonomy (scan already running, not connected, ...) down
//! to the transport failures carried as their cause.
//!
//! # Caller-facing errors
//!
//! | Error | Raised by | Caller action |
//! |-------|-----------|---------------|
//! | [`Error::SubsystemUnavailable`] | scan, adapters | Ask the operator to enable Bluetooth |
//! | [`Error::AlreadyScanning`] | `DiscoveryEngine::start_scan` | Wait for the running session |
//! | [`Error::AlreadyConnected`] | `ConnectionCoordinator::connect` | Disconnect first |
//! | [`Error::ConnectionFailed`] | `ConnectionCoordinator::connect` | Offer a retry |
//! | [`Error::NotConnected`] | `ScheduleTransmitter::send` | Connect first |
//! | [`Error::TransmissionFailed`] | `ScheduleTransmitter::send` | Offer a retry |
//!
//! # Transport errors
//!
//! Adapters report the remaining variants ([`Error::Bluetooth`],
//! [`Error::Serial`], [`Error::Timeout`], [`Error::WriteFailed`], ...). The
//! coordinator and transmitter wrap the last one they saw as the `cause` of a
//! `ConnectionFailed` / `TransmissionFailed`, so nothing is reported without
//! its underlying reason.
//!
//! No layer of the core retries on its own. Connect and send each try the
//! native transport and then the alternate one exactly once; whether to try
//! again is left to the operator.

use std::time::Duration;

use thiserror::Error;

use bellcast_types::{DeviceDescriptor, TransportKind};

/// Errors that can occur while discovering, connecting to, or writing to a
/// bell controller.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The radio is disabled, missing, or access was denied.
    #[error("{transport} unavailable: {reason}")]
    SubsystemUnavailable {
        /// Transport whose subsystem is unavailable.
        transport: TransportKind,
        /// Why it is unavailable.
        reason: String,
    },

    /// A scan session is already running.
    #[error("A scan is already in progress")]
    AlreadyScanning,

    /// A connection is active or being established.
    #[error("Already connected or connecting to a device")]
    AlreadyConnected,

    /// Both the native and the alternate transport failed to connect.
    #[error("Could not connect to {device}: {cause}")]
    ConnectionFailed {
        /// The device that could not be reached.
        device: Box<DeviceDescriptor>,
        /// The last transport error seen.
        #[source]
        cause: Box<Error>,
    },

    /// Operation requires an active connection.
    #[error("Not connected to a bell controller")]
    NotConnected,

    /// Both the active and the alternate transport failed to write.
    #[error("Schedule transmission failed: {cause}")]
    TransmissionFailed {
        /// The last transport error seen.
        #[source]
        cause: Box<Error>,
    },

    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Serial port error from the classic transport.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Device not known to the transport.
    #[error("Device '{identifier}' not found on {transport}")]
    DeviceNotFound {
        /// Identifier that was looked up.
        identifier: String,
        /// Transport that was searched.
        transport: TransportKind,
    },

    /// The peripheral has no characteristic the payload can be written to.
    #[error("Device '{0}' exposes no writable serial characteristic")]
    NoWritableCharacteristic(String),

    /// Operation timed out inside an adapter.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// A write was rejected or interrupted.
    #[error("Write to '{device_id}' failed: {reason}")]
    WriteFailed {
        /// Device the write was addressed to.
        device_id: String,
        /// Transport-reported reason.
        reason: String,
    },

    /// The payload could not be serialized.
    #[error("Failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse classification of an [`Error`] for UI decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    SubsystemUnavailable,
    AlreadyScanning,
    AlreadyConnected,
    ConnectionFailed,
    NotConnected,
    TransmissionFailed,
    /// Any transport-level failure.
    Transport,
    Configuration,
}

impl Error {
    /// Create a subsystem-unavailable error.
    pub fn unavailable(transport: TransportKind, reason: impl Into<String>) -> Self {
        Self::SubsystemUnavailable {
            transport,
            reason: reason.into(),
        }
    }

    /// Create a device not found error.
    pub fn device_not_found(identifier: impl Into<String>, transport: TransportKind) -> Self {
        Self::DeviceNotFound {
            identifier: identifier.into(),
            transport,
        }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a write failure.
    pub fn write_failed(device_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            device_id: device_id.into(),
            reason: reason.into(),
        }
    }

    /// Wrap the last transport error of a failed connect.
    pub fn connection_failed(device: DeviceDescriptor, cause: Error) -> Self {
        Self::ConnectionFailed {
            device: Box::new(device),
            cause: Box::new(cause),
        }
    }

    /// Wrap the last transport error of a failed send.
    pub fn transmission_failed(cause: Error) -> Self {
        Self::TransmissionFailed {
            cause: Box::new(cause),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SubsystemUnavailable { .. } => ErrorKind::SubsystemUnavailable,
            Self::AlreadyScanning => ErrorKind::AlreadyScanning,
            Self::AlreadyConnected => ErrorKind::AlreadyConnected,
            Self::ConnectionFailed { .. } => ErrorKind::ConnectionFailed,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::TransmissionFailed { .. } => ErrorKind::TransmissionFailed,
            Self::InvalidConfig(_) => ErrorKind::Configuration,
            _ => ErrorKind::Transport,
        }
    }

    /// Whether this error means the device simply could not be reached.
    ///
    /// Used by [`crate::FallbackPolicy::UnreachableOnly`]: permission and
    /// configuration problems are not worth retrying on the other transport.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::DeviceNotFound { .. }
            | Self::Timeout { .. }
            | Self::NoWritableCharacteristic(_)
            | Self::SubsystemUnavailable { .. } => true,
            Self::Bluetooth(e) => !matches!(e, btleplug::Error::PermissionDenied),
            Self::Serial(e) => matches!(
                e.kind,
                serialport::ErrorKind::NoDevice | serialport::ErrorKind::Io(_)
            ),
            Self::Io(e) => e.kind() != std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }
}

/// Result type alias using bellcast-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
