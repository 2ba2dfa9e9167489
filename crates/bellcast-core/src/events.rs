//! Status events for the operator interface.
//!
//! The core reports what it is doing (scan progress, connection changes, send
//! outcomes) as [`BellEvent`] values broadcast to any number of subscribers.
//! The wording shown to the operator is left to the UI; events carry the
//! device, counts and error summary it needs.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use bellcast_types::{DeviceDescriptor, TransportKind};

use crate::discovery::ScanSummary;

/// Events emitted by the connectivity core.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum BellEvent {
    /// A scan session began.
    ScanStarted,
    /// A new device was added to the registry.
    DeviceDiscovered { device: DeviceDescriptor },
    /// A scan session ended, by timeout or cancellation.
    ScanCompleted { summary: ScanSummary },
    /// A connect attempt started.
    Connecting { device: DeviceDescriptor },
    /// Connected; `transport` is the one that actually succeeded.
    Connected {
        device: DeviceDescriptor,
        transport: TransportKind,
    },
    /// Both transports failed to connect.
    ConnectionFailed {
        device: DeviceDescriptor,
        error: String,
    },
    /// The active connection was closed.
    Disconnected { device: DeviceDescriptor },
    /// A schedule payload was delivered.
    SendSucceeded {
        device: DeviceDescriptor,
        entry_count: usize,
        transport: TransportKind,
        used_fallback: bool,
    },
    /// A schedule payload could not be delivered.
    SendFailed { entry_count: usize, error: String },
}

impl BellEvent {
    /// Short operator-facing description.
    pub fn summary(&self) -> String {
        match self {
            Self::ScanStarted => "Scanning for bell controllers".to_string(),
            Self::DeviceDiscovered { device } => format!("Found {}", device.display_name),
            Self::ScanCompleted { summary } => {
                let how = if summary.session_duration_elapsed {
                    "finished"
                } else {
                    "stopped"
                };
                format!("Scan {how}: {} device(s)", summary.device_count)
            }
            Self::Connecting { device } => format!("Connecting to {}", device.display_name),
            Self::Connected { device, transport } => {
                format!("Connected to {} over {}", device.display_name, transport)
            }
            Self::ConnectionFailed { device, error } => {
                format!("Could not connect to {}: {}", device.display_name, error)
            }
            Self::Disconnected { device } => format!("Disconnected from {}", device.display_name),
            Self::SendSucceeded {
                device,
                entry_count,
                ..
            } => format!("Sent {entry_count} schedule(s) to {}", device.display_name),
            Self::SendFailed { entry_count, error } => {
                format!("Failed to send {entry_count} schedule(s): {error}")
            }
        }
    }
}

/// Sender for bell events.
pub type EventSender = broadcast::Sender<BellEvent>;

/// Receiver for bell events.
pub type EventReceiver = broadcast::Receiver<BellEvent>;

/// Default broadcast capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: BellEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
