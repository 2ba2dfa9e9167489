//! Schedule delivery to the connected controller.
//!
//! A send builds the wire payload from the caller's entries before any I/O,
//! writes it through the transport the coordinator recorded as active, and on
//! failure makes exactly one more attempt through the other transport with
//! the same device id. Nothing is retried beyond that.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use bellcast_types::{DeviceDescriptor, ScheduleEntry, TransportKind};

use crate::coordinator::ConnectionCoordinator;
use crate::error::{Error, Result};
use crate::events::{BellEvent, EventDispatcher};
use crate::payload::TransmissionPayload;
use crate::traits::TransportSet;

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmissionReport {
    /// Device the payload was delivered to.
    pub device: DeviceDescriptor,
    /// Transport whose write succeeded.
    pub transport: TransportKind,
    /// Whether the active transport failed and the alternate delivered.
    pub used_fallback: bool,
    /// Entries carried.
    pub entry_count: usize,
    /// Bytes written, including the trailing newline.
    pub bytes_written: usize,
}

/// Writes schedule payloads through the active connection.
#[derive(Debug)]
pub struct ScheduleTransmitter {
    coordinator: Arc<ConnectionCoordinator>,
    transports: TransportSet,
    events: EventDispatcher,
}

impl ScheduleTransmitter {
    /// Create a transmitter bound to a coordinator.
    pub fn new(
        coordinator: Arc<ConnectionCoordinator>,
        transports: TransportSet,
        events: EventDispatcher,
    ) -> Self {
        Self {
            coordinator,
            transports,
            events,
        }
    }

    /// Send `entries` to the connected controller, in the order given.
    ///
    /// Fails with [`Error::NotConnected`] without writing anything unless the
    /// coordinator is `Connected`, and with [`Error::TransmissionFailed`] when
    /// both the active and the alternate write fail. The alternate is only
    /// tried while the same device is still connected.
    #[tracing::instrument(level = "info", skip_all, fields(entries = entries.len()))]
    pub async fn send(&self, entries: &[ScheduleEntry]) -> Result<TransmissionReport> {
        let entry_count = entries.len();
        let Some((device, active)) = self.coordinator.active() else {
            self.events.send(BellEvent::SendFailed {
                entry_count,
                error: Error::NotConnected.to_string(),
            });
            return Err(Error::NotConnected);
        };

        let bytes = TransmissionPayload::from_entries(entries).to_bytes()?;

        let mut last_error = None;
        for (attempt, (kind, transport)) in self.transports.ordered_from(active).into_iter().enumerate() {
            let used_fallback = attempt > 0;
            if used_fallback {
                // The link may have been closed or replaced while the first write ran.
                let still_active = self
                    .coordinator
                    .active()
                    .is_some_and(|(current, _)| current.id == device.id);
                if !still_active {
                    warn!("Connection to {} closed during send, not retrying", device);
                    last_error = Some(Error::NotConnected);
                    break;
                }
                info!("Retrying write over {}", kind);
            }
            match transport.write(&device.id, &bytes).await {
                Ok(()) => {
                    info!(
                        "Sent {} schedule(s), {} bytes, over {}",
                        entry_count,
                        bytes.len(),
                        kind
                    );
                    self.events.send(BellEvent::SendSucceeded {
                        device: device.clone(),
                        entry_count,
                        transport: kind,
                        used_fallback,
                    });
                    return Ok(TransmissionReport {
                        device,
                        transport: kind,
                        used_fallback,
                        entry_count,
                        bytes_written: bytes.len(),
                    });
                }
                Err(e) => {
                    warn!("{} write failed: {}", kind, e);
                    last_error = Some(e);
                }
            }
        }

        let cause = last_error.unwrap_or_else(|| Error::write_failed(&device.id, "no transport attempted"));
        self.events.send(BellEvent::SendFailed {
            entry_count,
            error: cause.to_string(),
        });
        Err(Error::transmission_failed(cause))
    }
}
