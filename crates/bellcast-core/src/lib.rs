//! Connectivity core for Bluetooth school-bell controllers.
//!
//! This crate finds bell controllers over two incompatible Bluetooth
//! transports, keeps a single connection to one of them, and pushes the bell
//! schedule to it.
//!
//! # Features
//!
//! - **Dual-transport discovery**: BLE serial bridges (HM-10, HC-08) and
//!   classic SPP modules (HC-05, HC-06) scanned concurrently under one timer
//! - **Prioritized results**: likely controllers are listed first
//! - **Connection fallback**: native transport first, then the other one
//! - **Schedule upload**: one newline-terminated JSON line per send, with a
//!   single fallback write
//! - **Status events**: broadcast [`BellEvent`]s for the operator interface
//! - **Testing without hardware**: [`MockTransport`] stands in for either radio
//!
//! # Transports
//!
//! | Transport | Adapter | Discovery | Signal strength |
//! |-----------|---------|-----------|-----------------|
//! | Bluetooth LE | [`LowEnergyAdapter`] (btleplug) | Stream of advertisements | Yes |
//! | Bluetooth Classic | [`ClassicSerialAdapter`] (serialport) | Batch of paired serial ports | No |
//!
//! Classic controllers must be paired with the operating system first; they
//! then show up as serial ports (`/dev/rfcomm0`, `/dev/cu.HC-05-DevB`,
//! `COM7`).
//!
//! # Platform Differences
//!
//! - **macOS**: BLE devices are identified by a CoreBluetooth UUID that is
//!   stable per Mac but not across machines.
//! - **Linux/Windows**: BLE devices are identified by their MAC address.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use bellcast_core::{BellController, ConnectionConfig, ControllerConfig, MemoryDeviceHint, SerialConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = BellController::with_platform_transports(
//!         Arc::new(MemoryDeviceHint::new()),
//!         ControllerConfig::default(),
//!         ConnectionConfig::default(),
//!         SerialConfig::default(),
//!     );
//!
//!     let (summary, devices) = controller.scan().await?;
//!     println!("Found {} devices", summary.device_count);
//!
//!     if let Some(device) = devices.first() {
//!         controller.connect(device).await?;
//!         controller.send(&[]).await?;
//!         controller.disconnect().await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod events;
pub mod manager;
pub mod mock;
pub mod payload;
pub mod registry;
pub mod serial;
pub mod store;
pub mod traits;
pub mod transmitter;
pub mod util;

// Core exports
pub use ble::{ConnectionConfig, LowEnergyAdapter};
pub use coordinator::{ConnectionCoordinator, ConnectionState, FallbackPolicy};
pub use discovery::{DiscoveryEngine, DiscoveryState, ScanOptions, ScanSession, ScanSummary};
pub use error::{Error, ErrorKind, Result};
pub use events::{BellEvent, EventDispatcher, EventReceiver, EventSender};
pub use manager::{BellController, ControllerConfig};
pub use mock::{MockFailure, MockTransport, MockTransportBuilder};
pub use payload::{TransmissionPayload, WireSchedule};
pub use registry::DeviceRegistry;
pub use serial::{ClassicSerialAdapter, SerialConfig};
pub use store::{InMemoryScheduleRepository, MemoryDeviceHint, PersistedDeviceHint, ScheduleRepository};
pub use traits::{DiscoveryCallback, ScanHandle, SharedTransport, TransportAdapter, TransportSet};
pub use transmitter::{ScheduleTransmitter, TransmissionReport};

// Re-export from bellcast-types
pub use bellcast_types::{
    DeviceDescriptor, IntervalCategory, ScheduleEntry, SignalQuality, TransportKind,
};
