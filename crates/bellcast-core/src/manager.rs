//! One-stop controller for operator front ends.
//!
//! [`BellController`] wires a [`TransportSet`] into the discovery engine, the
//! connection coordinator and the schedule transmitter, all sharing a single
//! event dispatcher.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use bellcast_types::{DeviceDescriptor, ScheduleEntry, TransportKind};

use crate::ble::{ConnectionConfig, LowEnergyAdapter};
use crate::coordinator::{ConnectionCoordinator, ConnectionState, FallbackPolicy};
use crate::discovery::{DiscoveryEngine, DiscoveryState, ScanOptions, ScanSession, ScanSummary};
use crate::error::Result;
use crate::events::{DEFAULT_EVENT_CAPACITY, EventDispatcher, EventReceiver};
use crate::serial::{ClassicSerialAdapter, SerialConfig};
use crate::store::{PersistedDeviceHint, ScheduleRepository};
use crate::traits::TransportSet;
use crate::transmitter::{ScheduleTransmitter, TransmissionReport};
use crate::util::identifiers_match;

/// Configuration for the bell controller facade.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Scan session options.
    pub scan: ScanOptions,
    /// Connect fallback policy.
    pub fallback_policy: FallbackPolicy,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default(),
            fallback_policy: FallbackPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Discovery, connection and transmission behind one handle.
pub struct BellController {
    events: EventDispatcher,
    discovery: DiscoveryEngine,
    coordinator: Arc<ConnectionCoordinator>,
    transmitter: ScheduleTransmitter,
}

impl std::fmt::Debug for BellController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BellController")
            .field("discovery", &self.discovery)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl BellController {
    /// Build a controller over the given adapters.
    pub fn new(
        transports: TransportSet,
        hint: Arc<dyn PersistedDeviceHint>,
        config: ControllerConfig,
    ) -> Self {
        let events = EventDispatcher::new(config.event_capacity);
        let discovery = DiscoveryEngine::new(transports.clone(), config.scan, events.clone());
        let coordinator = Arc::new(ConnectionCoordinator::new(
            transports.clone(),
            config.fallback_policy,
            hint,
            events.clone(),
        ));
        let transmitter =
            ScheduleTransmitter::new(Arc::clone(&coordinator), transports, events.clone());
        Self {
            events,
            discovery,
            coordinator,
            transmitter,
        }
    }

    /// Build a controller over the host's Bluetooth radio and serial ports.
    pub fn with_platform_transports(
        hint: Arc<dyn PersistedDeviceHint>,
        config: ControllerConfig,
        connection: ConnectionConfig,
        serial: SerialConfig,
    ) -> Self {
        let transports = TransportSet::new(
            Arc::new(LowEnergyAdapter::new(connection)),
            Arc::new(ClassicSerialAdapter::new(serial)),
        );
        Self::new(transports, hint, config)
    }

    /// Subscribe to status events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The discovery engine.
    pub fn discovery(&self) -> &DiscoveryEngine {
        &self.discovery
    }

    /// The connection coordinator.
    pub fn coordinator(&self) -> &Arc<ConnectionCoordinator> {
        &self.coordinator
    }

    /// Start a scan session.
    pub async fn start_scan(&self) -> Result<ScanSession> {
        self.discovery.start_scan().await
    }

    /// Cut the running scan short.
    pub async fn cancel_scan(&self) -> Option<ScanSummary> {
        self.discovery.cancel_scan().await
    }

    /// Run a full scan session and return the ordered results.
    pub async fn scan(&self) -> Result<(ScanSummary, Vec<DeviceDescriptor>)> {
        let mut session = self.discovery.start_scan().await?;
        let summary = session.wait().await?;
        Ok((summary, self.discovery.snapshot()))
    }

    /// Current scan results.
    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        self.discovery.snapshot()
    }

    /// Whether a scan is running.
    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    /// Connect to a discovered device.
    pub async fn connect(&self, device: &DeviceDescriptor) -> Result<TransportKind> {
        self.coordinator.connect(device).await
    }

    /// Connect by identifier, e.g. one typed by the operator or stored hint.
    ///
    /// The current scan results are searched first (preferring `preferred`
    /// when the id was seen on both transports). Unknown ids get a bare
    /// descriptor whose native transport is `preferred`, or guessed from the
    /// id's shape.
    pub async fn connect_by_id(
        &self,
        id: &str,
        preferred: Option<TransportKind>,
    ) -> Result<TransportKind> {
        let device = self.resolve(id, preferred);
        debug!("Resolved {} to {}", id, device);
        self.coordinator.connect(&device).await
    }

    /// Close the active connection.
    pub async fn disconnect(&self) -> Option<DeviceDescriptor> {
        self.coordinator.disconnect().await
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.coordinator.state()
    }

    /// Observe connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.coordinator.subscribe_state()
    }

    /// Send entries to the connected controller.
    pub async fn send(&self, entries: &[ScheduleEntry]) -> Result<TransmissionReport> {
        self.transmitter.send(entries).await
    }

    /// Send the repository's active entries.
    pub async fn send_active(&self, repository: &dyn ScheduleRepository) -> Result<TransmissionReport> {
        let entries = repository.list_active()?;
        self.transmitter.send(&entries).await
    }

    /// The last device a connection succeeded to, for auto-reconnect.
    pub fn last_connected(&self) -> Option<String> {
        self.coordinator.hint().get_last_connected()
    }

    fn resolve(&self, id: &str, preferred: Option<TransportKind>) -> DeviceDescriptor {
        let mut known: Vec<DeviceDescriptor> = self
            .discovery
            .snapshot()
            .into_iter()
            .filter(|d| identifiers_match(&d.id, id))
            .collect();
        if let Some(kind) = preferred
            && let Some(pos) = known.iter().position(|d| d.transport_kind == kind)
        {
            return known.swap_remove(pos);
        }
        if !known.is_empty() {
            return known.swap_remove(0);
        }
        let kind = preferred.unwrap_or_else(|| guess_transport(id));
        DeviceDescriptor::new(id, id, kind)
    }
}

/// Serial port paths and COM names are classic links; anything else is
/// taken for a BLE address or CoreBluetooth UUID.
fn guess_transport(id: &str) -> TransportKind {
    let upper = id.to_ascii_uppercase();
    let is_com = upper
        .strip_prefix("COM")
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
    if id.starts_with("/dev/") || is_com {
        TransportKind::ClassicSerial
    } else {
        TransportKind::LowEnergy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockFailure, MockTransport, MockTransportBuilder};
    use crate::store::{InMemoryScheduleRepository, MemoryDeviceHint};
    use bellcast_types::IntervalCategory;
    use std::time::Duration;
    use time::macros::time;

    fn controller(le: MockTransportBuilder, classic: MockTransportBuilder) -> (BellController, Arc<MockTransport>, Arc<MockTransport>) {
        let le = Arc::new(le.build());
        let classic = Arc::new(classic.build());
        let controller = BellController::new(
            TransportSet::new(le.clone(), classic.clone()),
            Arc::new(MemoryDeviceHint::new()),
            ControllerConfig::default(),
        );
        (controller, le, classic)
    }

    #[test]
    fn test_guess_transport() {
        assert_eq!(guess_transport("/dev/rfcomm0"), TransportKind::ClassicSerial);
        assert_eq!(guess_transport("COM7"), TransportKind::ClassicSerial);
        assert_eq!(guess_transport("com12"), TransportKind::ClassicSerial);
        assert_eq!(guess_transport("AA:BB:CC:DD:EE:FF"), TransportKind::LowEnergy);
        assert_eq!(guess_transport("COMPASS"), TransportKind::LowEnergy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_then_connect_by_id_uses_registry() {
        let (controller, le, classic) = controller(
            MockTransportBuilder::new(TransportKind::LowEnergy),
            MockTransportBuilder::new(TransportKind::ClassicSerial).sighting(DeviceDescriptor::new(
                "/dev/cu.HC-05",
                "HC-05",
                TransportKind::ClassicSerial,
            )),
        );
        let (summary, devices) = controller.scan().await.unwrap();
        assert_eq!(summary.device_count, 1);
        assert_eq!(devices[0].display_name, "HC-05");

        let transport = controller.connect_by_id("/dev/cu.HC-05", None).await.unwrap();
        assert_eq!(transport, TransportKind::ClassicSerial);
        assert_eq!(classic.connect_count(), 1);
        assert_eq!(le.connect_count(), 0);
        assert_eq!(
            controller.connection_state().device().map(|d| d.display_name.as_str()),
            Some("HC-05")
        );
        assert_eq!(controller.last_connected().as_deref(), Some("/dev/cu.HC-05"));
    }

    #[tokio::test]
    async fn test_send_active_filters_through_repository() {
        let (controller, le, _classic) = controller(
            MockTransportBuilder::new(TransportKind::LowEnergy),
            MockTransportBuilder::new(TransportKind::ClassicSerial),
        );
        controller
            .connect_by_id("AA:BB:CC:DD:EE:FF", None)
            .await
            .unwrap();

        let repo = InMemoryScheduleRepository::new(vec![
            ScheduleEntry::recurring("s1", "First", time!(8:00:00), IntervalCategory::First),
            ScheduleEntry::recurring("s2", "Old", time!(9:00:00), IntervalCategory::Second)
                .active(false),
        ]);
        let report = controller.send_active(&repo).await.unwrap();
        assert_eq!(report.entry_count, 1);
        assert_eq!(le.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_then_send_fails() {
        let (controller, le, _classic) = controller(
            MockTransportBuilder::new(TransportKind::LowEnergy),
            MockTransportBuilder::new(TransportKind::ClassicSerial),
        );
        controller.connect_by_id("A", Some(TransportKind::LowEnergy)).await.unwrap();
        controller.disconnect().await.unwrap();
        assert!(controller.send(&[]).await.is_err());
        assert_eq!(le.write_count(), 0);
    }

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let (controller, _le, _classic) = controller(
            MockTransportBuilder::new(TransportKind::LowEnergy).fail_connect(MockFailure::NotFound),
            MockTransportBuilder::new(TransportKind::ClassicSerial),
        );
        let mut rx = controller.subscribe();
        controller.connect_by_id("A", None).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(first, crate::events::BellEvent::Connecting { .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second,
            crate::events::BellEvent::Connected {
                transport: TransportKind::ClassicSerial,
                ..
            }
        ));
    }
}
