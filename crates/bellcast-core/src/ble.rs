//! Bluetooth Low Energy transport.
//!
//! This module drives BLE serial-bridge modules (HM-10, HC-08, ESP32 UART
//! services) through btleplug. Discovery follows the central event stream so
//! sightings reach the registry while the scan is still running; writes go to
//! the bridge's UART characteristic in ATT-sized chunks.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, CharPropFlags, Characteristic, Manager as _,
    Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::{OnceCell, RwLock};
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bellcast_types::{DeviceDescriptor, TransportKind};

use crate::error::{Error, Result};
use crate::traits::{DiscoveryCallback, ScanHandle, TransportAdapter};
use crate::util::{create_identifier, format_peripheral_id, identifiers_match};

/// UART data characteristic of HM-10/HC-08 style serial bridges.
pub const SERIAL_BRIDGE_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000_ffe1_0000_1000_8000_0080_5f9b_34fb);

/// Payload bytes per write; the minimum ATT MTU leaves 20 for data.
pub const BLE_CHUNK_SIZE: usize = 20;

/// Default timeout for BLE connection operations.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for each BLE characteristic write.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for service discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for BLE connection timeouts.
///
/// These are the adapter's own timeouts; the coordinator and transmitter
/// rely on them rather than adding a second layer.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use bellcast_core::ble::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .connection_timeout(Duration::from_secs(20))
///     .write_timeout(Duration::from_secs(5));
/// assert_eq!(config.connection_timeout, Duration::from_secs(20));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing a BLE connection.
    pub connection_timeout: Duration,
    /// Timeout for a single characteristic write.
    pub write_timeout: Duration,
    /// Timeout for service discovery after connection.
    pub discovery_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Create a new connection config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }
}

/// An open BLE link and the characteristic payloads are written to.
#[derive(Clone)]
struct Link {
    peripheral: Peripheral,
    characteristic: Characteristic,
}

impl Link {
    fn write_type(&self) -> WriteType {
        if self.characteristic.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        }
    }
}

/// Bluetooth Low Energy implementation of [`TransportAdapter`].
pub struct LowEnergyAdapter {
    config: ConnectionConfig,
    adapter: OnceCell<Adapter>,
    links: RwLock<HashMap<String, Link>>,
}

impl std::fmt::Debug for LowEnergyAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LowEnergyAdapter")
            .field("config", &self.config)
            .field("initialized", &self.adapter.initialized())
            .finish_non_exhaustive()
    }
}

impl Default for LowEnergyAdapter {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

impl LowEnergyAdapter {
    /// Create an adapter; the host radio is opened lazily on first use.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            adapter: OnceCell::new(),
            links: RwLock::new(HashMap::new()),
        }
    }

    /// Get the first available Bluetooth adapter, opening it once.
    async fn adapter(&self) -> Result<&Adapter> {
        self.adapter
            .get_or_try_init(|| async {
                let manager = Manager::new().await?;
                let adapters = manager.adapters().await?;
                adapters.into_iter().next().ok_or_else(|| {
                    Error::unavailable(TransportKind::LowEnergy, "no Bluetooth adapter available")
                })
            })
            .await
    }

    /// Find the peripheral for `id`, scanning briefly when the radio has not
    /// seen it yet.
    ///
    /// A fresh process on CoreBluetooth or WinRT starts with an empty
    /// peripheral cache, so a cache miss runs a scan bounded by the
    /// discovery timeout and stops as soon as the device shows up.
    async fn find_peripheral(&self, adapter: &Adapter, id: &str) -> Result<Peripheral> {
        if let Some(peripheral) = cached_peripheral(adapter, id).await? {
            debug!("Found {} in the adapter cache", id);
            return Ok(peripheral);
        }

        info!(
            "{} not known yet, scanning for up to {}s",
            id,
            self.config.discovery_timeout.as_secs()
        );
        adapter.start_scan(ScanFilter::default()).await?;
        let found = poll_until_found(self.config.discovery_timeout, LOOKUP_POLL_INTERVAL, || {
            cached_peripheral(adapter, id)
        })
        .await;
        if let Err(e) = adapter.stop_scan().await {
            warn!("Failed to stop BLE lookup scan: {}", e);
        }

        found?.ok_or_else(|| {
            warn!("Device not found after scanning: {}", id);
            Error::device_not_found(id, TransportKind::LowEnergy)
        })
    }
}

/// How often a lookup scan re-checks the adapter's peripherals.
const LOOKUP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Search the adapter's known peripherals for one matching `id`.
async fn cached_peripheral(adapter: &Adapter, id: &str) -> Result<Option<Peripheral>> {
    for peripheral in adapter.peripherals().await? {
        let peripheral_id = format_peripheral_id(&peripheral.id());
        if identifiers_match(&peripheral_id, id) {
            return Ok(Some(peripheral));
        }
        if let Ok(Some(props)) = peripheral.properties().await
            && identifiers_match(&props.address.to_string(), id)
        {
            return Ok(Some(peripheral));
        }
    }
    Ok(None)
}

/// Run `lookup` every `interval` until it finds something or `window` ends.
///
/// The last check happens at the end of the window, so a device that shows
/// up during the final interval is still found.
async fn poll_until_found<T, F, Fut>(window: Duration, interval: Duration, mut lookup: F) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        sleep(interval.min(remaining)).await;
        if let Some(found) = lookup().await? {
            return Ok(Some(found));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
    }
}

/// Run `setup` on a link that is already open, closing it with `close` if
/// setup fails.
///
/// `close` is only awaited on the failure path.
async fn close_on_failure<T, S, C, E>(setup: S, close: C) -> Result<T>
where
    S: Future<Output = Result<T>>,
    C: Future<Output = std::result::Result<(), E>>,
    E: std::fmt::Display,
{
    match setup.await {
        Ok(value) => Ok(value),
        Err(e) => {
            if let Err(close_err) = close.await {
                debug!("Disconnect after failed link setup: {}", close_err);
            }
            Err(e)
        }
    }
}

/// Build a descriptor from a peripheral, if it advertises a name.
///
/// Unnamed peripherals are skipped until an update carries a name; they
/// are almost never serial bridges and would flood the candidate list.
async fn describe(peripheral: &Peripheral) -> Option<DeviceDescriptor> {
    let props = match peripheral.properties().await {
        Ok(Some(props)) => props,
        Ok(None) => return None,
        Err(e) => {
            debug!("Error reading peripheral properties: {}", e);
            return None;
        }
    };
    let name = props.local_name?;
    let id = create_identifier(&props.address.to_string(), &peripheral.id());
    let mut descriptor = DeviceDescriptor::new(id, name, TransportKind::LowEnergy);
    descriptor.signal_strength = props.rssi;
    Some(descriptor)
}

/// Pick the characteristic a schedule payload is written to.
fn select_characteristic(peripheral: &Peripheral) -> Option<Characteristic> {
    let characteristics = peripheral.characteristics();
    characteristics
        .iter()
        .find(|c| c.uuid == SERIAL_BRIDGE_CHARACTERISTIC)
        .or_else(|| {
            characteristics.iter().find(|c| {
                c.properties
                    .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE)
            })
        })
        .cloned()
}

#[async_trait]
impl TransportAdapter for LowEnergyAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::LowEnergy
    }

    async fn is_ready(&self) -> bool {
        let adapter = match self.adapter().await {
            Ok(adapter) => adapter,
            Err(e) => {
                debug!("BLE adapter unavailable: {}", e);
                return false;
            }
        };
        match adapter.adapter_state().await {
            Ok(CentralState::PoweredOn) => true,
            // CoreBluetooth reports Unknown until its first state update.
            Ok(CentralState::Unknown) => true,
            Ok(CentralState::PoweredOff) => false,
            Err(e) => {
                debug!("BLE adapter state check failed: {}", e);
                false
            }
        }
    }

    async fn scan(&self, on_found: DiscoveryCallback) -> Result<ScanHandle> {
        let adapter = self.adapter().await?.clone();
        let mut events = adapter.events().await?;
        adapter.start_scan(ScanFilter::default()).await?;
        info!("Started BLE scan");

        let token = CancellationToken::new();
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let mut reported = HashSet::new();
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    event = events.next() => match event {
                        Some(CentralEvent::DeviceDiscovered(id))
                        | Some(CentralEvent::DeviceUpdated(id)) => {
                            if reported.contains(&id) {
                                continue;
                            }
                            let Ok(peripheral) = adapter.peripheral(&id).await else {
                                continue;
                            };
                            if let Some(descriptor) = describe(&peripheral).await {
                                debug!("BLE sighting: {}", descriptor);
                                reported.insert(id);
                                on_found(descriptor);
                            }
                        }
                        Some(_) => {}
                        None => {
                            debug!("BLE event stream ended");
                            if let Err(e) = adapter.stop_scan().await {
                                warn!("Failed to stop BLE scan: {}", e);
                            }
                            break;
                        }
                    }
                }
            }
        });

        Ok(ScanHandle::new(TransportKind::LowEnergy, token, task))
    }

    async fn stop_scan(&self, handle: &ScanHandle) -> Result<()> {
        let was_running = !handle.is_cancelled();
        handle.cancel().await;
        if was_running && let Some(adapter) = self.adapter.get() {
            adapter.stop_scan().await?;
            info!("Stopped BLE scan");
        }
        Ok(())
    }

    #[tracing::instrument(level = "info", skip(self))]
    async fn connect(&self, id: &str) -> Result<()> {
        if self.links.read().await.contains_key(id) {
            debug!("BLE link to {} already open", id);
            return Ok(());
        }

        let adapter = self.adapter().await?;
        let peripheral = self.find_peripheral(adapter, id).await?;

        info!("Connecting to device...");
        timeout(self.config.connection_timeout, peripheral.connect())
            .await
            .map_err(|_| Error::timeout("connect to device", self.config.connection_timeout))??;

        // From here on the link is up; any failure closes it before returning.
        let discovery_timeout = self.config.discovery_timeout;
        let setup = async {
            timeout(discovery_timeout, peripheral.discover_services())
                .await
                .map_err(|_| Error::timeout("discover services", discovery_timeout))??;
            let characteristic = select_characteristic(&peripheral)
                .ok_or_else(|| Error::NoWritableCharacteristic(id.to_string()))?;
            Ok::<_, Error>(characteristic)
        };
        let characteristic = close_on_failure(setup, peripheral.disconnect()).await?;
        debug!("Writing through characteristic {}", characteristic.uuid);

        self.links.write().await.insert(
            id.to_string(),
            Link {
                peripheral,
                characteristic,
            },
        );
        info!("Connected!");
        Ok(())
    }

    async fn disconnect(&self, id: &str) {
        let Some(link) = self.links.write().await.remove(id) else {
            debug!("No BLE link to {} to close", id);
            return;
        };
        match timeout(self.config.connection_timeout, link.peripheral.disconnect()).await {
            Ok(Ok(())) => info!("Disconnected BLE link to {}", id),
            Ok(Err(e)) => warn!("BLE disconnect from {} failed: {}", id, e),
            Err(_) => warn!("BLE disconnect from {} timed out", id),
        }
    }

    async fn write(&self, id: &str, payload: &[u8]) -> Result<()> {
        let link = self
            .links
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::write_failed(id, "no open Bluetooth LE link"))?;

        if !link.peripheral.is_connected().await.unwrap_or(false) {
            self.links.write().await.remove(id);
            return Err(Error::write_failed(id, "Bluetooth LE link lost"));
        }

        let write_type = link.write_type();
        for chunk in payload.chunks(BLE_CHUNK_SIZE) {
            timeout(
                self.config.write_timeout,
                link.peripheral.write(&link.characteristic, chunk, write_type),
            )
            .await
            .map_err(|_| Error::timeout("write characteristic", self.config.write_timeout))?
            .map_err(|e| Error::write_failed(id, e.to_string()))?;
        }
        debug!("Wrote {} bytes over BLE to {}", payload.len(), id);
        Ok(())
    }
}
