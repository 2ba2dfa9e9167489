//! Classic Bluetooth serial transport.
//!
//! Classic controllers (HC-05, HC-06) are paired through the operating system,
//! which exposes each one as a serial port (`/dev/rfcomm0`, `/dev/cu.HC-05`,
//! `COM7`). Discovery is therefore a single batch enumeration of ports with no
//! signal strength, and a link is an open port.
//!
//! All `serialport` calls block, so they run on tokio's blocking pool.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{DataBits, Parity, SerialPort, SerialPortInfo, SerialPortType, StopBits};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bellcast_types::{DeviceDescriptor, TransportKind};

use crate::error::{Error, Result};
use crate::traits::{DiscoveryCallback, ScanHandle, TransportAdapter};
use crate::util::serial_display_name;

/// HC-05 factory default baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read/write timeout for an open port.
const DEFAULT_PORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Port name fragments that identify Bluetooth serial links when the
/// platform does not tag the port type.
pub const DEFAULT_PORT_NAME_PATTERNS: &[&str] = &["rfcomm", "bluetooth", "hc-0"];

/// Configuration for the classic serial adapter.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate the controller's serial module is set to.
    pub baud_rate: u32,
    /// Read/write timeout applied to the open port.
    pub timeout: Duration,
    /// Case-insensitive port name fragments treated as Bluetooth links.
    pub name_patterns: Vec<String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_PORT_TIMEOUT,
            name_patterns: DEFAULT_PORT_NAME_PATTERNS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        }
    }
}

impl SerialConfig {
    /// Set the baud rate.
    #[must_use]
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the port timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the port name patterns.
    #[must_use]
    pub fn name_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.name_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }
}

/// Whether an enumerated port is a Bluetooth serial link.
pub fn is_bluetooth_port(info: &SerialPortInfo, patterns: &[String]) -> bool {
    if matches!(info.port_type, SerialPortType::BluetoothPort) {
        return true;
    }
    let name = info.port_name.to_lowercase();
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .any(|p| name.contains(&p.to_lowercase()))
}

/// Filter an enumeration down to Bluetooth links, one descriptor per device.
///
/// macOS lists every device twice (`/dev/tty.X` and `/dev/cu.X`); only the
/// call-out `cu.` port is kept.
pub fn bluetooth_descriptors(ports: &[SerialPortInfo], patterns: &[String]) -> Vec<DeviceDescriptor> {
    ports
        .iter()
        .filter(|info| is_bluetooth_port(info, patterns))
        .filter(|info| {
            let Some(rest) = info.port_name.strip_prefix("/dev/tty.") else {
                return true;
            };
            let callout = format!("/dev/cu.{rest}");
            !ports.iter().any(|other| other.port_name == callout)
        })
        .map(|info| {
            DeviceDescriptor::new(
                info.port_name.clone(),
                serial_display_name(&info.port_name),
                TransportKind::ClassicSerial,
            )
        })
        .collect()
}

type PortMap = HashMap<String, Box<dyn SerialPort>>;

/// Classic Bluetooth serial implementation of [`TransportAdapter`].
pub struct ClassicSerialAdapter {
    config: SerialConfig,
    ports: Arc<Mutex<PortMap>>,
}

impl std::fmt::Debug for ClassicSerialAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let open = self
            .ports
            .lock()
            .map(|ports| ports.len())
            .unwrap_or_default();
        f.debug_struct("ClassicSerialAdapter")
            .field("config", &self.config)
            .field("open_ports", &open)
            .finish()
    }
}

impl Default for ClassicSerialAdapter {
    fn default() -> Self {
        Self::new(SerialConfig::default())
    }
}

impl ClassicSerialAdapter {
    /// Create an adapter with the given port settings.
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            ports: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Adapter configuration.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

async fn enumerate_ports() -> Result<Vec<SerialPortInfo>> {
    tokio::task::spawn_blocking(serialport::available_ports)
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
        .map_err(Error::from)
}

#[async_trait]
impl TransportAdapter for ClassicSerialAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::ClassicSerial
    }

    async fn is_ready(&self) -> bool {
        match enumerate_ports().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Serial port enumeration unavailable: {}", e);
                false
            }
        }
    }

    async fn scan(&self, on_found: DiscoveryCallback) -> Result<ScanHandle> {
        let patterns = self.config.name_patterns.clone();
        let token = CancellationToken::new();
        let task_token = token.clone();

        let task = tokio::spawn(async move {
            let ports = tokio::select! {
                _ = task_token.cancelled() => return,
                ports = enumerate_ports() => ports,
            };
            let ports = match ports {
                Ok(ports) => ports,
                Err(e) => {
                    warn!("Serial port enumeration failed: {}", e);
                    return;
                }
            };
            let found = bluetooth_descriptors(&ports, &patterns);
            debug!(
                "Enumerated {} serial ports, {} Bluetooth links",
                ports.len(),
                found.len()
            );
            for descriptor in found {
                if task_token.is_cancelled() {
                    break;
                }
                on_found(descriptor);
            }
        });

        info!("Started classic serial scan");
        Ok(ScanHandle::new(TransportKind::ClassicSerial, token, task))
    }

    async fn stop_scan(&self, handle: &ScanHandle) -> Result<()> {
        handle.cancel().await;
        Ok(())
    }

    #[tracing::instrument(level = "info", skip(self))]
    async fn connect(&self, id: &str) -> Result<()> {
        if self
            .ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
        {
            debug!("Serial port {} already open", id);
            return Ok(());
        }

        let path = id.to_string();
        let baud_rate = self.config.baud_rate;
        let timeout = self.config.timeout;
        let port = tokio::task::spawn_blocking(move || {
            serialport::new(path, baud_rate)
                .timeout(timeout)
                .data_bits(DataBits::Eight)
                .stop_bits(StopBits::One)
                .parity(Parity::None)
                .open()
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), port);
        info!("Opened serial port at {} baud", baud_rate);
        Ok(())
    }

    async fn disconnect(&self, id: &str) {
        let removed = self
            .ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        match removed {
            Some(port) => {
                drop(port);
                info!("Closed serial port {}", id);
            }
            None => debug!("No serial port {} to close", id),
        }
    }

    async fn write(&self, id: &str, payload: &[u8]) -> Result<()> {
        let ports = Arc::clone(&self.ports);
        let id_owned = id.to_string();
        let bytes = payload.to_vec();
        let timeout = self.config.timeout;

        tokio::task::spawn_blocking(move || {
            let mut ports = ports.lock().unwrap_or_else(PoisonError::into_inner);
            let port = ports
                .get_mut(&id_owned)
                .ok_or_else(|| Error::write_failed(&id_owned, "serial port is not open"))?;
            let outcome = port.write_all(&bytes).and_then(|()| port.flush());
            match outcome {
                Ok(()) => Ok(()),
                Err(e) => {
                    // A failed write leaves the link unusable.
                    ports.remove(&id_owned);
                    if e.kind() == std::io::ErrorKind::TimedOut {
                        Err(Error::timeout("serial write", timeout))
                    } else {
                        Err(Error::write_failed(&id_owned, e.to_string()))
                    }
                }
            }
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        debug!("Wrote {} bytes over serial to {}", payload.len(), id);
        Ok(())
    }
}
