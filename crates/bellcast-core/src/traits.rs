//! Trait abstractions over the two transport families.
//!
//! This module provides the [`TransportAdapter`] trait that normalizes
//! Bluetooth LE and classic serial links to one callback-driven surface,
//! so discovery, connection and transmission logic never special-cases a
//! transport and can be tested against [`crate::mock::MockTransport`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use bellcast_types::{DeviceDescriptor, TransportKind};

use crate::error::Result;

/// Callback invoked once per newly seen device during a scan.
///
/// Adapters may call it from any task; implementations must be cheap and
/// must not block.
pub type DiscoveryCallback = Arc<dyn Fn(DeviceDescriptor) + Send + Sync>;

/// Handle to a running adapter scan.
///
/// Dropping the handle does not stop the scan; pass it to
/// [`TransportAdapter::stop_scan`]. Cancelling an already cancelled handle
/// is a no-op.
#[derive(Debug, Clone)]
pub struct ScanHandle {
    transport: TransportKind,
    token: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ScanHandle {
    /// Create a handle for a scan driven by `task`.
    pub fn new(transport: TransportKind, token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            transport,
            token,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    /// Create a handle for a scan with no background task.
    pub fn detached(transport: TransportKind, token: CancellationToken) -> Self {
        Self {
            transport,
            token,
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Transport the scan runs on.
    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Token the adapter's scan task watches.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the scan has been asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal the scan task to stop and wait for it to exit.
    ///
    /// Safe to call repeatedly and from several tasks.
    pub async fn cancel(&self) {
        self.token.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            // A panicking scan task must not take the caller down with it.
            let _ = task.await;
        }
    }
}

/// Uniform capability surface over one wireless transport family.
///
/// # Contract
///
/// - [`is_ready`](Self::is_ready) never fails; a denied platform check reads
///   as `false`.
/// - [`scan`](Self::scan) returns as soon as discovery is running and reports
///   each device at most once per handle.
/// - [`stop_scan`](Self::stop_scan) is idempotent.
/// - [`disconnect`](Self::disconnect) never reports failure; problems are
///   logged by the adapter.
/// - Connect and write apply the adapter's own timeouts; callers do not
///   wrap them in a second timeout.
///
/// # Example
///
/// ```ignore
/// use bellcast_core::{TransportAdapter, Result};
///
/// async fn push<T: TransportAdapter>(adapter: &T, id: &str) -> Result<()> {
///     adapter.connect(id).await?;
///     adapter.write(id, b"{\"type\":\"schedules\",\"data\":[]}\n").await
/// }
/// ```
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// The transport family this adapter drives.
    fn kind(&self) -> TransportKind;

    /// Whether the radio or serial subsystem is enabled.
    async fn is_ready(&self) -> bool;

    /// Ask the platform to enable the subsystem and report the outcome.
    ///
    /// Desktop stacks cannot power a radio on, so the default re-checks
    /// [`is_ready`](Self::is_ready).
    async fn request_enable(&self) -> bool {
        self.is_ready().await
    }

    /// Begin a non-blocking discovery session.
    async fn scan(&self, on_found: DiscoveryCallback) -> Result<ScanHandle>;

    /// Stop a discovery session.
    async fn stop_scan(&self, handle: &ScanHandle) -> Result<()>;

    /// Open a link to the device with the given transport-scoped id.
    async fn connect(&self, id: &str) -> Result<()>;

    /// Close the link to a device. Never fails.
    async fn disconnect(&self, id: &str);

    /// Write a complete payload to a connected device.
    async fn write(&self, id: &str, payload: &[u8]) -> Result<()>;
}

/// A shared, dynamically dispatched adapter.
pub type SharedTransport = Arc<dyn TransportAdapter>;

/// The pair of adapters the core coordinates, one per transport family.
///
/// Fallback chains are expressed as [`ordered_from`](Self::ordered_from):
/// the preferred adapter first, the alternate second.
#[derive(Clone)]
pub struct TransportSet {
    low_energy: SharedTransport,
    classic_serial: SharedTransport,
}

impl std::fmt::Debug for TransportSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSet")
            .field("low_energy", &self.low_energy.kind())
            .field("classic_serial", &self.classic_serial.kind())
            .finish()
    }
}

impl TransportSet {
    /// Pair up the two adapters.
    ///
    /// Adapters are matched by [`TransportAdapter::kind`], so passing them
    /// swapped still yields the right pairing.
    pub fn new(low_energy: SharedTransport, classic_serial: SharedTransport) -> Self {
        if low_energy.kind() == TransportKind::ClassicSerial
            && classic_serial.kind() == TransportKind::LowEnergy
        {
            return Self {
                low_energy: classic_serial,
                classic_serial: low_energy,
            };
        }
        Self {
            low_energy,
            classic_serial,
        }
    }

    /// The adapter for a transport family.
    pub fn get(&self, kind: TransportKind) -> &SharedTransport {
        match kind {
            TransportKind::LowEnergy => &self.low_energy,
            TransportKind::ClassicSerial => &self.classic_serial,
        }
    }

    /// Both adapters, `preferred` first.
    pub fn ordered_from(&self, preferred: TransportKind) -> [(TransportKind, SharedTransport); 2] {
        let alternate = preferred.alternate();
        [
            (preferred, Arc::clone(self.get(preferred))),
            (alternate, Arc::clone(self.get(alternate))),
        ]
    }

    /// Both adapters in fixed order (LE, classic).
    pub fn all(&self) -> [SharedTransport; 2] {
        [Arc::clone(&self.low_energy), Arc::clone(&self.classic_serial)]
    }
}
