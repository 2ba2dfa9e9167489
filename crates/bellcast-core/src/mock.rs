//! Mock transport implementation for testing.
//!
//! This module provides a scripted transport that can be used for unit and
//! integration testing without requiring Bluetooth hardware or paired serial
//! ports.
//!
//! The [`MockTransport`] implements the [`TransportAdapter`] trait, so it can
//! stand in for either real adapter inside a [`crate::TransportSet`].
//!
//! # Features
//!
//! - **Scripted sightings**: devices reported after configurable delays
//! - **Failure injection**: readiness, enablement, scan, stop-scan, connect,
//!   write and disconnect can each be made to fail
//! - **Recorded traffic**: every delivered payload and call count is kept for
//!   assertions

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use bellcast_types::{DeviceDescriptor, TransportKind};

use crate::error::{Error, Result};
use crate::traits::{DiscoveryCallback, ScanHandle, TransportAdapter};

/// The kind of failure an injected operation reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// The device is not reachable on this transport.
    NotFound,
    /// The operation timed out.
    Timeout,
    /// The platform denied access.
    PermissionDenied,
    /// The peer rejected the operation.
    Rejected,
}

impl MockFailure {
    fn to_error(self, id: &str, kind: TransportKind) -> Error {
        match self {
            Self::NotFound => Error::device_not_found(id, kind),
            Self::Timeout => Error::timeout("mock operation", Duration::from_secs(1)),
            Self::PermissionDenied => Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "mock permission denied",
            )),
            Self::Rejected => Error::write_failed(id, "mock rejection"),
        }
    }
}

/// A scripted transport adapter for testing.
///
/// # Example
///
/// ```
/// use bellcast_core::{MockTransportBuilder, TransportAdapter};
/// use bellcast_types::TransportKind;
///
/// #[tokio::main]
/// async fn main() {
///     let mock = MockTransportBuilder::new(TransportKind::ClassicSerial).build();
///     mock.connect("B").await.unwrap();
///     mock.write("B", b"hello\n").await.unwrap();
///     assert_eq!(mock.writes(), vec![("B".to_string(), b"hello\n".to_vec())]);
/// }
/// ```
pub struct MockTransport {
    kind: TransportKind,
    ready: AtomicBool,
    grant_enable: AtomicBool,
    sightings: Vec<(Duration, DeviceDescriptor)>,
    scan_fails: AtomicBool,
    stop_scan_fails: AtomicBool,
    connect_failure: Mutex<Option<MockFailure>>,
    write_failure: Mutex<Option<MockFailure>>,
    disconnect_fails: AtomicBool,
    require_connection: AtomicBool,
    /// Simulated connect latency in milliseconds (0 = no delay).
    connect_latency_ms: AtomicU64,
    /// Simulated write latency in milliseconds.
    write_latency_ms: AtomicU64,
    /// Simulated disconnect latency in milliseconds.
    disconnect_latency_ms: AtomicU64,
    connected: Mutex<HashSet<String>>,
    writes: Mutex<Vec<(String, Vec<u8>)>>,
    scan_calls: AtomicU32,
    stop_scan_calls: AtomicU32,
    connect_calls: AtomicU32,
    disconnect_calls: AtomicU32,
    write_calls: AtomicU32,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("kind", &self.kind)
            .field("ready", &self.ready.load(Ordering::Relaxed))
            .field("sightings", &self.sightings.len())
            .field("write_calls", &self.write_calls.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockTransport {
    /// Create a ready mock with no sightings and no injected failures.
    pub fn new(kind: TransportKind) -> Self {
        MockTransportBuilder::new(kind).build()
    }

    /// Set whether the subsystem reports ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Make `connect` fail with the given failure, or succeed with `None`.
    pub fn set_connect_failure(&self, failure: Option<MockFailure>) {
        *self
            .connect_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = failure;
    }

    /// Make `write` fail with the given failure, or succeed with `None`.
    pub fn set_write_failure(&self, failure: Option<MockFailure>) {
        *self
            .write_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = failure;
    }

    /// Make `disconnect` hit an (internally logged) failure.
    pub fn set_disconnect_fails(&self, fails: bool) {
        self.disconnect_fails.store(fails, Ordering::Relaxed);
    }

    /// Payloads delivered by successful writes, in order.
    pub fn writes(&self) -> Vec<(String, Vec<u8>)> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a link to `id` is open.
    pub fn is_connected(&self, id: &str) -> bool {
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    /// Number of `scan` calls.
    pub fn scan_count(&self) -> u32 {
        self.scan_calls.load(Ordering::Relaxed)
    }

    /// Number of `stop_scan` calls.
    pub fn stop_scan_count(&self) -> u32 {
        self.stop_scan_calls.load(Ordering::Relaxed)
    }

    /// Number of `connect` calls.
    pub fn connect_count(&self) -> u32 {
        self.connect_calls.load(Ordering::Relaxed)
    }

    /// Number of `disconnect` calls.
    pub fn disconnect_count(&self) -> u32 {
        self.disconnect_calls.load(Ordering::Relaxed)
    }

    /// Number of `write` calls, successful or not.
    pub fn write_count(&self) -> u32 {
        self.write_calls.load(Ordering::Relaxed)
    }

    fn injected(&self, slot: &Mutex<Option<MockFailure>>) -> Option<MockFailure> {
        *slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(latency_ms: &AtomicU64) {
        let latency = latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
    }
}

#[async_trait]
impl TransportAdapter for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    async fn request_enable(&self) -> bool {
        if self.grant_enable.load(Ordering::Relaxed) {
            self.ready.store(true, Ordering::Relaxed);
        }
        self.ready.load(Ordering::Relaxed)
    }

    async fn scan(&self, on_found: DiscoveryCallback) -> Result<ScanHandle> {
        self.scan_calls.fetch_add(1, Ordering::Relaxed);
        if self.scan_fails.load(Ordering::Relaxed) {
            return Err(Error::unavailable(self.kind, "mock scan failure"));
        }

        let token = CancellationToken::new();
        let task_token = token.clone();
        let sightings = self.sightings.clone();
        let task = tokio::spawn(async move {
            for (delay, descriptor) in sightings {
                tokio::select! {
                    _ = task_token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                on_found(descriptor);
            }
        });
        Ok(ScanHandle::new(self.kind, token, task))
    }

    async fn stop_scan(&self, handle: &ScanHandle) -> Result<()> {
        self.stop_scan_calls.fetch_add(1, Ordering::Relaxed);
        handle.cancel().await;
        if self.stop_scan_fails.load(Ordering::Relaxed) {
            return Err(Error::unavailable(self.kind, "mock stop failure"));
        }
        Ok(())
    }

    async fn connect(&self, id: &str) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::Relaxed);
        Self::delay(&self.connect_latency_ms).await;

        if let Some(failure) = self.injected(&self.connect_failure) {
            return Err(failure.to_error(id, self.kind));
        }
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
        Ok(())
    }

    async fn disconnect(&self, id: &str) {
        self.disconnect_calls.fetch_add(1, Ordering::Relaxed);
        Self::delay(&self.disconnect_latency_ms).await;
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if self.disconnect_fails.load(Ordering::Relaxed) {
            debug!("Mock disconnect from {} failed", id);
        }
    }

    async fn write(&self, id: &str, payload: &[u8]) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        Self::delay(&self.write_latency_ms).await;
        if let Some(failure) = self.injected(&self.write_failure) {
            return Err(failure.to_error(id, self.kind));
        }
        if self.require_connection.load(Ordering::Relaxed) && !self.is_connected(id) {
            return Err(Error::write_failed(id, "mock link not open"));
        }
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id.to_string(), payload.to_vec()));
        Ok(())
    }
}

/// Builder for creating mock transports with custom behavior.
#[derive(Debug, Clone)]
pub struct MockTransportBuilder {
    kind: TransportKind,
    ready: bool,
    grant_enable: bool,
    sightings: Vec<(Duration, DeviceDescriptor)>,
    scan_fails: bool,
    stop_scan_fails: bool,
    connect_failure: Option<MockFailure>,
    write_failure: Option<MockFailure>,
    disconnect_fails: bool,
    require_connection: bool,
    connect_latency: Duration,
    write_latency: Duration,
    disconnect_latency: Duration,
}

impl MockTransportBuilder {
    /// Create a new builder for a transport family.
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            ready: true,
            grant_enable: false,
            sightings: Vec::new(),
            scan_fails: false,
            stop_scan_fails: false,
            connect_failure: None,
            write_failure: None,
            disconnect_fails: false,
            require_connection: true,
            connect_latency: Duration::ZERO,
            write_latency: Duration::ZERO,
            disconnect_latency: Duration::ZERO,
        }
    }

    /// Set whether the subsystem reports ready.
    #[must_use]
    pub fn ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }

    /// Whether an enablement prompt turns the subsystem on.
    #[must_use]
    pub fn grant_enable(mut self, grant: bool) -> Self {
        self.grant_enable = grant;
        self
    }

    /// Report a device as soon as the scan starts.
    #[must_use]
    pub fn sighting(self, descriptor: DeviceDescriptor) -> Self {
        self.sighting_after(Duration::ZERO, descriptor)
    }

    /// Report a device `delay` after the previous sighting.
    #[must_use]
    pub fn sighting_after(mut self, delay: Duration, descriptor: DeviceDescriptor) -> Self {
        self.sightings.push((delay, descriptor));
        self
    }

    /// Make `scan` fail.
    #[must_use]
    pub fn fail_scan(mut self) -> Self {
        self.scan_fails = true;
        self
    }

    /// Make `stop_scan` report an error (after cancelling).
    #[must_use]
    pub fn fail_stop_scan(mut self) -> Self {
        self.stop_scan_fails = true;
        self
    }

    /// Make `connect` fail.
    #[must_use]
    pub fn fail_connect(mut self, failure: MockFailure) -> Self {
        self.connect_failure = Some(failure);
        self
    }

    /// Make `write` fail.
    #[must_use]
    pub fn fail_write(mut self, failure: MockFailure) -> Self {
        self.write_failure = Some(failure);
        self
    }

    /// Make `disconnect` hit an internal failure.
    #[must_use]
    pub fn fail_disconnect(mut self) -> Self {
        self.disconnect_fails = true;
        self
    }

    /// Whether writes require a prior successful `connect` (default true).
    #[must_use]
    pub fn require_connection(mut self, require: bool) -> Self {
        self.require_connection = require;
        self
    }

    /// Delay every `connect` call.
    #[must_use]
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    /// Delay every `write` call, before any injected failure is reported.
    #[must_use]
    pub fn write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = latency;
        self
    }

    /// Delay every `disconnect` call.
    #[must_use]
    pub fn disconnect_latency(mut self, latency: Duration) -> Self {
        self.disconnect_latency = latency;
        self
    }

    /// Build the mock transport.
    pub fn build(self) -> MockTransport {
        MockTransport {
            kind: self.kind,
            ready: AtomicBool::new(self.ready),
            grant_enable: AtomicBool::new(self.grant_enable),
            sightings: self.sightings,
            scan_fails: AtomicBool::new(self.scan_fails),
            stop_scan_fails: AtomicBool::new(self.stop_scan_fails),
            connect_failure: Mutex::new(self.connect_failure),
            write_failure: Mutex::new(self.write_failure),
            disconnect_fails: AtomicBool::new(self.disconnect_fails),
            require_connection: AtomicBool::new(self.require_connection),
            connect_latency_ms: AtomicU64::new(self.connect_latency.as_millis() as u64),
            write_latency_ms: AtomicU64::new(self.write_latency.as_millis() as u64),
            disconnect_latency_ms: AtomicU64::new(self.disconnect_latency.as_millis() as u64),
            connected: Mutex::new(HashSet::new()),
            writes: Mutex::new(Vec::new()),
            scan_calls: AtomicU32::new(0),
            stop_scan_calls: AtomicU32::new(0),
            connect_calls: AtomicU32::new(0),
            disconnect_calls: AtomicU32::new(0),
            write_calls: AtomicU32::new(0),
        }
    }
}
