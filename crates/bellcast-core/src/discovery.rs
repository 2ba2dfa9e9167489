//! Scan sessions across both transports.
//!
//! A [`DiscoveryEngine`] runs one session at a time. Starting a session clears
//! the [`DeviceRegistry`], launches every ready adapter's scan in its own task
//! and arms a single timer for the whole session. The session ends when that
//! timer fires or when [`DiscoveryEngine::cancel_scan`] is called, whichever
//! comes first; either way every adapter is told to stop and exactly one
//! [`ScanSummary`] is emitted.
//!
//! Adapters are isolated from each other: a scan that fails to start, or a
//! stop that reports an error, is logged and never affects the other adapter
//! or the session's termination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bellcast_types::{DEFAULT_CONTROLLER_HINTS, DeviceDescriptor, TransportKind};

use crate::error::{Error, Result};
use crate::events::{BellEvent, EventDispatcher};
use crate::registry::DeviceRegistry;
use crate::traits::{DiscoveryCallback, ScanHandle, SharedTransport, TransportSet};

/// Default length of a scan session.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(12);

/// Options for scan sessions.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long a session runs before it stops on its own.
    pub duration: Duration,
    /// Name fragments that move a device to the front of the results.
    pub controller_hints: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: DEFAULT_SCAN_DURATION,
            controller_hints: DEFAULT_CONTROLLER_HINTS
                .iter()
                .map(|h| (*h).to_string())
                .collect(),
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session duration.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the session duration in seconds.
    #[must_use]
    pub fn duration_secs(self, secs: u64) -> Self {
        self.duration(Duration::from_secs(secs))
    }

    /// Replace the controller hint allow-list.
    #[must_use]
    pub fn controller_hints<I, S>(mut self, hints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.controller_hints = hints.into_iter().map(Into::into).collect();
        self
    }
}

/// Whether a scan session is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryState {
    #[default]
    Idle,
    Scanning,
}

/// Terminal report of a scan session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Distinct devices in the registry when the session ended.
    pub device_count: usize,
    /// `true` when the timer ended the session, `false` when it was cut short.
    pub session_duration_elapsed: bool,
    /// Wall time the session ran for.
    pub elapsed: Duration,
}

/// Caller's view of one scan session.
#[derive(Debug, Clone)]
pub struct ScanSession {
    id: u64,
    done: watch::Receiver<Option<ScanSummary>>,
}

impl ScanSession {
    /// Session number, unique per engine.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The summary, if the session has ended.
    pub fn summary(&self) -> Option<ScanSummary> {
        self.done.borrow().clone()
    }

    /// Wait for the session to end.
    pub async fn wait(&mut self) -> Result<ScanSummary> {
        let summary = self
            .done
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::Cancelled)?;
        summary.clone().ok_or(Error::Cancelled)
    }
}

struct ActiveSession {
    id: u64,
    token: CancellationToken,
    started: Instant,
    handles: Vec<(SharedTransport, ScanHandle)>,
    done: watch::Sender<Option<ScanSummary>>,
}

#[derive(Default)]
enum Slot {
    #[default]
    Idle,
    Scanning(ActiveSession),
}

struct Inner {
    transports: TransportSet,
    registry: Arc<DeviceRegistry>,
    events: EventDispatcher,
    duration: Duration,
    slot: Mutex<Slot>,
    next_session: AtomicU64,
}

impl Inner {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_session(&self) -> Option<u64> {
        match &*self.lock_slot() {
            Slot::Scanning(active) => Some(active.id),
            Slot::Idle => None,
        }
    }

    /// Record a sighting if `session_id` is still the running session.
    ///
    /// The slot lock is held across the registry insert so a sighting from an
    /// ended session can never land in the next session's registry.
    fn record(&self, session_id: u64, descriptor: DeviceDescriptor) {
        let slot = self.lock_slot();
        if !matches!(&*slot, Slot::Scanning(active) if active.id == session_id) {
            return;
        }
        if self.registry.add(descriptor.clone()) {
            drop(slot);
            debug!("Discovered {}", descriptor);
            self.events.send(BellEvent::DeviceDiscovered { device: descriptor });
        }
    }

    /// End `session_id` if it is still running. Returns `None` when another
    /// path already ended it.
    async fn finish(&self, session_id: u64, elapsed: bool) -> Option<ScanSummary> {
        let (active, device_count) = {
            let mut slot = self.lock_slot();
            if !matches!(&*slot, Slot::Scanning(active) if active.id == session_id) {
                return None;
            }
            let Slot::Scanning(active) = std::mem::take(&mut *slot) else {
                return None;
            };
            (active, self.registry.len())
        };

        active.token.cancel();
        for (transport, handle) in &active.handles {
            if let Err(e) = transport.stop_scan(handle).await {
                warn!("Failed to stop {} scan: {}", transport.kind(), e);
            }
        }

        let summary = ScanSummary {
            device_count,
            session_duration_elapsed: elapsed,
            elapsed: active.started.elapsed(),
        };
        info!(
            "Scan session {} ended ({}): {} device(s)",
            session_id,
            if elapsed { "timeout" } else { "cancelled" },
            device_count
        );
        self.events.send(BellEvent::ScanCompleted {
            summary: summary.clone(),
        });
        active.done.send_replace(Some(summary.clone()));
        Some(summary)
    }

    /// Start one adapter's scan and register its handle with the session.
    async fn launch(self: Arc<Self>, session_id: u64, transport: SharedTransport) {
        let sink = Arc::clone(&self);
        let on_found: DiscoveryCallback =
            Arc::new(move |descriptor: DeviceDescriptor| sink.record(session_id, descriptor));

        let handle = match transport.scan(on_found).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("{} scan failed to start: {}", transport.kind(), e);
                return;
            }
        };

        let registered = {
            let mut slot = self.lock_slot();
            match &mut *slot {
                Slot::Scanning(active) if active.id == session_id => {
                    active.handles.push((Arc::clone(&transport), handle.clone()));
                    true
                }
                _ => false,
            }
        };
        if !registered {
            debug!("{} scan started after its session ended", transport.kind());
            if let Err(e) = transport.stop_scan(&handle).await {
                warn!("Failed to stop {} scan: {}", transport.kind(), e);
            }
        }
    }
}

/// Orchestrates scan sessions over both transports.
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct DiscoveryEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DiscoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryEngine")
            .field("state", &self.state())
            .field("duration", &self.inner.duration)
            .field("devices", &self.inner.registry.len())
            .finish()
    }
}

impl DiscoveryEngine {
    /// Create an engine over the given adapters.
    pub fn new(transports: TransportSet, options: ScanOptions, events: EventDispatcher) -> Self {
        Self {
            inner: Arc::new(Inner {
                transports,
                registry: Arc::new(DeviceRegistry::with_hints(options.controller_hints)),
                events,
                duration: options.duration,
                slot: Mutex::new(Slot::Idle),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> DiscoveryState {
        match self.inner.current_session() {
            Some(_) => DiscoveryState::Scanning,
            None => DiscoveryState::Idle,
        }
    }

    /// The registry sightings are merged into.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    /// Current ordered scan results.
    pub fn snapshot(&self) -> Vec<DeviceDescriptor> {
        self.inner.registry.snapshot()
    }

    /// Configured session duration.
    pub fn duration(&self) -> Duration {
        self.inner.duration
    }

    /// Start a scan session.
    ///
    /// Fails with [`Error::AlreadyScanning`] while a session runs. Adapters
    /// that report not ready are asked to enable first; when none can be
    /// enabled the session ends at once with zero devices and
    /// [`Error::SubsystemUnavailable`] is returned.
    pub async fn start_scan(&self) -> Result<ScanSession> {
        let session_id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(None);
        {
            let mut slot = self.inner.lock_slot();
            if matches!(&*slot, Slot::Scanning(_)) {
                return Err(Error::AlreadyScanning);
            }
            self.inner.registry.clear();
            *slot = Slot::Scanning(ActiveSession {
                id: session_id,
                token: token.clone(),
                started: Instant::now(),
                handles: Vec::new(),
                done: done_tx,
            });
        }
        info!("Scan session {} started", session_id);
        self.inner.events.send(BellEvent::ScanStarted);

        let session = ScanSession {
            id: session_id,
            done: done_rx,
        };

        let ready = self.ready_transports().await;
        if ready.is_empty() {
            self.inner.finish(session_id, false).await;
            return Err(Error::unavailable(
                TransportKind::LowEnergy,
                "Bluetooth is disabled and could not be enabled",
            ));
        }

        let timer = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timer.duration) => {
                    timer.finish(session_id, true).await;
                }
                _ = token.cancelled() => {}
            }
        });

        for transport in ready {
            tokio::spawn(Arc::clone(&self.inner).launch(session_id, transport));
        }

        Ok(session)
    }

    /// Cut the running session short.
    ///
    /// Returns the summary, or `None` when no session was running.
    pub async fn cancel_scan(&self) -> Option<ScanSummary> {
        let session_id = self.inner.current_session()?;
        self.inner.finish(session_id, false).await
    }

    /// Adapters that are ready, prompting enablement for those that are not.
    async fn ready_transports(&self) -> Vec<SharedTransport> {
        let checks = self.inner.transports.all().into_iter().map(|transport| async move {
            if transport.is_ready().await {
                return Some(transport);
            }
            info!("{} is disabled, requesting enablement", transport.kind());
            if transport.request_enable().await {
                Some(transport)
            } else {
                warn!("{} unavailable, scanning without it", transport.kind());
                None
            }
        });
        join_all(checks).await.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTransport, MockTransportBuilder};
    use crate::traits::TransportAdapter;

    struct Fixture {
        engine: DiscoveryEngine,
        le: Arc<MockTransport>,
        classic: Arc<MockTransport>,
        events: EventDispatcher,
    }

    fn fixture(le: MockTransportBuilder, classic: MockTransportBuilder) -> Fixture {
        let le = Arc::new(le.build());
        let classic = Arc::new(classic.build());
        let events = EventDispatcher::new(64);
        let engine = DiscoveryEngine::new(
            TransportSet::new(le.clone(), classic.clone()),
            ScanOptions::default(),
            events.clone(),
        );
        Fixture {
            engine,
            le,
            classic,
            events,
        }
    }

    fn le_builder() -> MockTransportBuilder {
        MockTransportBuilder::new(TransportKind::LowEnergy)
    }

    fn classic_builder() -> MockTransportBuilder {
        MockTransportBuilder::new(TransportKind::ClassicSerial)
    }

    fn completed_count(rx: &mut crate::events::EventReceiver) -> usize {
        let mut count = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, BellEvent::ScanCompleted { .. }) {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn test_scan_options_builder() {
        let options = ScanOptions::new().duration_secs(5).controller_hints(["chime"]);
        assert_eq!(options.duration, Duration::from_secs(5));
        assert_eq!(options.controller_hints, vec!["chime".to_string()]);
        assert_eq!(ScanOptions::default().duration, DEFAULT_SCAN_DURATION);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_ends_session_once() {
        let f = fixture(
            le_builder().sighting(DeviceDescriptor::new("A", "Unknown Device", TransportKind::LowEnergy)),
            classic_builder().sighting_after(
                Duration::from_secs(2),
                DeviceDescriptor::new("B", "HC-05 Bell", TransportKind::ClassicSerial),
            ),
        );
        let mut rx = f.events.subscribe();

        let mut session = f.engine.start_scan().await.unwrap();
        assert_eq!(f.engine.state(), DiscoveryState::Scanning);

        let summary = session.wait().await.unwrap();
        assert!(summary.session_duration_elapsed);
        assert_eq!(summary.device_count, 2);
        assert_eq!(summary.elapsed, DEFAULT_SCAN_DURATION);
        assert_eq!(f.engine.state(), DiscoveryState::Idle);

        assert!(f.engine.cancel_scan().await.is_none());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(completed_count(&mut rx), 1);
        assert_eq!(f.le.stop_scan_count(), 1);
        assert_eq!(f.classic.stop_scan_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_session() {
        let f = fixture(
            le_builder().sighting_after(
                Duration::from_secs(8),
                DeviceDescriptor::new("late", "HC-05 Bell", TransportKind::LowEnergy),
            ),
            classic_builder(),
        );
        let mut rx = f.events.subscribe();
        let session = f.engine.start_scan().await.unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        let summary = f.engine.cancel_scan().await.unwrap();
        assert!(!summary.session_duration_elapsed);
        assert_eq!(summary.device_count, 0);
        assert_eq!(summary.elapsed, Duration::from_secs(3));
        assert_eq!(f.engine.state(), DiscoveryState::Idle);
        assert_eq!(session.summary(), Some(summary));

        // Neither the late sighting nor the timer may fire afterwards.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(f.engine.snapshot().is_empty());
        assert_eq!(completed_count(&mut rx), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_scanning() {
        let f = fixture(le_builder(), classic_builder());
        let _session = f.engine.start_scan().await.unwrap();
        let err = f.engine.start_scan().await.unwrap_err();
        assert!(matches!(err, Error::AlreadyScanning));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_adapter_failing_does_not_abort_the_other() {
        let f = fixture(
            le_builder().fail_scan(),
            classic_builder().sighting(DeviceDescriptor::new(
                "/dev/rfcomm0",
                "rfcomm0",
                TransportKind::ClassicSerial,
            )),
        );
        let mut session = f.engine.start_scan().await.unwrap();
        let summary = session.wait().await.unwrap();
        assert_eq!(summary.device_count, 1);
        assert_eq!(f.le.scan_count(), 1);
        assert_eq!(f.le.stop_scan_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_stop_still_ends_session() {
        let f = fixture(le_builder().fail_stop_scan(), classic_builder());
        let _session = f.engine.start_scan().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let summary = f.engine.cancel_scan().await.unwrap();
        assert!(!summary.session_duration_elapsed);
        assert_eq!(f.engine.state(), DiscoveryState::Idle);
        assert_eq!(f.classic.stop_scan_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_radio_ends_immediately() {
        let f = fixture(le_builder().ready(false), classic_builder().ready(false));
        let mut rx = f.events.subscribe();

        let err = f.engine.start_scan().await.unwrap_err();
        assert!(matches!(err, Error::SubsystemUnavailable { .. }));
        assert_eq!(f.engine.state(), DiscoveryState::Idle);
        assert_eq!(f.le.scan_count(), 0);

        assert_eq!(rx.try_recv().unwrap(), BellEvent::ScanStarted);
        match rx.try_recv().unwrap() {
            BellEvent::ScanCompleted { summary } => {
                assert_eq!(summary.device_count, 0);
                assert!(!summary.session_duration_elapsed);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_enablement_prompt_is_honoured() {
        let f = fixture(
            le_builder()
                .ready(false)
                .grant_enable(true)
                .sighting(DeviceDescriptor::new("A", "HM-10", TransportKind::LowEnergy)),
            classic_builder().ready(false),
        );
        let mut session = f.engine.start_scan().await.unwrap();
        assert_eq!(session.wait().await.unwrap().device_count, 1);
        assert!(f.le.is_ready().await);
        assert_eq!(f.classic.scan_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_session_clears_registry() {
        let f = fixture(
            le_builder().sighting(DeviceDescriptor::new("A", "HM-10", TransportKind::LowEnergy)),
            classic_builder(),
        );
        let mut first = f.engine.start_scan().await.unwrap();
        first.wait().await.unwrap();
        assert_eq!(f.engine.snapshot().len(), 1);

        // Only the classic adapter, which reports nothing, takes part now.
        f.le.set_ready(false);
        let _second = f.engine.start_scan().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(f.engine.snapshot().is_empty());
        assert_eq!(f.le.scan_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovered_events_are_deduplicated() {
        let device = DeviceDescriptor::new("A", "HM-10", TransportKind::LowEnergy);
        let f = fixture(
            le_builder().sighting(device.clone()).sighting(device.clone()),
            classic_builder(),
        );
        let mut rx = f.events.subscribe();
        let mut session = f.engine.start_scan().await.unwrap();
        session.wait().await.unwrap();

        let mut discovered = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, BellEvent::DeviceDiscovered { .. }) {
                discovered += 1;
            }
        }
        assert_eq!(discovered, 1);
    }
}
