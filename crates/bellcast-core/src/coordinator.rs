//! The single active connection.
//!
//! [`ConnectionCoordinator`] owns the process-wide [`ConnectionState`]. Every
//! transition goes through the state channel's own lock, so two callers racing
//! `connect` see one succeed in claiming the slot and the other get
//! [`Error::AlreadyConnected`] without touching a transport.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use bellcast_types::{DeviceDescriptor, TransportKind};

use crate::error::{Error, Result};
use crate::events::{BellEvent, EventDispatcher};
use crate::store::PersistedDeviceHint;
use crate::traits::TransportSet;

/// Connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected {
        device: DeviceDescriptor,
        /// The transport the link was actually opened on.
        transport: TransportKind,
    },
    Disconnecting,
}

impl ConnectionState {
    /// Whether a link is up.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// The connected device, if any.
    pub fn device(&self) -> Option<&DeviceDescriptor> {
        match self {
            Self::Connected { device, .. } => Some(device),
            _ => None,
        }
    }

    /// The transport in use, if connected.
    pub fn transport(&self) -> Option<TransportKind> {
        match self {
            Self::Connected { transport, .. } => Some(*transport),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected { device, transport } => {
                write!(f, "connected to {} over {}", device.display_name, transport)
            }
            Self::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// When a failed native connect falls back to the other transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Fall back on any failure.
    #[default]
    Always,
    /// Fall back only when the device could not be reached
    /// (see [`Error::is_unreachable`]).
    UnreachableOnly,
}

impl FallbackPolicy {
    /// Whether `error` from the native transport warrants trying the other.
    pub fn allows(&self, error: &Error) -> bool {
        match self {
            Self::Always => true,
            Self::UnreachableOnly => error.is_unreachable(),
        }
    }
}

/// Returns the state to `Disconnected` unless a transition is committed.
///
/// Held across the transport await in `connect` and `disconnect`; dropping
/// either future mid-await leaves the slot free rather than stuck in
/// `Connecting` or `Disconnecting`.
struct TransitionGuard<'a> {
    state: &'a watch::Sender<ConnectionState>,
    armed: bool,
}

impl<'a> TransitionGuard<'a> {
    fn new(state: &'a watch::Sender<ConnectionState>) -> Self {
        Self { state, armed: true }
    }

    fn commit(mut self, next: ConnectionState) {
        self.armed = false;
        self.state.send_replace(next);
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Connection transition abandoned, resetting to disconnected");
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }
}

/// Owner of the single active connection.
pub struct ConnectionCoordinator {
    transports: TransportSet,
    state: watch::Sender<ConnectionState>,
    policy: FallbackPolicy,
    hint: Arc<dyn PersistedDeviceHint>,
    events: EventDispatcher,
}

impl std::fmt::Debug for ConnectionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCoordinator")
            .field("state", &*self.state.borrow())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ConnectionCoordinator {
    /// Create a coordinator in the `Disconnected` state.
    pub fn new(
        transports: TransportSet,
        policy: FallbackPolicy,
        hint: Arc<dyn PersistedDeviceHint>,
        events: EventDispatcher,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transports,
            state,
            policy,
            hint,
            events,
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Observe state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The connected device and the transport it is reached over.
    pub fn active(&self) -> Option<(DeviceDescriptor, TransportKind)> {
        match &*self.state.borrow() {
            ConnectionState::Connected { device, transport } => Some((device.clone(), *transport)),
            _ => None,
        }
    }

    /// Fallback policy in force.
    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// The last-known-good device record.
    pub fn hint(&self) -> &Arc<dyn PersistedDeviceHint> {
        &self.hint
    }

    /// Connect to `device`, trying its native transport and then the other.
    ///
    /// Returns the transport the link was opened on. On failure the state is
    /// back to `Disconnected` and the error is [`Error::ConnectionFailed`]
    /// carrying the last transport error.
    #[tracing::instrument(level = "info", skip(self, device), fields(device = %device))]
    pub async fn connect(&self, device: &DeviceDescriptor) -> Result<TransportKind> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(Error::AlreadyConnected);
        }
        let guard = TransitionGuard::new(&self.state);
        self.events.send(BellEvent::Connecting {
            device: device.clone(),
        });

        let mut last_error: Option<Error> = None;
        for (kind, transport) in self.transports.ordered_from(device.transport_kind) {
            if let Some(previous) = &last_error {
                if !self.policy.allows(previous) {
                    info!("Not falling back after: {}", previous);
                    break;
                }
                info!("Falling back to {}", kind);
            }

            match transport.connect(&device.id).await {
                Ok(()) => {
                    guard.commit(ConnectionState::Connected {
                        device: device.clone(),
                        transport: kind,
                    });
                    if let Err(e) = self.hint.remember(device, kind) {
                        warn!("Failed to store last connected device: {}", e);
                    }
                    info!("Connected over {}", kind);
                    self.events.send(BellEvent::Connected {
                        device: device.clone(),
                        transport: kind,
                    });
                    return Ok(kind);
                }
                Err(e) => {
                    warn!("{} connect failed: {}", kind, e);
                    last_error = Some(e);
                }
            }
        }

        guard.commit(ConnectionState::Disconnected);
        let cause = last_error
            .unwrap_or_else(|| Error::device_not_found(&device.id, device.transport_kind));
        self.events.send(BellEvent::ConnectionFailed {
            device: device.clone(),
            error: cause.to_string(),
        });
        Err(Error::connection_failed(device.clone(), cause))
    }

    /// Close the active connection.
    ///
    /// Only acts from `Connected`; returns the device that was disconnected,
    /// or `None` when there was nothing to do. The state always ends
    /// `Disconnected`, whatever the transport reports.
    pub async fn disconnect(&self) -> Option<DeviceDescriptor> {
        let mut active = None;
        self.state.send_if_modified(|state| {
            if let ConnectionState::Connected { device, transport } = state {
                active = Some((device.clone(), *transport));
                *state = ConnectionState::Disconnecting;
                true
            } else {
                false
            }
        });
        let (device, transport) = active?;
        let guard = TransitionGuard::new(&self.state);

        self.transports.get(transport).disconnect(&device.id).await;
        guard.commit(ConnectionState::Disconnected);
        info!("Disconnected from {}", device);
        self.events.send(BellEvent::Disconnected {
            device: device.clone(),
        });
        Some(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockFailure, MockTransport, MockTransportBuilder};
    use crate::store::MemoryDeviceHint;
    use std::time::Duration;

    struct Fixture {
        coordinator: Arc<ConnectionCoordinator>,
        le: Arc<MockTransport>,
        classic: Arc<MockTransport>,
        hint: Arc<MemoryDeviceHint>,
    }

    fn fixture(le: MockTransportBuilder, classic: MockTransportBuilder, policy: FallbackPolicy) -> Fixture {
        let le = Arc::new(le.build());
        let classic = Arc::new(classic.build());
        let hint = Arc::new(MemoryDeviceHint::new());
        let coordinator = Arc::new(ConnectionCoordinator::new(
            TransportSet::new(le.clone(), classic.clone()),
            policy,
            hint.clone(),
            EventDispatcher::default(),
        ));
        Fixture {
            coordinator,
            le,
            classic,
            hint,
        }
    }

    fn bell() -> DeviceDescriptor {
        DeviceDescriptor::new("B", "HC-05 Bell", TransportKind::LowEnergy)
    }

    fn builders() -> (MockTransportBuilder, MockTransportBuilder) {
        (
            MockTransportBuilder::new(TransportKind::LowEnergy),
            MockTransportBuilder::new(TransportKind::ClassicSerial),
        )
    }

    #[tokio::test]
    async fn test_native_transport_first() {
        let (le, classic) = builders();
        let f = fixture(le, classic, FallbackPolicy::Always);

        let transport = f.coordinator.connect(&bell()).await.unwrap();
        assert_eq!(transport, TransportKind::LowEnergy);
        assert_eq!(f.classic.connect_count(), 0);
        assert_eq!(f.hint.get_last_connected().as_deref(), Some("B"));
        assert_eq!(
            f.coordinator.state(),
            ConnectionState::Connected {
                device: bell(),
                transport: TransportKind::LowEnergy
            }
        );
    }

    #[tokio::test]
    async fn test_fallback_records_fallback_transport() {
        let (le, classic) = builders();
        let f = fixture(le.fail_connect(MockFailure::NotFound), classic, FallbackPolicy::Always);

        let transport = f.coordinator.connect(&bell()).await.unwrap();
        assert_eq!(transport, TransportKind::ClassicSerial);
        assert_eq!(f.coordinator.state().transport(), Some(TransportKind::ClassicSerial));
        assert!(f.classic.is_connected("B"));
    }

    #[tokio::test]
    async fn test_both_fail_leaves_disconnected() {
        let (le, classic) = builders();
        let f = fixture(
            le.fail_connect(MockFailure::NotFound),
            classic.fail_connect(MockFailure::Timeout),
            FallbackPolicy::Always,
        );

        let err = f.coordinator.connect(&bell()).await.unwrap_err();
        match err {
            Error::ConnectionFailed { device, cause } => {
                assert_eq!(device.id, "B");
                assert!(matches!(*cause, Error::Timeout { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(f.coordinator.state(), ConnectionState::Disconnected);
        assert_eq!(f.hint.get_last_connected(), None);
    }

    #[tokio::test]
    async fn test_unreachable_only_policy_skips_fallback_on_denial() {
        let (le, classic) = builders();
        let f = fixture(
            le.fail_connect(MockFailure::PermissionDenied),
            classic,
            FallbackPolicy::UnreachableOnly,
        );

        assert!(f.coordinator.connect(&bell()).await.is_err());
        assert_eq!(f.classic.connect_count(), 0);
        assert_eq!(f.coordinator.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_unreachable_only_policy_falls_back_on_not_found() {
        let (le, classic) = builders();
        let f = fixture(
            le.fail_connect(MockFailure::NotFound),
            classic,
            FallbackPolicy::UnreachableOnly,
        );
        assert_eq!(
            f.coordinator.connect(&bell()).await.unwrap(),
            TransportKind::ClassicSerial
        );
    }

    #[tokio::test]
    async fn test_already_connected() {
        let (le, classic) = builders();
        let f = fixture(le, classic, FallbackPolicy::Always);
        f.coordinator.connect(&bell()).await.unwrap();

        let other = DeviceDescriptor::new("A", "Other", TransportKind::LowEnergy);
        assert!(matches!(
            f.coordinator.connect(&other).await,
            Err(Error::AlreadyConnected)
        ));
        assert_eq!(f.coordinator.state().device().map(|d| d.id.as_str()), Some("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_connects_are_serialized() {
        let (le, classic) = builders();
        let f = fixture(
            le.connect_latency(Duration::from_millis(500)),
            classic,
            FallbackPolicy::Always,
        );

        let first = tokio::spawn({
            let coordinator = Arc::clone(&f.coordinator);
            async move { coordinator.connect(&bell()).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(f.coordinator.state(), ConnectionState::Connecting);

        let second = f.coordinator.connect(&bell()).await;
        assert!(matches!(second, Err(Error::AlreadyConnected)));

        assert!(first.await.unwrap().is_ok());
        assert_eq!(f.le.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_connect_frees_the_slot() {
        let (le, classic) = builders();
        let f = fixture(
            le.connect_latency(Duration::from_secs(30)),
            classic,
            FallbackPolicy::Always,
        );
        let mut states = f.coordinator.subscribe_state();

        let attempt = tokio::time::timeout(Duration::from_secs(5), f.coordinator.connect(&bell())).await;
        assert!(attempt.is_err());
        assert_eq!(f.coordinator.state(), ConnectionState::Disconnected);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);

        let transport = f.coordinator.connect(&bell()).await.unwrap();
        assert_eq!(transport, TransportKind::LowEnergy);
        assert_eq!(f.le.connect_count(), 2);
        assert_eq!(f.hint.get_last_connected().as_deref(), Some("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_connect_task_frees_the_slot() {
        let (le, classic) = builders();
        let f = fixture(
            le.connect_latency(Duration::from_secs(30)),
            classic,
            FallbackPolicy::Always,
        );

        let task = tokio::spawn({
            let coordinator = Arc::clone(&f.coordinator);
            async move { coordinator.connect(&bell()).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(f.coordinator.state(), ConnectionState::Connecting);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(f.coordinator.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_disconnect_clears_the_device() {
        let (le, classic) = builders();
        let f = fixture(
            le.disconnect_latency(Duration::from_secs(30)),
            classic,
            FallbackPolicy::Always,
        );
        f.coordinator.connect(&bell()).await.unwrap();

        let attempt = tokio::time::timeout(Duration::from_secs(1), f.coordinator.disconnect()).await;
        assert!(attempt.is_err());
        assert_eq!(f.coordinator.state(), ConnectionState::Disconnected);
        assert!(f.coordinator.active().is_none());

        let other = DeviceDescriptor::new("A", "Other", TransportKind::LowEnergy);
        assert!(f.coordinator.connect(&other).await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_converges_even_when_transport_fails() {
        let (le, classic) = builders();
        let f = fixture(le.fail_disconnect(), classic, FallbackPolicy::Always);
        f.coordinator.connect(&bell()).await.unwrap();

        let mut states = f.coordinator.subscribe_state();
        let device = f.coordinator.disconnect().await.unwrap();
        assert_eq!(device.id, "B");
        assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);
        assert!(f.coordinator.active().is_none());
        assert_eq!(f.le.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_uses_recorded_transport() {
        let (le, classic) = builders();
        let f = fixture(le.fail_connect(MockFailure::NotFound), classic, FallbackPolicy::Always);
        f.coordinator.connect(&bell()).await.unwrap();
        f.coordinator.disconnect().await;
        assert_eq!(f.classic.disconnect_count(), 1);
        assert_eq!(f.le.disconnect_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_is_noop_when_disconnected() {
        let (le, classic) = builders();
        let f = fixture(le, classic, FallbackPolicy::Always);
        assert!(f.coordinator.disconnect().await.is_none());
        assert_eq!(f.le.disconnect_count(), 0);
        assert_eq!(f.coordinator.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_state_serialization() {
        let state = ConnectionState::Connected {
            device: bell(),
            transport: TransportKind::ClassicSerial,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "connected");
        assert_eq!(json["transport"], "classic_serial");
        assert_eq!(state.to_string(), "connected to HC-05 Bell over Bluetooth Classic (serial)");
    }
}
