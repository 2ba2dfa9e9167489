//! Collaborator interfaces owned outside the connectivity core.
//!
//! The schedule store and the "last known good device" record live with the
//! application (the CLI keeps both on disk). The core only reads schedules and
//! writes the device hint, through the traits below.

use std::sync::{PoisonError, RwLock};

use bellcast_types::{DeviceDescriptor, ScheduleEntry, TransportKind};

use crate::error::Result;

/// Read access to the schedule store.
pub trait ScheduleRepository: Send + Sync {
    /// Active entries in the order the operator arranged them.
    fn list_active(&self) -> Result<Vec<ScheduleEntry>>;
}

/// Record of the last device a connection succeeded to.
///
/// [`crate::ConnectionCoordinator`] is the only writer.
pub trait PersistedDeviceHint: Send + Sync {
    /// Identifier of the last connected device, if any.
    fn get_last_connected(&self) -> Option<String>;

    /// Store the identifier of the last connected device.
    fn set_last_connected(&self, id: &str) -> Result<()>;

    /// Store a successful connection.
    ///
    /// Implementations that can keep more than the id (name, transport) should
    /// override this; the default records the id only.
    fn remember(&self, device: &DeviceDescriptor, _transport: TransportKind) -> Result<()> {
        self.set_last_connected(&device.id)
    }
}

/// In-memory [`ScheduleRepository`].
#[derive(Debug, Default)]
pub struct InMemoryScheduleRepository {
    entries: RwLock<Vec<ScheduleEntry>>,
}

impl InMemoryScheduleRepository {
    /// Create a repository holding `entries`.
    pub fn new(entries: Vec<ScheduleEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Replace the stored entries.
    pub fn replace(&self, entries: Vec<ScheduleEntry>) {
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = entries;
    }

    /// Every stored entry, active or not.
    pub fn all(&self) -> Vec<ScheduleEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ScheduleRepository for InMemoryScheduleRepository {
    fn list_active(&self) -> Result<Vec<ScheduleEntry>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.is_active)
            .cloned()
            .collect())
    }
}

/// In-memory [`PersistedDeviceHint`].
#[derive(Debug, Default)]
pub struct MemoryDeviceHint {
    last: RwLock<Option<String>>,
}

impl MemoryDeviceHint {
    /// Create an empty hint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hint that already points at `id`.
    pub fn with_last(id: impl Into<String>) -> Self {
        Self {
            last: RwLock::new(Some(id.into())),
        }
    }
}

impl PersistedDeviceHint for MemoryDeviceHint {
    fn get_last_connected(&self) -> Option<String> {
        self.last
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_last_connected(&self, id: &str) -> Result<()> {
        *self.last.write().unwrap_or_else(PoisonError::into_inner) = Some(id.to_string());
        Ok(())
    }
}
