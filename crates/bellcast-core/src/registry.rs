//! Deduplicated, prioritized collection of scan results.
//!
//! Sightings from both transports are merged here while a scan runs. Entries
//! whose display name matches a controller hint are kept ahead of everything
//! else so the likely target is at the top of the candidate list.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use bellcast_types::{DEFAULT_CONTROLLER_HINTS, DeviceDescriptor, TransportKind, matches_controller_hint};

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<DeviceDescriptor>,
    keys: HashSet<(TransportKind, String)>,
    /// Number of hint-matching entries at the front of `entries`.
    priority_len: usize,
}

/// In-memory registry of devices seen during the current scan session.
///
/// Safe to share between adapter callbacks and the UI: `add` takes the write
/// lock, `snapshot` the read lock.
#[derive(Debug)]
pub struct DeviceRegistry {
    inner: RwLock<Inner>,
    hints: Vec<String>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    /// Create a registry using the default controller hints.
    pub fn new() -> Self {
        Self::with_hints(DEFAULT_CONTROLLER_HINTS.iter().map(|h| (*h).to_string()))
    }

    /// Create a registry with a custom hint allow-list.
    pub fn with_hints<I, S>(hints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: RwLock::new(Inner::default()),
            hints: hints.into_iter().map(Into::into).collect(),
        }
    }

    /// Controller hints used for prioritization.
    pub fn hints(&self) -> &[String] {
        &self.hints
    }

    /// Add a sighting.
    ///
    /// Returns `false` when `(transport_kind, id)` is already present. A
    /// hint-matching descriptor goes after the hint-matching entries already
    /// present; any other descriptor goes to the back.
    pub fn add(&self, descriptor: DeviceDescriptor) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let key = (descriptor.transport_kind, descriptor.id.clone());
        if inner.keys.contains(&key) {
            return false;
        }
        inner.keys.insert(key);

        if matches_controller_hint(&descriptor.display_name, &self.hints) {
            let at = inner.priority_len;
            inner.entries.insert(at, descriptor);
            inner.priority_len += 1;
        } else {
            inner.entries.push(descriptor);
        }
        true
    }

    /// Current ordered contents.
    pub fn snapshot(&self) -> Vec<DeviceDescriptor> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone()
    }

    /// Look up an entry by transport and id.
    pub fn get(&self, transport: TransportKind, id: &str) -> Option<DeviceDescriptor> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .find(|d| d.transport_kind == transport && d.id == id)
            .cloned()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.entries.clear();
        inner.keys.clear();
        inner.priority_len = 0;
    }

    /// Number of distinct devices.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
