use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use extcat_types::RemoteExtensionEntry;

/// Newer remote entries for installed packages, keyed by `pkg_name`.
///
/// Reconciliation only ever adds entries. Removal belongs to the install
/// pipeline that applies the update.
#[derive(Debug, Default)]
pub struct PendingUpdateIndex {
    entries: RwLock<HashMap<String, RemoteExtensionEntry>>,
}

impl PendingUpdateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, RemoteExtensionEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, RemoteExtensionEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts `entry` unless its package already has a pending update.
    pub fn record_if_absent(&self, entry: RemoteExtensionEntry) -> bool {
        match self.write().entry(entry.pkg_name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, pkg_name: &str) -> Option<RemoteExtensionEntry> {
        self.read().get(pkg_name).cloned()
    }

    pub fn contains(&self, pkg_name: &str) -> bool {
        self.read().contains_key(pkg_name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Returns every pending entry ordered by `pkg_name`.
    pub fn snapshot(&self) -> Vec<RemoteExtensionEntry> {
        let mut entries: Vec<_> = self.read().values().cloned().collect();
        entries.sort_by(|left, right| left.pkg_name.cmp(&right.pkg_name));
        entries
    }

    /// Removes the pending entry once the install pipeline has applied it.
    pub fn take(&self, pkg_name: &str) -> Option<RemoteExtensionEntry> {
        self.write().remove(pkg_name)
    }
}
