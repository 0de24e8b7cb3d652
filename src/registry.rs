//! Tracking registry of live instances.
//!
//! The registry only observes: it stores descriptors, never the objects themselves, so
//! it has no say in when an instance is cleaned up. Explicit disposal removes an
//! instance's entry; automatic cleanup leaves it behind until [`TrackingRegistry::clear`].
use crate::{
    object::ObjectId,
    utils::sync::{Arc, RwLock},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedEntry {
    pub id: ObjectId,
    pub name: Arc<str>,
    pub tier: &'static str,
}

#[derive(Clone, Debug, Default)]
pub struct TrackingRegistry {
    entries: Arc<RwLock<Vec<TrackedEntry>>>,
}

impl TrackingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, entry: TrackedEntry) {
        tracing::trace!("registry: track {} {:?}", entry.id, entry.name);
        self.entries.write().push(entry);
    }

    /// Removes the entry for `id`. Returns `false` if it was not tracked.
    pub fn unregister(&self, id: ObjectId) -> bool {
        let mut entries = self.entries.write();
        match entries.iter().position(|e| e.id == id) {
            Some(i) => {
                entries.remove(i);
                tracing::trace!("registry: untrack {}", id);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.read().iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Point-in-time view of the tracked entries, in registration order.
    pub fn snapshot_live(&self) -> LiveSnapshot {
        LiveSnapshot {
            entries: self.entries.read().iter().cloned().collect(),
        }
    }
}

/// An immutable copy of the registry. Iterating it does not touch the registry, and
/// it can be iterated any number of times.
#[derive(Clone, Debug, PartialEq)]
pub struct LiveSnapshot {
    entries: Arc<[TrackedEntry]>,
}

impl LiveSnapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, TrackedEntry> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| &*e.name)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a LiveSnapshot {
    type Item = &'a TrackedEntry;
    type IntoIter = std::slice::Iter<'a, TrackedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, name: &str) -> TrackedEntry {
        TrackedEntry {
            id: ObjectId::from_raw(id),
            name: Arc::from(name),
            tier: "Derived",
        }
    }

    #[test]
    fn test_register_preserves_order() {
        let registry = TrackingRegistry::new();
        registry.register(entry(1, "a"));
        registry.register(entry(2, "b"));
        registry.register(entry(3, "c"));

        let snapshot = registry.snapshot_live();
        assert_eq!(snapshot.names().collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn test_unregister_absent_is_noop() {
        let registry = TrackingRegistry::new();
        registry.register(entry(1, "a"));
        assert!(registry.unregister(ObjectId::from_raw(1)));
        assert!(!registry.unregister(ObjectId::from_raw(1)));
        assert!(!registry.unregister(ObjectId::from_raw(42)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_restartable_and_detached() {
        let registry = TrackingRegistry::new();
        registry.register(entry(1, "a"));
        registry.register(entry(2, "b"));

        let snapshot = registry.snapshot_live();
        registry.clear();

        assert_eq!(snapshot.iter().count(), 2);
        assert_eq!((&snapshot).into_iter().count(), 2);
        assert!(snapshot.contains(ObjectId::from_raw(2)));
        assert!(registry.snapshot_live().is_empty());
    }

    #[test]
    fn test_clones_share_entries() {
        let registry = TrackingRegistry::new();
        let other = registry.clone();
        other.register(entry(5, "shared"));
        assert!(registry.contains(ObjectId::from_raw(5)));
        assert_eq!(registry.len(), 1);
    }
}
