//! Canonical set of known classes for one snapshot, with the statistics
//! slot owned by each class.

use ahash::AHashMap;
use log::warn;

use crate::snapshot::model::{ClassRef, Scanned, Snapshot};

/// Per-class aggregation result. Created zeroed at registration time and
/// mutated only by the heap pass; monotonically increasing.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ClassStatistics {
    count: u64,
    total_size: u64,
}

impl ClassStatistics {
    pub fn empty() -> ClassStatistics {
        ClassStatistics::default()
    }

    pub fn add_instance(&mut self) {
        self.count += 1;
    }

    pub fn add_size(&mut self, bytes: u64) {
        self.total_size += bytes;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }
}

/// Classes known to one snapshot, pre-populated by a single walk over the
/// class loaders and extended late when the heap walk surfaces a class the
/// loader enumeration never mentioned.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    stats: AHashMap<ClassRef, ClassStatistics>,
    orphans: Vec<ClassRef>,
    orphans_warned: usize,
    corrupt_defined: u64,
    unavailable_defined: u64,
}

impl ClassRegistry {
    /// Walks every class loader's defined-classes enumeration exactly once.
    /// Damaged elements are tallied and reported as one aggregate warning,
    /// not one warning per element.
    pub fn initialize<S: Snapshot + ?Sized>(snapshot: &S) -> ClassRegistry {
        let mut registry = ClassRegistry::default();
        for loader in snapshot.class_loaders() {
            for entry in snapshot.defined_classes(loader) {
                match entry {
                    Scanned::Valid(class) => {
                        registry
                            .stats
                            .entry(class)
                            .or_insert_with(ClassStatistics::empty);
                    }
                    Scanned::Corrupt => registry.corrupt_defined += 1,
                    Scanned::Unavailable => registry.unavailable_defined += 1,
                }
            }
        }
        if registry.corrupt_defined > 0 {
            warn!(
                "{} corrupt entries skipped during class loader walk",
                registry.corrupt_defined
            );
        }
        if registry.unavailable_defined > 0 {
            warn!(
                "{} entries unavailable during class loader walk",
                registry.unavailable_defined
            );
        }
        registry
    }

    /// Registers a class discovered outside the loader walk. Idempotent:
    /// returns `true` only on first registration.
    pub fn register_orphan(&mut self, class: ClassRef) -> bool {
        if self.stats.contains_key(&class) {
            return false;
        }
        self.stats.insert(class, ClassStatistics::empty());
        self.orphans.push(class);
        true
    }

    /// Emits the discovery warning for every orphan not yet announced,
    /// exactly once per orphan across repeated calls. Returns how many
    /// orphans had an unreadable name (no warning is emitted for those).
    pub fn finish_orphans<S: Snapshot + ?Sized>(&mut self, snapshot: &S) -> u64 {
        let mut nameless = 0;
        for &class in &self.orphans[self.orphans_warned..] {
            match snapshot.class_name(class) {
                Ok(name) => warn!(
                    "class {} found when walking the heap, missing from all class loaders",
                    name
                ),
                Err(_) => nameless += 1,
            }
        }
        self.orphans_warned = self.orphans.len();
        nameless
    }

    /// Statistics slot for a registered class. Looking up an unregistered
    /// class is a bug in the caller, not a property of the snapshot.
    pub fn stats_mut(&mut self, class: ClassRef) -> &mut ClassStatistics {
        self.stats
            .get_mut(&class)
            .expect("class must be registered before statistics lookup")
    }

    pub fn stats(&self, class: ClassRef) -> Option<&ClassStatistics> {
        self.stats.get(&class)
    }

    /// Registered classes, in no particular order. Callers impose their own
    /// order through the statistics view.
    pub fn classes(&self) -> impl Iterator<Item = ClassRef> + '_ {
        self.stats.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    pub fn corrupt_defined(&self) -> u64 {
        self.corrupt_defined
    }

    pub fn unavailable_defined(&self) -> u64 {
        self.unavailable_defined
    }
}
