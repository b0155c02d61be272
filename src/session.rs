//! Per-session aggregation state. One `DumpSession` owns the derived class
//! statistics for one snapshot; when the snapshot changes the caller
//! invalidates the session and the next request rebuilds from scratch.

use crate::aggregator::{self, HeapTallies};
use crate::monitors::{self, LockGraph};
use crate::registry::ClassRegistry;
use crate::snapshot::model::Snapshot;
use crate::view::ClassStatisticsView;

struct BuiltState {
    registry: ClassRegistry,
    tallies: HeapTallies,
}

pub struct DumpSession<S: Snapshot> {
    snapshot: S,
    built: Option<BuiltState>,
}

impl<S: Snapshot> DumpSession<S> {
    pub fn new(snapshot: S) -> Self {
        DumpSession {
            snapshot,
            built: None,
        }
    }

    pub fn snapshot(&self) -> &S {
        &self.snapshot
    }

    /// Drops the derived statistics; the next request rebuilds them. Call
    /// after the underlying snapshot has been reloaded.
    pub fn invalidate(&mut self) {
        self.built = None;
    }

    fn ensure_built(&mut self) -> &BuiltState {
        if self.built.is_none() {
            let mut registry = ClassRegistry::initialize(&self.snapshot);
            let tallies = aggregator::run(&self.snapshot, &mut registry);
            self.built = Some(BuiltState { registry, tallies });
        }
        self.built.as_ref().expect("state was just built")
    }

    pub fn tallies(&mut self) -> HeapTallies {
        self.ensure_built().tallies
    }

    pub fn view(&mut self) -> ClassStatisticsView<'_, S> {
        self.ensure_built();
        let built = self.built.as_ref().expect("state was just built");
        ClassStatisticsView::new(&self.snapshot, &built.registry)
    }

    pub fn registry(&mut self) -> &ClassRegistry {
        &self.ensure_built().registry
    }

    /// Lock graphs are rebuilt for every report, never cached: they are
    /// cheap relative to the heap pass and carry no cross-report state.
    pub fn lock_graph(&self) -> LockGraph {
        monitors::build(&self.snapshot)
    }
}
