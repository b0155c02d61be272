//! Monitor and concurrent-lock wait graph built from one pass over the
//! monitor list and one pass over the thread list.
//!
//! The concurrency here is data describing a past state: the snapshot is
//! frozen, the graph is rebuilt from scratch for every report and never
//! persisted across reports.

use ahash::{AHashMap, AHashSet};
use log::debug;

use crate::snapshot::model::{
    Address, FieldResult, MonitorRef, Scanned, Snapshot, ThreadRecord, ThreadRef,
    STATE_BLOCKED_ON_MONITOR_ENTER, STATE_IN_OBJECT_WAIT, STATE_PARKED,
};

/// Identity of something threads can wait on: a system monitor, or a plain
/// heap object acting as a `java.util.concurrent` lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    Monitor(MonitorRef),
    Object(Address),
}

impl LockKey {
    pub fn address(self) -> Address {
        match self {
            LockKey::Monitor(monitor) => monitor.address(),
            LockKey::Object(address) => address,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOwner {
    /// A live thread record holds the lock.
    Thread(ThreadRef),
    /// The owning thread exited; only its name survives in the lock
    /// object's own state.
    Ghost(String),
    /// Owner data exists but cannot be resolved.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitKind {
    EnterWaiter,
    NotifyWaiter,
    Parked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    pub thread: ThreadRef,
    pub kind: WaitKind,
}

/// The two maps a caller always wants: who owns each lock, who waits on it.
/// Plus the per-thread view with at most one blocking edge per thread.
#[derive(Debug, Default)]
pub struct LockGraph {
    owner_of: AHashMap<LockKey, LockOwner>,
    waiters_of: AHashMap<LockKey, Vec<Waiter>>,
    names: AHashMap<LockKey, FieldResult<String>>,
    object_monitors: AHashMap<Address, MonitorRef>,
    waiting_on: AHashMap<ThreadRef, (LockKey, WaitKind)>,
    pub corrupt_monitors: u64,
    pub corrupt_threads: u64,
}

impl LockGraph {
    /// `None` means nobody holds the lock, as opposed to
    /// [`LockOwner::Unknown`] which means the owner cannot be told.
    pub fn owner_of(&self, key: LockKey) -> Option<&LockOwner> {
        self.owner_of.get(&key)
    }

    pub fn waiters_of(&self, key: LockKey) -> &[Waiter] {
        self.waiters_of.get(&key).map_or(&[], Vec::as_slice)
    }

    /// Recorded monitor name; `Some(Err(_))` keeps the corrupt/unavailable
    /// distinction for rendering.
    pub fn name_of(&self, key: LockKey) -> Option<&FieldResult<String>> {
        self.names.get(&key)
    }

    /// Monitor backing a heap object, when one exists ("object locks in
    /// use").
    pub fn monitor_for_object(&self, object: Address) -> Option<MonitorRef> {
        self.object_monitors.get(&object).copied()
    }

    pub fn object_monitors(&self) -> impl Iterator<Item = (Address, MonitorRef)> + '_ {
        self.object_monitors.iter().map(|(&obj, &mon)| (obj, mon))
    }

    /// The single blocking relationship reported for a thread, if any.
    pub fn waiting_on(&self, thread: ThreadRef) -> Option<(LockKey, WaitKind)> {
        self.waiting_on.get(&thread).copied()
    }

    /// Every lock the graph knows about, in address order for stable output.
    pub fn locks(&self) -> Vec<LockKey> {
        let mut keys: Vec<LockKey> = self
            .owner_of
            .keys()
            .chain(self.waiters_of.keys())
            .copied()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Which blocking relationship a state bitmask reports. The bits are not
/// guaranteed disjoint in every snapshot format, so the first matching state
/// in this order is authoritative: parked > in-object-wait >
/// blocked-on-enter.
fn classify_block_state(state: u32) -> Option<WaitKind> {
    if state & STATE_PARKED != 0 {
        Some(WaitKind::Parked)
    } else if state & STATE_IN_OBJECT_WAIT != 0 {
        Some(WaitKind::NotifyWaiter)
    } else if state & STATE_BLOCKED_ON_MONITOR_ENTER != 0 {
        Some(WaitKind::EnterWaiter)
    } else {
        None
    }
}

/// Builds the lock graph: one pass over the monitors, one over the threads.
/// Corrupt records are logged and skipped, the passes always complete.
pub fn build<S: Snapshot + ?Sized>(snapshot: &S) -> LockGraph {
    let mut graph = LockGraph::default();

    let mut threads: Vec<ThreadRecord> = Vec::new();
    for entry in snapshot.threads() {
        match entry {
            Scanned::Valid(record) => threads.push(record),
            Scanned::Corrupt | Scanned::Unavailable => {
                graph.corrupt_threads += 1;
                debug!("skipping unreadable thread record");
            }
        }
    }
    let live: AHashSet<ThreadRef> = threads.iter().map(ThreadRecord::handle).collect();

    // Pass 1: system monitors. Waiter lists come straight off the monitor
    // records; indexes by thread feed the per-thread edge resolution below.
    let mut enter_index: AHashMap<ThreadRef, LockKey> = AHashMap::default();
    let mut notify_index: AHashMap<ThreadRef, LockKey> = AHashMap::default();
    for entry in snapshot.monitors() {
        let monitor = match entry {
            Scanned::Valid(record) => record,
            Scanned::Corrupt | Scanned::Unavailable => {
                graph.corrupt_monitors += 1;
                debug!("skipping unreadable monitor record");
                continue;
            }
        };
        let key = LockKey::Monitor(monitor.handle());
        graph.names.insert(key, monitor.name.clone());
        match monitor.owner {
            Ok(Some(owner)) if live.contains(&owner) => {
                graph.owner_of.insert(key, LockOwner::Thread(owner));
            }
            // owner recorded but its thread record is gone or damaged
            Ok(Some(_)) | Err(_) => {
                graph.owner_of.insert(key, LockOwner::Unknown);
            }
            Ok(None) => {}
        }
        for (waiters, kind, index) in [
            (&monitor.enter_waiters, WaitKind::EnterWaiter, &mut enter_index),
            (&monitor.notify_waiters, WaitKind::NotifyWaiter, &mut notify_index),
        ] {
            for waiter in waiters {
                match waiter {
                    Scanned::Valid(thread) => {
                        graph
                            .waiters_of
                            .entry(key)
                            .or_default()
                            .push(Waiter { thread: *thread, kind });
                        index.entry(*thread).or_insert(key);
                    }
                    Scanned::Corrupt | Scanned::Unavailable => graph.corrupt_threads += 1,
                }
            }
        }
        if let Ok(Some(object)) = monitor.object {
            graph.object_monitors.insert(object, monitor.handle());
        }
    }

    // Pass 2: threads. At most one blocking edge per thread.
    let mut parked_objects: AHashSet<Address> = AHashSet::default();
    for thread in &threads {
        let state = match thread.state {
            Ok(state) => state,
            Err(_) => {
                graph.corrupt_threads += 1;
                continue;
            }
        };
        match classify_block_state(state) {
            Some(WaitKind::Parked) => match thread.blocking_object {
                Ok(Some(object)) => {
                    let key = LockKey::Object(object);
                    graph.waiters_of.entry(key).or_default().push(Waiter {
                        thread: thread.handle(),
                        kind: WaitKind::Parked,
                    });
                    graph
                        .waiting_on
                        .insert(thread.handle(), (key, WaitKind::Parked));
                    parked_objects.insert(object);
                }
                // parked without a recorded blocker: nothing to report
                Ok(None) => {}
                Err(_) => graph.corrupt_threads += 1,
            },
            Some(WaitKind::NotifyWaiter) => {
                if let Some(&key) = notify_index.get(&thread.handle()) {
                    graph
                        .waiting_on
                        .insert(thread.handle(), (key, WaitKind::NotifyWaiter));
                }
            }
            Some(WaitKind::EnterWaiter) => {
                if let Some(&key) = enter_index.get(&thread.handle()) {
                    graph
                        .waiting_on
                        .insert(thread.handle(), (key, WaitKind::EnterWaiter));
                }
            }
            None => {}
        }
    }

    // Owner resolution for concurrent locks is indirect: prefer a live
    // thread record, fall back to the name still readable off the lock
    // object's state (ghost owner), report unknown otherwise.
    for object in parked_objects {
        let key = LockKey::Object(object);
        let owner = match snapshot.lock_owner_thread(object) {
            Ok(Some(address)) if live.contains(&ThreadRef(address)) => {
                LockOwner::Thread(ThreadRef(address))
            }
            Ok(None) => continue,
            _ => match snapshot.lock_owner_name(object) {
                Ok(Some(name)) => LockOwner::Ghost(name),
                _ => LockOwner::Unknown,
            },
        };
        graph.owner_of.insert(key, owner);
    }

    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_state_priority_is_parked_first() {
        let all = STATE_PARKED | STATE_IN_OBJECT_WAIT | STATE_BLOCKED_ON_MONITOR_ENTER;
        assert_eq!(classify_block_state(all), Some(WaitKind::Parked));
        assert_eq!(
            classify_block_state(STATE_IN_OBJECT_WAIT | STATE_BLOCKED_ON_MONITOR_ENTER),
            Some(WaitKind::NotifyWaiter)
        );
        assert_eq!(
            classify_block_state(STATE_BLOCKED_ON_MONITOR_ENTER),
            Some(WaitKind::EnterWaiter)
        );
        assert_eq!(classify_block_state(0), None);
    }
}
