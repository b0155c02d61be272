//! Single pass over every heap's object stream, folding each object into the
//! statistics slot of its class.
//!
//! No failure from a single object may abort the pass: every damage mode is
//! converted into a tally increment and the walk continues.

use std::mem;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};
use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};

use crate::errors::DumpScanError;
use crate::registry::ClassRegistry;
use crate::snapshot::model::{HeapRef, ObjectRecord, Scanned, Snapshot};

// Batch size for the walker -> recorder channel in the parallel pass.
const EVENT_BATCH_SIZE: usize = 8 * 1024;

/// Aggregate damage counts from one heap pass.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct HeapTallies {
    /// Every record yielded by the heap iterations, valid or not.
    pub total_objects: u64,
    /// Records unreadable as objects, plus instances whose size read failed.
    pub corrupt_objects: u64,
    /// Instances whose class resolution failed; counted nowhere else.
    pub corrupt_class_refs: u64,
    /// Orphan classes whose own name could not be read.
    pub corrupt_class_names: u64,
    /// Heaps whose enumeration element was itself unreadable.
    pub skipped_heaps: u64,
}

impl HeapTallies {
    pub fn merge(&mut self, other: &HeapTallies) {
        self.total_objects += other.total_objects;
        self.corrupt_objects += other.corrupt_objects;
        self.corrupt_class_refs += other.corrupt_class_refs;
        self.corrupt_class_names += other.corrupt_class_names;
        self.skipped_heaps += other.skipped_heaps;
    }
}

/// Sequential heap pass. The registry must come from
/// [`ClassRegistry::initialize`] on the same snapshot.
pub fn run<S: Snapshot + ?Sized>(snapshot: &S, registry: &mut ClassRegistry) -> HeapTallies {
    let mut tallies = HeapTallies::default();
    for entry in snapshot.heaps() {
        let heap = match entry {
            Scanned::Valid(heap) => heap,
            Scanned::Corrupt | Scanned::Unavailable => {
                tallies.skipped_heaps += 1;
                warn!("skipping unreadable heap entry");
                continue;
            }
        };
        debug!("walking heap 0x{:x}", heap.address());
        for record in snapshot.objects(heap) {
            record_object(record, registry, &mut tallies);
        }
    }
    tallies.corrupt_class_names += registry.finish_orphans(snapshot);
    log_tallies(&tallies);
    tallies
}

/// Parallel heap pass: heaps are walked by a rayon worker pool, object
/// records travel in pooled batches over a channel to a single recorder
/// thread that owns the registry. Only the recorder mutates statistics, so
/// the count/size sums stay exact.
pub fn run_parallel<S: Snapshot + Sync>(
    snapshot: &S,
    registry: &mut ClassRegistry,
) -> Result<HeapTallies, DumpScanError> {
    let mut tallies = HeapTallies::default();
    let mut heaps: Vec<HeapRef> = Vec::new();
    for entry in snapshot.heaps() {
        match entry {
            Scanned::Valid(heap) => heaps.push(heap),
            Scanned::Corrupt | Scanned::Unavailable => {
                tallies.skipped_heaps += 1;
                warn!("skipping unreadable heap entry");
            }
        }
    }

    // Walker -> recorder record batches.
    let (send_batches, receive_batches): (
        Sender<Vec<Scanned<ObjectRecord>>>,
        Receiver<Vec<Scanned<ObjectRecord>>>,
    ) = crossbeam_channel::bounded(rayon::current_num_threads() * 2);

    // Recorder -> walkers pooled batch buffers.
    let (send_pooled, receive_pooled): (
        Sender<Vec<Scanned<ObjectRecord>>>,
        Receiver<Vec<Scanned<ObjectRecord>>>,
    ) = crossbeam_channel::unbounded();

    // Recorder -> caller final state.
    let (send_result, receive_result): (
        Sender<(ClassRegistry, HeapTallies)>,
        Receiver<(ClassRegistry, HeapTallies)>,
    ) = crossbeam_channel::unbounded();

    // Seed the pool so walkers can make progress independently.
    for _ in 0..rayon::current_num_threads() {
        send_pooled
            .send(Vec::with_capacity(EVENT_BATCH_SIZE))
            .expect("pool channel should be alive");
    }

    let owned_registry = mem::take(registry);
    let recorder_thread = thread::Builder::new()
        .name("dump-recorder".to_string())
        .spawn(move || {
            let mut registry = owned_registry;
            let mut pass_tallies = HeapTallies::default();
            while let Ok(mut batch) = receive_batches.recv() {
                for record in batch.drain(..) {
                    record_object(record, &mut registry, &mut pass_tallies);
                }
                // send back pooled vec (swallow errors as it is possible the
                // walkers already finished)
                send_pooled.send(batch).unwrap_or_default();
            }
            send_result
                .send((registry, pass_tallies))
                .expect("result channel should not be closed");
        })?;

    heaps.par_iter().for_each(|&heap| {
        debug!("walking heap 0x{:x}", heap.address());
        let mut batch = next_buffer(&receive_pooled);
        for record in snapshot.objects(heap) {
            batch.push(record);
            if batch.len() >= EVENT_BATCH_SIZE {
                let full = mem::replace(&mut batch, next_buffer(&receive_pooled));
                send_batches
                    .send(full)
                    .expect("recorder channel should be alive");
            }
        }
        if !batch.is_empty() {
            send_batches
                .send(batch)
                .expect("recorder channel should be alive");
        }
    });
    drop(send_batches);

    let result = receive_result.recv();
    recorder_thread
        .join()
        .map_err(|e| DumpScanError::RecorderThreadError { e })?;
    let (mut owned_registry, pass_tallies) =
        result.expect("recorder sends its result before exiting");
    tallies.merge(&pass_tallies);
    tallies.corrupt_class_names += owned_registry.finish_orphans(snapshot);
    *registry = owned_registry;
    log_tallies(&tallies);
    Ok(tallies)
}

fn next_buffer(pool: &Receiver<Vec<Scanned<ObjectRecord>>>) -> Vec<Scanned<ObjectRecord>> {
    pool.try_recv()
        .unwrap_or_else(|_| Vec::with_capacity(EVENT_BATCH_SIZE))
}

fn record_object(
    record: Scanned<ObjectRecord>,
    registry: &mut ClassRegistry,
    tallies: &mut HeapTallies,
) {
    tallies.total_objects += 1;
    let record = match record {
        Scanned::Valid(record) => record,
        Scanned::Corrupt | Scanned::Unavailable => {
            tallies.corrupt_objects += 1;
            return;
        }
    };
    let class = match record.class {
        Ok(class) => class,
        // not counted toward any class
        Err(_) => {
            tallies.corrupt_class_refs += 1;
            return;
        }
    };
    registry.register_orphan(class);
    let stats = registry.stats_mut(class);
    stats.add_instance();
    match record.size {
        Ok(bytes) => stats.add_size(bytes),
        // the instance still counts, its bytes do not
        Err(_) => tallies.corrupt_objects += 1,
    }
}

// At most three summary lines, each only when its tally is nonzero.
fn log_tallies(tallies: &HeapTallies) {
    if tallies.corrupt_objects > 0 {
        warn!(
            "{} corrupt object records encountered during heap walk",
            tallies.corrupt_objects
        );
    }
    if tallies.corrupt_class_refs > 0 {
        warn!(
            "{} objects with unresolvable class references",
            tallies.corrupt_class_refs
        );
    }
    if tallies.corrupt_class_names > 0 {
        warn!(
            "{} heap-discovered classes with unreadable names",
            tallies.corrupt_class_names
        );
    }
}
