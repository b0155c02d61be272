//! End-to-end heap statistics scenarios over fixture snapshots.

use jdmpscan::aggregator::{self, HeapTallies};
use jdmpscan::registry::ClassRegistry;
use jdmpscan::snapshot::image::ImageSnapshot;
use jdmpscan::snapshot::model::{ClassRef, FieldError, ObjectRecord, Scanned};
use jdmpscan::view::{ClassStatisticsView, SortBy};

fn build(image: &ImageSnapshot) -> (ClassRegistry, HeapTallies) {
    let mut registry = ClassRegistry::initialize(image);
    let tallies = aggregator::run(image, &mut registry);
    (registry, tallies)
}

#[test]
fn summarize_counts_three_classes_and_one_corrupt_object() {
    // 3 classes: A (2 instances, sizes 10 and 20), B (1 instance, size 5),
    // C (0 instances), plus one corrupt object record.
    let mut image = ImageSnapshot::new();
    let loader = image.add_loader(0x10);
    let a = image.add_class(0x100, "A", loader);
    let b = image.add_class(0x200, "B", loader);
    image.add_class(0x300, "C", loader);
    let heap = image.add_heap(0x1000, "heap");
    image.add_object(heap, 0x5000, a, 10);
    image.add_object(heap, 0x5010, a, 20);
    image.add_object(heap, 0x5020, b, 5);
    image.add_object_record(heap, Scanned::Corrupt);

    let (registry, tallies) = build(&image);
    let view = ClassStatisticsView::new(&image, &registry);
    let summary = view.summarize();

    assert_eq!(summary.total_count, 3);
    assert_eq!(summary.total_size, 35);
    assert_eq!(tallies.corrupt_objects, 1);
    assert_eq!(tallies.total_objects, 4);

    let by_size = view.sorted(SortBy::TotalSize);
    let names: Vec<_> = by_size.iter().map(|e| e.name.as_deref()).collect();
    assert_eq!(names, vec![Some("C"), Some("B"), Some("A")]);
    assert_eq!(by_size[0].total_size, 0);
    assert_eq!(by_size[1].total_size, 5);
    assert_eq!(by_size[2].total_size, 30);
}

#[test]
fn sum_invariant_holds_across_heaps_and_damage() {
    let mut image = ImageSnapshot::new();
    let loader = image.add_loader(0x10);
    let a = image.add_class(0x100, "A", loader);
    let b = image.add_class(0x200, "B", loader);
    let h1 = image.add_heap(0x1000, "nursery");
    let h2 = image.add_heap(0x2000, "tenured");
    image.add_object(h1, 0x5000, a, 8);
    image.add_object(h1, 0x5010, b, 8);
    image.add_object_record(h1, Scanned::Corrupt);
    image.add_object(h2, 0x6000, a, 8);
    image.add_object_record(h2, Scanned::Unavailable);
    image.add_object_record(
        h2,
        Scanned::Valid(ObjectRecord {
            address: 0x6010,
            class: Err(FieldError::Corrupt),
            size: Ok(8),
        }),
    );

    let (registry, tallies) = build(&image);
    let counted: u64 = registry
        .classes()
        .filter_map(|c| registry.stats(c))
        .map(|s| s.count())
        .sum();
    // every yielded record is either counted in a class, a corrupt object,
    // or a corrupt class reference
    assert_eq!(
        counted + tallies.corrupt_objects + tallies.corrupt_class_refs,
        tallies.total_objects
    );
    assert_eq!(tallies.total_objects, 6);
}

#[test]
fn orphan_class_registers_once_with_full_statistics() {
    // one class visible only from the heap walk, one instance of size 100
    let mut image = ImageSnapshot::new();
    image.add_loader(0x10);
    let orphan = image.add_unlisted_class(0x900, "com/example/Hidden");
    let heap = image.add_heap(0x1000, "heap");
    image.add_object(heap, 0x5000, orphan, 100);

    let (registry, tallies) = build(&image);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.orphan_count(), 1);
    assert_eq!(tallies.corrupt_class_names, 0);
    let stats = registry.stats(orphan).expect("orphan is registered");
    assert_eq!(stats.count(), 1);
    assert_eq!(stats.total_size(), 100);
}

#[test]
fn orphan_registration_is_idempotent_across_instances() {
    let mut image = ImageSnapshot::new();
    image.add_loader(0x10);
    let orphan = image.add_unlisted_class(0x900, "Hidden");
    let heap = image.add_heap(0x1000, "heap");
    image.add_object(heap, 0x5000, orphan, 8);
    image.add_object(heap, 0x5010, orphan, 8);
    image.add_object(heap, 0x5020, orphan, 8);

    let (registry, _) = build(&image);
    assert_eq!(registry.orphan_count(), 1);
    let stats = registry.stats(orphan).expect("orphan is registered");
    assert_eq!(stats.count(), 3);
    assert_eq!(stats.total_size(), 24);
}

#[test]
fn orphan_with_unreadable_name_is_tallied_not_warned() {
    let mut image = ImageSnapshot::new();
    image.add_loader(0x10);
    let orphan = image.add_unlisted_class(0x900, "ignored");
    image.set_class_name_error(orphan, FieldError::Corrupt);
    let heap = image.add_heap(0x1000, "heap");
    image.add_object(heap, 0x5000, orphan, 8);

    let (registry, tallies) = build(&image);
    assert_eq!(registry.orphan_count(), 1);
    assert_eq!(tallies.corrupt_class_names, 1);
    let stats = registry.stats(orphan).expect("orphan is registered");
    assert_eq!(stats.count(), 1);
}

#[test]
fn size_failure_never_reduces_the_count() {
    let mut image = ImageSnapshot::new();
    let loader = image.add_loader(0x10);
    let a = image.add_class(0x100, "A", loader);
    let heap = image.add_heap(0x1000, "heap");
    image.add_object(heap, 0x5000, a, 40);
    image.add_object_record(
        heap,
        Scanned::Valid(ObjectRecord {
            address: 0x5010,
            class: Ok(a),
            size: Err(FieldError::Unavailable),
        }),
    );

    let (registry, tallies) = build(&image);
    let stats = registry.stats(a).expect("class is registered");
    assert_eq!(stats.count(), 2);
    assert_eq!(stats.total_size(), 40);
    assert_eq!(tallies.corrupt_objects, 1);
}

#[test]
fn damaged_heap_entries_are_skipped_and_tallied() {
    let mut image = ImageSnapshot::new();
    let loader = image.add_loader(0x10);
    let a = image.add_class(0x100, "A", loader);
    let heap = image.add_heap(0x1000, "good");
    image.add_object(heap, 0x5000, a, 8);
    image.add_damaged_heap(Scanned::Corrupt);
    image.add_damaged_heap(Scanned::Unavailable);

    let (registry, tallies) = build(&image);
    assert_eq!(tallies.skipped_heaps, 2);
    assert_eq!(tallies.total_objects, 1);
    let stats = registry.stats(a).expect("class is registered");
    assert_eq!(stats.count(), 1);
}

#[test]
fn corrupt_loader_entries_are_aggregated_not_fatal() {
    let mut image = ImageSnapshot::new();
    let loader = image.add_loader(0x10);
    image.add_class(0x100, "A", loader);
    image.add_damaged_defined(loader, Scanned::Corrupt);
    image.add_damaged_defined(loader, Scanned::Corrupt);
    image.add_damaged_defined(loader, Scanned::Unavailable);
    image.add_heap(0x1000, "heap");

    let (registry, _) = build(&image);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.corrupt_defined(), 2);
    assert_eq!(registry.unavailable_defined(), 1);
}

#[test]
fn name_sort_places_unreadable_names_first() {
    let mut image = ImageSnapshot::new();
    let loader = image.add_loader(0x10);
    image.add_class(0x100, "beta", loader);
    let nameless = image.add_class(0x200, "ignored", loader);
    image.set_class_name_error(nameless, FieldError::Corrupt);
    image.add_class(0x300, "Alpha", loader);
    image.add_heap(0x1000, "heap");

    let (registry, _) = build(&image);
    let view = ClassStatisticsView::new(&image, &registry);
    let sorted = view.sorted(SortBy::Name);
    assert_eq!(sorted[0].class, ClassRef(0x200));
    // case-insensitive: Alpha before beta
    assert_eq!(sorted[1].name.as_deref(), Some("Alpha"));
    assert_eq!(sorted[2].name.as_deref(), Some("beta"));
}

#[test]
fn parallel_walk_preserves_the_sum_invariant() {
    let mut image = ImageSnapshot::new();
    let loader = image.add_loader(0x10);
    let a = image.add_class(0x100, "A", loader);
    let b = image.add_class(0x200, "B", loader);
    let orphan = image.add_unlisted_class(0x900, "Hidden");
    for h in 0..4u64 {
        let heap = image.add_heap(0x1000 + h * 0x100, "heap");
        for i in 0..50u64 {
            let address = 0x10000 + h * 0x1000 + i * 0x10;
            let class = match i % 3 {
                0 => a,
                1 => b,
                _ => orphan,
            };
            image.add_object(heap, address, class, 16);
        }
        image.add_object_record(heap, Scanned::Corrupt);
    }

    let mut registry = ClassRegistry::initialize(&image);
    let tallies =
        aggregator::run_parallel(&image, &mut registry).expect("parallel pass should succeed");

    let counted: u64 = registry
        .classes()
        .filter_map(|c| registry.stats(c))
        .map(|s| s.count())
        .sum();
    assert_eq!(counted + tallies.corrupt_objects, tallies.total_objects);
    assert_eq!(tallies.total_objects, 204);
    assert_eq!(tallies.corrupt_objects, 4);
    assert_eq!(registry.orphan_count(), 1);
}
