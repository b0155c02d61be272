//! Read-only projections over the registry after a heap pass: sorted
//! per-class listings, totals, and single-class detail lookup.

use ahash::AHashSet;

use crate::registry::{ClassRegistry, ClassStatistics};
use crate::snapshot::model::{
    Address, ClassRef, FieldRecord, FieldResult, LoaderRef, MethodRecord, Scanned, Snapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    /// Case-insensitive lexicographic; unreadable names sort as empty.
    Name,
    /// Ascending instance count.
    InstanceCount,
    /// Ascending total byte size.
    TotalSize,
}

/// One row of the per-class listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    pub class: ClassRef,
    /// `None` when the class's name could not be read.
    pub name: Option<String>,
    pub count: u64,
    pub total_size: u64,
}

#[derive(Debug, Clone)]
pub struct HeapSummary {
    pub classes: Vec<ClassEntry>,
    pub total_count: u64,
    pub total_size: u64,
}

/// Outcome of a detail lookup. A name defined by several loaders is not an
/// error; callers present all matches with enough detail to disambiguate.
#[derive(Debug)]
pub enum ClassLookup {
    NotFound,
    Single(Box<ClassDetail>),
    Multiple(Vec<ClassMatch>),
}

#[derive(Debug, Clone)]
pub struct ClassMatch {
    pub class: ClassRef,
    pub name: Option<String>,
    pub loader: Option<LoaderRef>,
}

/// One link of a superclass chain, ordered from the class up to the root.
/// A failure partway through truncates the chain with a `Broken` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuperclassLink {
    Known { class: ClassRef, name: Option<String> },
    Broken,
}

#[derive(Debug)]
pub struct ClassDetail {
    pub class: ClassRef,
    pub name: Option<String>,
    pub modifiers: Option<u32>,
    pub loader: Option<LoaderRef>,
    pub stats: ClassStatistics,
    pub superclass_chain: Vec<SuperclassLink>,
    pub fields: FieldResult<Vec<Scanned<FieldRecord>>>,
    pub methods: FieldResult<Vec<Scanned<MethodRecord>>>,
}

pub struct ClassStatisticsView<'a, S: Snapshot + ?Sized> {
    snapshot: &'a S,
    registry: &'a ClassRegistry,
}

impl<'a, S: Snapshot + ?Sized> ClassStatisticsView<'a, S> {
    pub fn new(snapshot: &'a S, registry: &'a ClassRegistry) -> Self {
        ClassStatisticsView { snapshot, registry }
    }

    fn entries(&self) -> Vec<ClassEntry> {
        self.registry
            .classes()
            .map(|class| {
                let stats = self
                    .registry
                    .stats(class)
                    .copied()
                    .unwrap_or_else(ClassStatistics::empty);
                ClassEntry {
                    class,
                    name: self.snapshot.class_name(class).ok(),
                    count: stats.count(),
                    total_size: stats.total_size(),
                }
            })
            .collect()
    }

    /// Per-class rows in the requested order. Ties keep iteration order.
    pub fn sorted(&self, sort: SortBy) -> Vec<ClassEntry> {
        let mut entries = self.entries();
        match sort {
            SortBy::Name => {
                entries.sort_by_cached_key(|e| e.name.as_deref().unwrap_or("").to_lowercase());
            }
            SortBy::InstanceCount => entries.sort_by_key(|e| e.count),
            SortBy::TotalSize => entries.sort_by_key(|e| e.total_size),
        }
        entries
    }

    /// Per-class rows (name order) and the grand totals. By construction the
    /// totals equal the aggregator's tallies minus corrupt instances.
    pub fn summarize(&self) -> HeapSummary {
        let classes = self.sorted(SortBy::Name);
        let total_count = classes.iter().map(|e| e.count).sum();
        let total_size = classes.iter().map(|e| e.total_size).sum();
        HeapSummary {
            classes,
            total_count,
            total_size,
        }
    }

    /// Single-class lookup by qualified name or address literal (decimal or
    /// `0x` hex).
    pub fn detail(&self, query: &str) -> ClassLookup {
        if let Some(address) = parse_address(query) {
            return match self.snapshot.class_by_address(address) {
                Some(class) => ClassLookup::Single(Box::new(self.class_detail(class))),
                None => ClassLookup::NotFound,
            };
        }
        let matches: Vec<ClassRef> = self
            .registry
            .classes()
            .filter(|&class| {
                self.snapshot
                    .class_name(class)
                    .map(|name| name == query)
                    .unwrap_or(false)
            })
            .collect();
        match matches.len() {
            0 => ClassLookup::NotFound,
            1 => ClassLookup::Single(Box::new(self.class_detail(matches[0]))),
            _ => ClassLookup::Multiple(
                matches
                    .into_iter()
                    .map(|class| ClassMatch {
                        class,
                        name: self.snapshot.class_name(class).ok(),
                        loader: self.snapshot.class_loader(class).ok(),
                    })
                    .collect(),
            ),
        }
    }

    fn class_detail(&self, class: ClassRef) -> ClassDetail {
        ClassDetail {
            class,
            name: self.snapshot.class_name(class).ok(),
            modifiers: self.snapshot.class_modifiers(class).ok(),
            loader: self.snapshot.class_loader(class).ok(),
            stats: self
                .registry
                .stats(class)
                .copied()
                .unwrap_or_else(ClassStatistics::empty),
            superclass_chain: self.superclass_chain(class),
            fields: self.snapshot.class_fields(class),
            methods: self.snapshot.class_methods(class),
        }
    }

    fn superclass_chain(&self, class: ClassRef) -> Vec<SuperclassLink> {
        let mut chain = Vec::new();
        let mut seen: AHashSet<ClassRef> = AHashSet::default();
        seen.insert(class);
        let mut current = class;
        loop {
            match self.snapshot.class_superclass(current) {
                Ok(None) => break,
                Ok(Some(superclass)) => {
                    // a cycle means the chain data is damaged
                    if !seen.insert(superclass) {
                        chain.push(SuperclassLink::Broken);
                        break;
                    }
                    chain.push(SuperclassLink::Known {
                        class: superclass,
                        name: self.snapshot.class_name(superclass).ok(),
                    });
                    current = superclass;
                }
                Err(_) => {
                    chain.push(SuperclassLink::Broken);
                    break;
                }
            }
        }
        chain
    }
}

fn parse_address(query: &str) -> Option<Address> {
    if let Some(hex) = query.strip_prefix("0x").or_else(|| query.strip_prefix("0X")) {
        return Address::from_str_radix(hex, 16).ok();
    }
    if !query.is_empty() && query.chars().all(|c| c.is_ascii_digit()) {
        return query.parse().ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator;
    use crate::snapshot::image::ImageSnapshot;
    use crate::snapshot::model::FieldError;

    fn built(image: &ImageSnapshot) -> ClassRegistry {
        let mut registry = ClassRegistry::initialize(image);
        aggregator::run(image, &mut registry);
        registry
    }

    #[test]
    fn name_sort_tolerates_unreadable_names() {
        let mut image = ImageSnapshot::new();
        let loader = image.add_loader(0x10);
        image.add_class(0x100, "Zed", loader);
        let broken = image.add_class(0x200, "ignored", loader);
        image.set_class_name_error(broken, FieldError::Corrupt);
        image.add_class(0x300, "alpha", loader);
        image.add_heap(0x1000, "heap");

        let registry = built(&image);
        let view = ClassStatisticsView::new(&image, &registry);
        let sorted = view.sorted(SortBy::Name);
        assert_eq!(sorted.len(), 3);
        // empty-string fallback sorts first
        assert_eq!(sorted[0].name, None);
        assert_eq!(sorted[1].name.as_deref(), Some("alpha"));
        assert_eq!(sorted[2].name.as_deref(), Some("Zed"));
    }

    #[test]
    fn detail_by_name_reports_every_loader_match() {
        let mut image = ImageSnapshot::new();
        let boot = image.add_loader(0x10);
        let app = image.add_loader(0x20);
        image.add_class(0x100, "com/example/Dup", boot);
        image.add_class(0x200, "com/example/Dup", app);
        image.add_heap(0x1000, "heap");

        let registry = built(&image);
        let view = ClassStatisticsView::new(&image, &registry);
        match view.detail("com/example/Dup") {
            ClassLookup::Multiple(matches) => {
                assert_eq!(matches.len(), 2);
                let loaders: Vec<_> = matches.iter().filter_map(|m| m.loader).collect();
                assert!(loaders.contains(&LoaderRef(0x10)));
                assert!(loaders.contains(&LoaderRef(0x20)));
            }
            other => panic!("expected multiple matches, got {:?}", other),
        }
    }

    #[test]
    fn detail_by_address_resolves_directly() {
        let mut image = ImageSnapshot::new();
        let loader = image.add_loader(0x10);
        image.add_class(0x100, "Only", loader);
        image.add_heap(0x1000, "heap");

        let registry = built(&image);
        let view = ClassStatisticsView::new(&image, &registry);
        match view.detail("0x100") {
            ClassLookup::Single(detail) => assert_eq!(detail.name.as_deref(), Some("Only")),
            other => panic!("expected a single match, got {:?}", other),
        }
        assert!(matches!(view.detail("256"), ClassLookup::Single(_)));
        assert!(matches!(view.detail("0xdead"), ClassLookup::NotFound));
    }

    #[test]
    fn superclass_chain_truncates_on_damage() {
        let mut image = ImageSnapshot::new();
        let loader = image.add_loader(0x10);
        let child = image.add_class(0x100, "Child", loader);
        let parent = image.add_class(0x200, "Parent", loader);
        image.set_superclass(child, Ok(Some(parent)));
        image.set_superclass(parent, Err(FieldError::Corrupt));
        image.add_heap(0x1000, "heap");

        let registry = built(&image);
        let view = ClassStatisticsView::new(&image, &registry);
        match view.detail("Child") {
            ClassLookup::Single(detail) => {
                assert_eq!(
                    detail.superclass_chain,
                    vec![
                        SuperclassLink::Known {
                            class: parent,
                            name: Some("Parent".to_string())
                        },
                        SuperclassLink::Broken,
                    ]
                );
            }
            other => panic!("expected a single match, got {:?}", other),
        }
    }
}
