//! Arena-backed in-memory [`Snapshot`] implementation.
//!
//! A core reader populates one `ImageSnapshot` per dump load; the arenas are
//! keyed by address so handle equality is address equality. The same builder
//! API drives the test fixtures.

use ahash::AHashMap;

use crate::snapshot::model::{
    Address, ClassRef, FieldError, FieldRecord, FieldResult, HeapRef, LoaderRef, MethodRecord,
    MonitorRecord, ObjectRecord, Scanned, Snapshot, ThreadRecord,
};

#[derive(Debug)]
struct ClassSlot {
    name: FieldResult<String>,
    superclass: FieldResult<Option<ClassRef>>,
    loader: FieldResult<LoaderRef>,
    modifiers: FieldResult<u32>,
    fields: FieldResult<Vec<Scanned<FieldRecord>>>,
    methods: FieldResult<Vec<Scanned<MethodRecord>>>,
}

#[derive(Debug)]
struct HeapSlot {
    name: FieldResult<String>,
    objects: Vec<Scanned<ObjectRecord>>,
}

impl Default for ClassSlot {
    fn default() -> Self {
        ClassSlot {
            name: Err(FieldError::Unavailable),
            superclass: Ok(None),
            loader: Err(FieldError::Unavailable),
            modifiers: Err(FieldError::Unavailable),
            fields: Ok(Vec::new()),
            methods: Ok(Vec::new()),
        }
    }
}

/// Recorded state of a `java.util.concurrent` lock object.
#[derive(Debug)]
struct ParkBlockerSlot {
    owner_thread: FieldResult<Option<Address>>,
    owner_name: FieldResult<Option<String>>,
}

/// In-memory snapshot arena. Built once per dump load, immutable afterwards
/// as far as the analysis core is concerned.
#[derive(Default)]
pub struct ImageSnapshot {
    loaders: Vec<LoaderRef>,
    defined: AHashMap<LoaderRef, Vec<Scanned<ClassRef>>>,
    classes: AHashMap<Address, ClassSlot>,
    heaps: Vec<Scanned<HeapRef>>,
    heap_slots: AHashMap<HeapRef, HeapSlot>,
    threads: Vec<Scanned<ThreadRecord>>,
    monitors: Vec<Scanned<MonitorRecord>>,
    park_blockers: AHashMap<Address, ParkBlockerSlot>,
}

impl ImageSnapshot {
    pub fn new() -> Self {
        ImageSnapshot::default()
    }

    pub fn add_loader(&mut self, address: Address) -> LoaderRef {
        let loader = LoaderRef(address);
        self.loaders.push(loader);
        self.defined.entry(loader).or_default();
        loader
    }

    /// Registers a class and lists it in its loader's defined-classes
    /// enumeration.
    pub fn add_class(&mut self, address: Address, name: &str, loader: LoaderRef) -> ClassRef {
        let class = self.add_unlisted_class(address, name);
        if let Some(slot) = self.classes.get_mut(&address) {
            slot.loader = Ok(loader);
        }
        self.defined.entry(loader).or_default().push(Scanned::Valid(class));
        class
    }

    /// Registers a class reachable by address but absent from every loader
    /// enumeration. The heap walk discovers such classes as orphans.
    pub fn add_unlisted_class(&mut self, address: Address, name: &str) -> ClassRef {
        self.classes.insert(
            address,
            ClassSlot {
                name: Ok(name.to_string()),
                ..ClassSlot::default()
            },
        );
        ClassRef(address)
    }

    /// Pushes a damaged element into a loader's defined-classes enumeration.
    pub fn add_damaged_defined(&mut self, loader: LoaderRef, marker: Scanned<ClassRef>) {
        self.defined.entry(loader).or_default().push(marker);
    }

    pub fn set_class_name_error(&mut self, class: ClassRef, error: FieldError) {
        self.class_slot(class).name = Err(error);
    }

    pub fn set_superclass(&mut self, class: ClassRef, superclass: FieldResult<Option<ClassRef>>) {
        self.class_slot(class).superclass = superclass;
    }

    pub fn set_class_modifiers(&mut self, class: ClassRef, modifiers: u32) {
        self.class_slot(class).modifiers = Ok(modifiers);
    }

    pub fn add_class_field(&mut self, class: ClassRef, field: Scanned<FieldRecord>) {
        if let Ok(fields) = &mut self.class_slot(class).fields {
            fields.push(field);
        }
    }

    pub fn add_class_method(&mut self, class: ClassRef, method: Scanned<MethodRecord>) {
        if let Ok(methods) = &mut self.class_slot(class).methods {
            methods.push(method);
        }
    }

    fn class_slot(&mut self, class: ClassRef) -> &mut ClassSlot {
        self.classes
            .get_mut(&class.address())
            .expect("class must be added to the image before mutation")
    }

    pub fn add_heap(&mut self, address: Address, name: &str) -> HeapRef {
        let heap = HeapRef(address);
        self.heaps.push(Scanned::Valid(heap));
        self.heap_slots.insert(
            heap,
            HeapSlot {
                name: Ok(name.to_string()),
                objects: Vec::new(),
            },
        );
        heap
    }

    /// Pushes a damaged element into the heap enumeration itself.
    pub fn add_damaged_heap(&mut self, marker: Scanned<HeapRef>) {
        self.heaps.push(marker);
    }

    pub fn add_object(&mut self, heap: HeapRef, address: Address, class: ClassRef, size: u64) {
        self.add_object_record(
            heap,
            Scanned::Valid(ObjectRecord {
                address,
                class: Ok(class),
                size: Ok(size),
            }),
        );
    }

    pub fn add_object_record(&mut self, heap: HeapRef, record: Scanned<ObjectRecord>) {
        self.heap_slots
            .get_mut(&heap)
            .expect("heap must be added to the image before objects")
            .objects
            .push(record);
    }

    pub fn add_thread(&mut self, thread: ThreadRecord) {
        self.threads.push(Scanned::Valid(thread));
    }

    pub fn add_damaged_thread(&mut self, marker: Scanned<ThreadRecord>) {
        self.threads.push(marker);
    }

    pub fn add_monitor(&mut self, monitor: MonitorRecord) {
        self.monitors.push(Scanned::Valid(monitor));
    }

    pub fn add_damaged_monitor(&mut self, marker: Scanned<MonitorRecord>) {
        self.monitors.push(marker);
    }

    /// Records the ownership state carried by a concurrent lock object.
    pub fn set_lock_owner(
        &mut self,
        object: Address,
        owner_thread: FieldResult<Option<Address>>,
        owner_name: FieldResult<Option<String>>,
    ) {
        self.park_blockers.insert(
            object,
            ParkBlockerSlot {
                owner_thread,
                owner_name,
            },
        );
    }
}

impl Snapshot for ImageSnapshot {
    fn class_loaders(&self) -> Box<dyn Iterator<Item = LoaderRef> + '_> {
        Box::new(self.loaders.iter().copied())
    }

    fn defined_classes(
        &self,
        loader: LoaderRef,
    ) -> Box<dyn Iterator<Item = Scanned<ClassRef>> + '_> {
        match self.defined.get(&loader) {
            Some(classes) => Box::new(classes.iter().copied()),
            None => Box::new(std::iter::empty()),
        }
    }

    fn heaps(&self) -> Box<dyn Iterator<Item = Scanned<HeapRef>> + '_> {
        Box::new(self.heaps.iter().copied())
    }

    fn heap_name(&self, heap: HeapRef) -> FieldResult<String> {
        self.heap_slots
            .get(&heap)
            .map_or(Err(FieldError::Corrupt), |slot| slot.name.clone())
    }

    fn objects(&self, heap: HeapRef) -> Box<dyn Iterator<Item = Scanned<ObjectRecord>> + '_> {
        match self.heap_slots.get(&heap) {
            Some(slot) => Box::new(slot.objects.iter().copied()),
            None => Box::new(std::iter::empty()),
        }
    }

    fn class_name(&self, class: ClassRef) -> FieldResult<String> {
        self.with_class(class, |slot| slot.name.clone())
    }

    fn class_superclass(&self, class: ClassRef) -> FieldResult<Option<ClassRef>> {
        self.with_class(class, |slot| slot.superclass)
    }

    fn class_loader(&self, class: ClassRef) -> FieldResult<LoaderRef> {
        self.with_class(class, |slot| slot.loader)
    }

    fn class_modifiers(&self, class: ClassRef) -> FieldResult<u32> {
        self.with_class(class, |slot| slot.modifiers)
    }

    fn class_fields(&self, class: ClassRef) -> FieldResult<Vec<Scanned<FieldRecord>>> {
        self.with_class(class, |slot| slot.fields.clone())
    }

    fn class_methods(&self, class: ClassRef) -> FieldResult<Vec<Scanned<MethodRecord>>> {
        self.with_class(class, |slot| slot.methods.clone())
    }

    fn class_by_address(&self, address: Address) -> Option<ClassRef> {
        self.classes.get(&address).map(|_| ClassRef(address))
    }

    fn threads(&self) -> Box<dyn Iterator<Item = Scanned<ThreadRecord>> + '_> {
        Box::new(self.threads.iter().cloned())
    }

    fn monitors(&self) -> Box<dyn Iterator<Item = Scanned<MonitorRecord>> + '_> {
        Box::new(self.monitors.iter().cloned())
    }

    fn lock_owner_thread(&self, object: Address) -> FieldResult<Option<Address>> {
        self.park_blockers
            .get(&object)
            .map_or(Ok(None), |slot| slot.owner_thread)
    }

    fn lock_owner_name(&self, object: Address) -> FieldResult<Option<String>> {
        self.park_blockers
            .get(&object)
            .map_or(Ok(None), |slot| slot.owner_name.clone())
    }
}

impl ImageSnapshot {
    // A class reference pointing outside the arena reads as corrupt data,
    // the same signal a damaged in-image class definition produces.
    fn with_class<T>(&self, class: ClassRef, read: impl FnOnce(&ClassSlot) -> FieldResult<T>) -> FieldResult<T> {
        match self.classes.get(&class.address()) {
            Some(slot) => read(slot),
            None => Err(FieldError::Corrupt),
        }
    }
}
