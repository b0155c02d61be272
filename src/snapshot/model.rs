//! Contract between the analysis core and whatever materialized the dump.
//!
//! A snapshot is a frozen image of a process captured at one point in time.
//! Any part of it may be damaged: a sequence element can be unreadable as a
//! whole, and an individually valid record can still have fields that cannot
//! be read. Both failure shapes are values here, never panics.

use thiserror::Error;

/// Native-memory address inside the captured process image.
///
/// All opaque handles are address-valued: equality is address equality and
/// holds only within one snapshot load. Handles must never be carried across
/// a snapshot reload.
pub type Address = u64;

macro_rules! address_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Address);

        impl $name {
            pub fn address(self) -> Address {
                self.0
            }
        }
    };
}

address_handle!(
    /// Handle to a class definition.
    ClassRef
);
address_handle!(
    /// Handle to a class loader.
    LoaderRef
);
address_handle!(
    /// Handle to one heap of the captured runtime.
    HeapRef
);
address_handle!(
    /// Handle to a thread of the captured runtime.
    ThreadRef
);
address_handle!(
    /// Handle to a system monitor.
    MonitorRef
);

/// One element of a snapshot sequence.
///
/// `Corrupt` stands in for an element that could not be parsed, as opposed to
/// being absent. `Unavailable` means the snapshot format does not carry this
/// information at all; the two imply different remediation and are never
/// conflated downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scanned<T> {
    Valid(T),
    Corrupt,
    Unavailable,
}

impl<T> Scanned<T> {
    pub fn valid(self) -> Option<T> {
        match self {
            Scanned::Valid(v) => Some(v),
            Scanned::Corrupt | Scanned::Unavailable => None,
        }
    }
}

/// Failure reading a single field of an otherwise valid record.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    #[error("corrupt data")]
    Corrupt,
    #[error("data unavailable")]
    Unavailable,
}

pub type FieldResult<T> = Result<T, FieldError>;

/// One object yielded by a heap walk. Read once, folded into the statistics
/// of its class, then discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRecord {
    pub address: Address,
    /// Resolution of the object's class can fail independently of the
    /// object record itself being readable.
    pub class: FieldResult<ClassRef>,
    /// Size in bytes. A count can be known even when a size is not.
    pub size: FieldResult<u64>,
}

/// Declared field of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRecord {
    pub name: FieldResult<String>,
    pub signature: FieldResult<String>,
    pub modifiers: u32,
}

impl FieldRecord {
    pub fn is_static(&self) -> bool {
        self.modifiers & MOD_STATIC != 0
    }
}

/// Declared method of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRecord {
    pub name: FieldResult<String>,
    pub signature: FieldResult<String>,
    pub modifiers: u32,
}

/// Thread of the captured runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRecord {
    pub address: Address,
    pub name: FieldResult<String>,
    /// JVMTI-style state bitmask. The bits are not guaranteed disjoint in
    /// all snapshot formats.
    pub state: FieldResult<u32>,
    /// For parked threads, the `java.util.concurrent` lock object blocking
    /// them, when one was recorded.
    pub blocking_object: FieldResult<Option<Address>>,
    /// Native thread correlation. `Ok(None)` marks an orphaned thread with
    /// no native counterpart in the image.
    pub native_id: FieldResult<Option<u64>>,
}

impl ThreadRecord {
    pub fn handle(&self) -> ThreadRef {
        ThreadRef(self.address)
    }
}

/// System monitor of the captured runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorRecord {
    pub address: Address,
    pub name: FieldResult<String>,
    /// `Ok(None)` means unowned; a recorded owner may still lack a live
    /// thread record (the thread exited before capture).
    pub owner: FieldResult<Option<ThreadRef>>,
    pub enter_waiters: Vec<Scanned<ThreadRef>>,
    pub notify_waiters: Vec<Scanned<ThreadRef>>,
    /// Associated heap object, `Ok(None)` for raw/system monitors.
    pub object: FieldResult<Option<Address>>,
}

impl MonitorRecord {
    pub fn handle(&self) -> MonitorRef {
        MonitorRef(self.address)
    }
}

// JVMTI thread state constants, as carried by dump thread records.
pub const STATE_ALIVE: u32 = 0x0001;
pub const STATE_TERMINATED: u32 = 0x0002;
pub const STATE_RUNNABLE: u32 = 0x0004;
pub const STATE_WAITING_INDEFINITELY: u32 = 0x0010;
pub const STATE_WAITING_WITH_TIMEOUT: u32 = 0x0020;
pub const STATE_SLEEPING: u32 = 0x0040;
pub const STATE_WAITING: u32 = 0x0080;
pub const STATE_IN_OBJECT_WAIT: u32 = 0x0100;
pub const STATE_PARKED: u32 = 0x0200;
pub const STATE_BLOCKED_ON_MONITOR_ENTER: u32 = 0x0400;

// JVM modifier bits for classes, fields and methods.
pub const MOD_PUBLIC: u32 = 0x0001;
pub const MOD_PRIVATE: u32 = 0x0002;
pub const MOD_PROTECTED: u32 = 0x0004;
pub const MOD_STATIC: u32 = 0x0008;
pub const MOD_FINAL: u32 = 0x0010;
pub const MOD_SYNCHRONIZED: u32 = 0x0020;
pub const MOD_VOLATILE: u32 = 0x0040;
pub const MOD_TRANSIENT: u32 = 0x0080;
pub const MOD_NATIVE: u32 = 0x0100;
pub const MOD_INTERFACE: u32 = 0x0200;
pub const MOD_ABSTRACT: u32 = 0x0400;

/// Read access to a materialized process snapshot.
///
/// Every sequence is a plain forward-only cursor; every per-record accessor
/// can fail on its own with a [`FieldError`]. Implementations are expected
/// to be cheap to query repeatedly: the aggregation passes consult them once
/// per element, detail lookups on demand.
pub trait Snapshot {
    fn class_loaders(&self) -> Box<dyn Iterator<Item = LoaderRef> + '_>;
    fn defined_classes(&self, loader: LoaderRef)
        -> Box<dyn Iterator<Item = Scanned<ClassRef>> + '_>;

    fn heaps(&self) -> Box<dyn Iterator<Item = Scanned<HeapRef>> + '_>;
    fn heap_name(&self, heap: HeapRef) -> FieldResult<String>;
    fn objects(&self, heap: HeapRef) -> Box<dyn Iterator<Item = Scanned<ObjectRecord>> + '_>;

    fn class_name(&self, class: ClassRef) -> FieldResult<String>;
    fn class_superclass(&self, class: ClassRef) -> FieldResult<Option<ClassRef>>;
    fn class_loader(&self, class: ClassRef) -> FieldResult<LoaderRef>;
    fn class_modifiers(&self, class: ClassRef) -> FieldResult<u32>;
    fn class_fields(&self, class: ClassRef) -> FieldResult<Vec<Scanned<FieldRecord>>>;
    fn class_methods(&self, class: ClassRef) -> FieldResult<Vec<Scanned<MethodRecord>>>;
    /// Direct class lookup by address, for address-form detail queries.
    fn class_by_address(&self, address: Address) -> Option<ClassRef>;

    fn threads(&self) -> Box<dyn Iterator<Item = Scanned<ThreadRecord>> + '_>;
    fn monitors(&self) -> Box<dyn Iterator<Item = Scanned<MonitorRecord>> + '_>;

    /// Owner thread address recorded in a `java.util.concurrent` lock
    /// object's own state.
    fn lock_owner_thread(&self, object: Address) -> FieldResult<Option<Address>>;
    /// Owner thread name read off the lock object's state. Still reachable
    /// after the owning thread's record has vanished from the snapshot.
    fn lock_owner_name(&self, object: Address) -> FieldResult<Option<String>>;
}
