//! Text rendering for class statistics, monitor graphs and thread lists.
//!
//! Corrupt and unavailable data render with distinct placeholders: corrupt
//! means the capture is damaged, unavailable means the snapshot format never
//! carried the information.

use ahash::AHashMap;
use indoc::formatdoc;

use crate::aggregator::HeapTallies;
use crate::monitors::{LockGraph, LockKey, LockOwner, WaitKind};
use crate::registry::ClassRegistry;
use crate::snapshot::model::{
    FieldError, FieldResult, Scanned, Snapshot, ThreadRecord, ThreadRef, MOD_ABSTRACT, MOD_FINAL,
    MOD_INTERFACE, MOD_NATIVE, MOD_PRIVATE, MOD_PROTECTED, MOD_PUBLIC, MOD_STATIC,
    MOD_SYNCHRONIZED, MOD_TRANSIENT, MOD_VOLATILE, STATE_BLOCKED_ON_MONITOR_ENTER,
    STATE_IN_OBJECT_WAIT, STATE_PARKED, STATE_RUNNABLE, STATE_SLEEPING, STATE_TERMINATED,
    STATE_WAITING,
};
use crate::utils::pretty_bytes_size;
use crate::view::{ClassDetail, ClassEntry, HeapSummary, SuperclassLink};

pub const CORRUPT_PLACEHOLDER: &str = "<corrupt data>";
pub const UNAVAILABLE_PLACEHOLDER: &str = "<data unavailable>";

fn placeholder(error: FieldError) -> &'static str {
    match error {
        FieldError::Corrupt => CORRUPT_PLACEHOLDER,
        FieldError::Unavailable => UNAVAILABLE_PLACEHOLDER,
    }
}

fn text_or_placeholder(value: &FieldResult<String>) -> &str {
    match value {
        Ok(text) => text,
        Err(error) => placeholder(*error),
    }
}

/// Renders the per-class listing as an aligned table:
/// `Total size | Instances | Class name`.
pub fn render_class_table(entries: &[ClassEntry]) -> String {
    let rows_formatted: Vec<(String, String, &str)> = entries
        .iter()
        .map(|entry| {
            (
                pretty_bytes_size(entry.total_size),
                entry.count.to_string(),
                entry.name.as_deref().unwrap_or(CORRUPT_PLACEHOLDER),
            )
        })
        .collect();

    let total_size_header = "Total size";
    let total_size_len = column_width(total_size_header, rows_formatted.iter().map(|r| &*r.0));
    let instance_header = "Instances";
    let instance_len = column_width(instance_header, rows_formatted.iter().map(|r| &*r.1));
    let class_name_header = "Class name";

    let mut table = String::new();
    let header = format!(
        "{}{} | {}{} | {}\n",
        column_padding(total_size_header, total_size_len),
        total_size_header,
        column_padding(instance_header, instance_len),
        instance_header,
        class_name_header,
    );
    let header_len = header.chars().count();
    table.push_str(&header);
    table.push_str(&"-".repeat(header_len));
    table.push('\n');

    for (size, count, class_name) in rows_formatted {
        let row = format!(
            "{}{} | {}{} | {}\n",
            column_padding(&size, total_size_len),
            size,
            column_padding(&count, instance_len),
            count,
            class_name
        );
        table.push_str(&row);
    }
    table
}

fn column_width<'a>(header: &str, items: impl Iterator<Item = &'a str>) -> usize {
    items
        .map(|item| item.chars().count())
        .max()
        .unwrap_or(0)
        .max(header.chars().count())
}

fn column_padding(item: &str, width: usize) -> String {
    let item_len = item.chars().count();
    " ".repeat(width.saturating_sub(item_len))
}

/// Snapshot-wide summary: class totals and every damage tally.
pub fn render_summary(
    registry: &ClassRegistry,
    summary: &HeapSummary,
    tallies: &HeapTallies,
) -> String {
    formatdoc!(
        "\nSnapshot class summary:\n
        Classes known: {}
        Classes found only during heap walk: {}
        Corrupt class loader entries: {}
        Unavailable class loader entries: {}
        Object records seen: {}
        Corrupt objects: {}
        Corrupt class references: {}
        Corrupt class names: {}
        Skipped heaps: {}
        Total instances counted: {}
        Total bytes counted: {}",
        registry.len(),
        registry.orphan_count(),
        registry.corrupt_defined(),
        registry.unavailable_defined(),
        tallies.total_objects,
        tallies.corrupt_objects,
        tallies.corrupt_class_refs,
        tallies.corrupt_class_names,
        tallies.skipped_heaps,
        summary.total_count,
        pretty_bytes_size(summary.total_size),
    )
}

/// Single-class detail report: identity, statistics, superclass chain,
/// field and method listings with per-entry placeholders.
pub fn render_class_detail(detail: &ClassDetail) -> String {
    let mut report = String::new();
    let name = detail.name.as_deref().unwrap_or(CORRUPT_PLACEHOLDER);
    report.push_str(&format!("class {} @ 0x{:x}\n", name, detail.class.address()));
    match detail.modifiers {
        Some(bits) => report.push_str(&format!("  modifiers: {}\n", modifier_names(bits))),
        None => report.push_str(&format!("  modifiers: {}\n", CORRUPT_PLACEHOLDER)),
    }
    match detail.loader {
        Some(loader) => report.push_str(&format!("  loader: 0x{:x}\n", loader.address())),
        None => report.push_str(&format!("  loader: {}\n", CORRUPT_PLACEHOLDER)),
    }
    report.push_str(&format!(
        "  instances: {}  total size: {}\n",
        detail.stats.count(),
        pretty_bytes_size(detail.stats.total_size())
    ));

    report.push_str("  superclass chain:\n");
    if detail.superclass_chain.is_empty() {
        report.push_str("    (no superclass)\n");
    }
    for link in &detail.superclass_chain {
        match link {
            SuperclassLink::Known { class, name } => report.push_str(&format!(
                "    {} @ 0x{:x}\n",
                name.as_deref().unwrap_or(CORRUPT_PLACEHOLDER),
                class.address()
            )),
            SuperclassLink::Broken => report.push_str(&format!("    {}\n", CORRUPT_PLACEHOLDER)),
        }
    }

    match &detail.fields {
        Ok(fields) => {
            let (static_fields, instance_fields): (Vec<_>, Vec<_>) =
                fields.iter().partition(|field| match field {
                    Scanned::Valid(record) => record.is_static(),
                    _ => false,
                });
            report.push_str("  static fields:\n");
            push_member_lines(&mut report, &static_fields, |f| {
                (&f.name, &f.signature, f.modifiers)
            });
            report.push_str("  instance fields:\n");
            push_member_lines(&mut report, &instance_fields, |f| {
                (&f.name, &f.signature, f.modifiers)
            });
        }
        Err(error) => report.push_str(&format!("  fields: {}\n", placeholder(*error))),
    }
    match &detail.methods {
        Ok(methods) => {
            report.push_str("  methods:\n");
            let refs: Vec<_> = methods.iter().collect();
            push_member_lines(&mut report, &refs, |m| (&m.name, &m.signature, m.modifiers));
        }
        Err(error) => report.push_str(&format!("  methods: {}\n", placeholder(*error))),
    }
    report
}

// Each member line is isolated: a damaged entry prints a placeholder and
// never drops the rest of the listing.
fn push_member_lines<T>(
    report: &mut String,
    members: &[&Scanned<T>],
    parts: impl Fn(&T) -> (&FieldResult<String>, &FieldResult<String>, u32),
) {
    if members.is_empty() {
        report.push_str("    (none)\n");
        return;
    }
    for member in members {
        match member {
            Scanned::Valid(record) => {
                let (name, signature, modifiers) = parts(record);
                let modifier_text = modifier_names(modifiers);
                let prefix = if modifier_text.is_empty() {
                    String::new()
                } else {
                    format!("{} ", modifier_text)
                };
                report.push_str(&format!(
                    "    {}{} {}\n",
                    prefix,
                    text_or_placeholder(signature),
                    text_or_placeholder(name),
                ));
            }
            Scanned::Corrupt => report.push_str(&format!("    {}\n", CORRUPT_PLACEHOLDER)),
            Scanned::Unavailable => report.push_str(&format!("    {}\n", UNAVAILABLE_PLACEHOLDER)),
        }
    }
}

pub fn modifier_names(bits: u32) -> String {
    let named = [
        (MOD_PUBLIC, "public"),
        (MOD_PRIVATE, "private"),
        (MOD_PROTECTED, "protected"),
        (MOD_STATIC, "static"),
        (MOD_FINAL, "final"),
        (MOD_SYNCHRONIZED, "synchronized"),
        (MOD_VOLATILE, "volatile"),
        (MOD_TRANSIENT, "transient"),
        (MOD_NATIVE, "native"),
        (MOD_INTERFACE, "interface"),
        (MOD_ABSTRACT, "abstract"),
    ];
    named
        .iter()
        .filter(|(bit, _)| bits & bit != 0)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Monitor and lock report: every lock with its owner and waiters, then the
/// object locks in use cross-reference.
pub fn render_monitor_report<S: Snapshot + ?Sized>(snapshot: &S, graph: &LockGraph) -> String {
    let thread_names = thread_name_table(snapshot);
    let mut report = String::new();

    let locks = graph.locks();
    report.push_str(&format!("\nFound {} locks in use:\n", locks.len()));
    for key in locks {
        match key {
            LockKey::Monitor(monitor) => {
                let name = match graph.name_of(key) {
                    Some(name) => text_or_placeholder(name),
                    None => UNAVAILABLE_PLACEHOLDER,
                };
                report.push_str(&format!(
                    "\nmonitor \"{}\" @ 0x{:x}\n",
                    name,
                    monitor.address()
                ));
            }
            LockKey::Object(object) => {
                report.push_str(&format!("\nlock object @ 0x{:x}\n", object))
            }
        }
        match graph.owner_of(key) {
            Some(LockOwner::Thread(thread)) => report.push_str(&format!(
                "  owner: {}\n",
                describe_thread(*thread, &thread_names)
            )),
            Some(LockOwner::Ghost(name)) => {
                report.push_str(&format!("  owner: \"{}\" (thread exited)\n", name))
            }
            Some(LockOwner::Unknown) => report.push_str("  owner: unknown owner\n"),
            None => report.push_str("  owner: (unowned)\n"),
        }
        for waiter in graph.waiters_of(key) {
            let verb = match waiter.kind {
                WaitKind::EnterWaiter => "waiting to enter",
                WaitKind::NotifyWaiter => "waiting to be notified",
                WaitKind::Parked => "parked on",
            };
            report.push_str(&format!(
                "  {} : {}\n",
                verb,
                describe_thread(waiter.thread, &thread_names)
            ));
        }
    }

    let object_monitors: Vec<_> = {
        let mut pairs: Vec<_> = graph.object_monitors().collect();
        pairs.sort();
        pairs
    };
    if !object_monitors.is_empty() {
        report.push_str(&format!(
            "\nObject locks in use: {}\n",
            object_monitors.len()
        ));
        for (object, monitor) in object_monitors {
            report.push_str(&format!(
                "  object 0x{:x} -> monitor 0x{:x}\n",
                object,
                monitor.address()
            ));
        }
    }
    report
}

/// Thread report: name, state, native correlation and the single blocking
/// relationship, one block per thread.
pub fn render_thread_report<S: Snapshot + ?Sized>(snapshot: &S, graph: &LockGraph) -> String {
    let mut report = String::new();
    let mut shown = 0usize;
    let mut damaged = 0usize;
    let mut body = String::new();
    for entry in snapshot.threads() {
        let thread = match entry {
            Scanned::Valid(record) => record,
            Scanned::Corrupt => {
                damaged += 1;
                body.push_str(&format!("\nthread {}\n", CORRUPT_PLACEHOLDER));
                continue;
            }
            Scanned::Unavailable => {
                damaged += 1;
                body.push_str(&format!("\nthread {}\n", UNAVAILABLE_PLACEHOLDER));
                continue;
            }
        };
        shown += 1;
        body.push_str(&format!(
            "\nthread \"{}\" @ 0x{:x}\n",
            text_or_placeholder(&thread.name),
            thread.address
        ));
        match thread.state {
            Ok(state) => body.push_str(&format!("  state: {}\n", state_names(state))),
            Err(error) => body.push_str(&format!("  state: {}\n", placeholder(error))),
        }
        match thread.native_id {
            Ok(Some(native_id)) => body.push_str(&format!("  native thread: {}\n", native_id)),
            Ok(None) => body.push_str("  native thread: none (orphaned)\n"),
            Err(error) => body.push_str(&format!("  native thread: {}\n", placeholder(error))),
        }
        if let Some((key, kind)) = graph.waiting_on(thread.handle()) {
            let verb = match kind {
                WaitKind::EnterWaiter => "blocked entering",
                WaitKind::NotifyWaiter => "in object wait on",
                WaitKind::Parked => "parked on",
            };
            body.push_str(&format!("  {} 0x{:x}\n", verb, key.address()));
        }
    }
    report.push_str(&format!(
        "\nFound {} threads ({} unreadable):\n",
        shown, damaged
    ));
    report.push_str(&body);
    report
}

fn thread_name_table<S: Snapshot + ?Sized>(snapshot: &S) -> AHashMap<ThreadRef, String> {
    snapshot
        .threads()
        .filter_map(Scanned::valid)
        .map(|record: ThreadRecord| {
            let name = match &record.name {
                Ok(name) => name.clone(),
                Err(error) => placeholder(*error).to_string(),
            };
            (record.handle(), name)
        })
        .collect()
}

fn describe_thread(thread: ThreadRef, names: &AHashMap<ThreadRef, String>) -> String {
    match names.get(&thread) {
        Some(name) => format!("\"{}\" @ 0x{:x}", name, thread.address()),
        None => format!("thread 0x{:x}", thread.address()),
    }
}

fn state_names(state: u32) -> String {
    let named = [
        (STATE_RUNNABLE, "runnable"),
        (STATE_SLEEPING, "sleeping"),
        (STATE_WAITING, "waiting"),
        (STATE_IN_OBJECT_WAIT, "in object wait"),
        (STATE_PARKED, "parked"),
        (STATE_BLOCKED_ON_MONITOR_ENTER, "blocked on monitor enter"),
        (STATE_TERMINATED, "terminated"),
    ];
    let names: Vec<&str> = named
        .iter()
        .filter(|(bit, _)| state & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    if names.is_empty() {
        format!("0x{:x}", state)
    } else {
        names.join(", ")
    }
}
