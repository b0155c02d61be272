//! Class/heap statistics and monitor graph analysis over a frozen, possibly
//! partially corrupt JVM process snapshot (core dump).
//!
//! The snapshot arrives already materialized behind the
//! [`snapshot::model::Snapshot`] trait; this crate walks its class loaders,
//! heaps, threads and monitors, tolerating data damage at every step, and
//! exposes sortable per-class statistics plus a lock wait graph. Reports
//! always complete: whatever could be read is printed, with explicit counts
//! of what could not.

pub mod aggregator;
pub mod errors;
pub mod monitors;
pub mod registry;
pub mod render;
pub mod session;
pub mod snapshot;
pub mod utils;
pub mod view;

pub use crate::session::DumpSession;
