// src/output/mod.rs
// =============================================================================
// Durable output of the crawl.
//
// Submodules:
// - snapshot: atomic JSON snapshots of the result store, and reading them back
// =============================================================================

mod snapshot;

pub use snapshot::{load_snapshot, SnapshotError, SnapshotWriter};
