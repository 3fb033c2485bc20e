//! Thand Catalog - Provider Catalog Store
//!
//! Per-provider in-memory snapshots of permissions, roles, resources, and
//! identities. Writers publish immutable generations; readers snapshot
//! them without blocking on writes; full-text indices are rebuilt on a
//! detached task and swapped in when they catch up to the current
//! generation.

mod entry;
mod index;
mod store;

pub use entry::CatalogEntry;
pub use index::TextIndex;
pub use store::CatalogStore;
