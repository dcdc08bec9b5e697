//! Relational storage for SPL document sets.
//!
//! # Features
//!
//! - **Surrogate ids**: every row gets a typed 128-bit id derived from its
//!   allocation scope and a monotonic counter
//! - **Versioned sets**: documents sharing a set id are versions of one label;
//!   conflicting or lower versions are rejected
//! - **All-or-nothing batches**: set-scoped locks, one write for the batch
//! - **Entity registry**: fetch any row by entity tag and id
//! - **Snapshots**: JSON snapshot files written atomically
//!
//! # Architecture
//!
//! - [`Store`]: commit, load, delete
//! - [`Tables`]: one `BTreeMap` per entity category
//! - [`EntityRegistry`]: entity tag to table handler
//! - [`snapshot`]: snapshot save/load, sync and async

pub mod alloc;
pub mod error;
pub mod registry;
pub mod rows;
pub mod snapshot;
pub mod store;
pub mod tables;

pub use alloc::IdAllocator;
pub use error::{Result, StoreError};
pub use registry::{EntityRegistry, Repository};
pub use rows::{DocumentRow, DocumentSetRow};
pub use snapshot::{
    load_snapshot, load_snapshot_async, open_or_create, save_snapshot, save_snapshot_async,
};
pub use store::{CommitOutcome, PendingDocument, SetSummary, Store};
pub use tables::Tables;
