//! Fidelity comparison.
//!
//! A stored document is exported again and compared, path by path, with a
//! baseline: the caller's source, the payload kept at import, or the
//! document's own re-import.

pub mod compare;
pub mod diff;
pub mod error;

pub use compare::{Baseline, Comparison, compare_document};
pub use diff::compare_trees;
pub use error::CompareError;
