//! SPL XML reading and writing.
//!
//! - [`import_document`] streams a payload into a [`spl_model::DocumentGraph`]
//!   with recoverable schema violations collected on the side.
//! - [`export_document`] writes a graph back out in canonical element order.
//! - [`parse_tree`] loads any document as a generic element tree, used by
//!   the fidelity comparison.

pub mod common;
pub mod error;
pub mod export;
pub mod import;
pub mod tree;

pub use common::sha256_hex;
pub use error::{ExportError, ImportError};
pub use export::{ExportFormat, export_document};
pub use import::{NoProgress, ParsedDocument, ProgressMonitor, canonical_hash, import_document};
pub use tree::{FragmentBuilder, parse_tree, write_node};
