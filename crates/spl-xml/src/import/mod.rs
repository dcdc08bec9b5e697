//! SPL import: XML payload to [`DocumentGraph`].

mod parser;
mod resolve;

use tracing::{info, instrument};

use spl_model::{DocumentGraph, Location, SchemaViolation};

use crate::common::sha256_hex;
use crate::error::ImportError;
use crate::export::{ExportFormat, export_document};

/// Progress sink and cancellation source for a running operation.
///
/// Import reports the fraction of the payload consumed and polls
/// [`ProgressMonitor::is_cancelled`] between events.
pub trait ProgressMonitor: Send + Sync {
    fn report(&self, _fraction: f64) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Monitor for callers that neither track progress nor cancel.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressMonitor for NoProgress {}

/// Result of importing one payload.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub graph: DocumentGraph,
    /// Recoverable problems, in the order they were found.
    pub violations: Vec<SchemaViolation>,
    /// SHA-256 of the canonical minified export of `graph`.
    pub content_hash: String,
}

/// Parse one SPL payload.
///
/// Runs the streaming first pass, then resolves cross-references against the
/// substances declared in the same payload.
#[instrument(skip_all, fields(bytes = bytes.len()))]
pub fn import_document(
    bytes: &[u8],
    monitor: &dyn ProgressMonitor,
) -> Result<ParsedDocument, ImportError> {
    let first = parser::first_pass(bytes, monitor)?;
    let mut graph = first.graph;
    let mut violations = first.violations;
    violations.extend(resolve::resolve_references(&mut graph, &first.references));

    let content_hash = canonical_hash(&graph)?;
    monitor.report(1.0);
    info!(
        set_id = %graph.header.set_id,
        version = graph.header.version,
        sections = graph.walk_sections().len(),
        products = graph.products().len(),
        violations = violations.len(),
        "document parsed"
    );
    Ok(ParsedDocument {
        graph,
        violations,
        content_hash,
    })
}

/// Content hash used to recognize a re-import of identical content.
pub fn canonical_hash(graph: &DocumentGraph) -> Result<String, ImportError> {
    let canonical =
        export_document(graph, ExportFormat::Minified).map_err(|err| ImportError::Malformed {
            message: format!("could not canonicalize document: {err}"),
            location: Location::new("/document", None),
        })?;
    Ok(sha256_hex(canonical.as_bytes()))
}
