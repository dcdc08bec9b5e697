//! Comparison of a stored document against its baseline.

use serde::Serialize;
use tracing::{info, instrument};

use spl_model::{DocumentId, FidelityReport};
use spl_store::Store;
use spl_xml::{
    ExportFormat, NoProgress, ProgressMonitor, export_document, import_document, parse_tree,
};

use crate::diff::compare_trees;
use crate::error::CompareError;

/// Where the baseline of a comparison came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Baseline {
    /// Supplied by the caller.
    Source,
    /// The payload kept at import time.
    Stored,
    /// Export → Import → Export of the stored graph.
    RoundTrip,
}

impl Baseline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Baseline::Source => "source",
            Baseline::Stored => "stored",
            Baseline::RoundTrip => "round-trip",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub document_id: DocumentId,
    pub baseline: Baseline,
    pub format: ExportFormat,
    pub report: FidelityReport,
}

fn checkpoint(monitor: &dyn ProgressMonitor, fraction: f64) -> Result<(), CompareError> {
    if monitor.is_cancelled() {
        return Err(CompareError::Cancelled);
    }
    monitor.report(fraction);
    Ok(())
}

/// Export document `id` and diff it against `source`, or the best available
/// baseline when `source` is `None`.
#[instrument(skip(store, source, monitor), fields(has_source = source.is_some()))]
pub fn compare_document(
    store: &Store,
    id: DocumentId,
    source: Option<&[u8]>,
    format: ExportFormat,
    monitor: &dyn ProgressMonitor,
) -> Result<Comparison, CompareError> {
    checkpoint(monitor, 0.0)?;
    let graph = store.load_document(id)?;
    let regenerated = export_document(&graph, format)?;
    checkpoint(monitor, 0.25)?;

    let (baseline_bytes, baseline) = match source {
        Some(bytes) => (bytes.to_vec(), Baseline::Source),
        None => match store.source(id)? {
            Some(stored) => (stored.into_bytes(), Baseline::Stored),
            None => {
                let reparsed = import_document(regenerated.as_bytes(), &NoProgress)
                    .map_err(CompareError::Regenerated)?;
                let again = export_document(&reparsed.graph, format)?;
                (again.into_bytes(), Baseline::RoundTrip)
            }
        },
    };
    checkpoint(monitor, 0.5)?;

    let expected = parse_tree(&baseline_bytes).map_err(CompareError::Baseline)?;
    let actual = parse_tree(regenerated.as_bytes()).map_err(CompareError::Regenerated)?;
    checkpoint(monitor, 0.75)?;

    let report = compare_trees(&expected, &actual);
    monitor.report(1.0);
    info!(
        document_id = %id,
        baseline = baseline.as_str(),
        matched = report.totals.matched,
        discrepancies = report.discrepancy_count(),
        "comparison finished"
    );
    Ok(Comparison {
        document_id: id,
        baseline,
        format,
        report,
    })
}
