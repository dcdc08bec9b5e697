//! Work run by the job tracker for each operation kind.

use serde::Serialize;
use tracing::{info, warn};

use spl_compare::Comparison;
use spl_model::{DocumentId, OperationFailure, SchemaViolation, SetId};
use spl_store::{CommitOutcome, PendingDocument, Store, save_snapshot};
use spl_xml::{ProgressMonitor, import_document};

use crate::config::StoreSettings;
use crate::jobs::JobContext;

/// Share of an import's progress spent parsing; the rest is the commit.
const PARSE_SHARE: f64 = 0.9;

#[derive(Debug, Clone, Serialize)]
pub struct ImportedDocument {
    pub document_id: DocumentId,
    pub set_id: SetId,
    pub version: u32,
    /// `false` when identical content was already stored.
    pub created: bool,
    pub violations: Vec<SchemaViolation>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub documents: Vec<ImportedDocument>,
}

impl ImportSummary {
    pub fn violation_count(&self) -> usize {
        self.documents
            .iter()
            .map(|document| document.violations.len())
            .sum()
    }
}

/// Result of a successful operation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobOutput {
    Import(ImportSummary),
    Comparison(Comparison),
}

/// Maps one payload's progress onto its slice of the whole operation.
struct Slice<'a> {
    context: &'a JobContext<JobOutput>,
    start: f64,
    span: f64,
}

impl ProgressMonitor for Slice<'_> {
    fn report(&self, fraction: f64) {
        self.context.set_progress(self.start + fraction * self.span);
    }

    fn is_cancelled(&self) -> bool {
        self.context.is_cancelled()
    }
}

pub(crate) fn run_import(
    store: &Store,
    settings: &StoreSettings,
    payloads: &[Vec<u8>],
    context: &JobContext<JobOutput>,
) -> Result<JobOutput, OperationFailure> {
    let total = payloads.len().max(1) as f64;
    let mut pending = Vec::with_capacity(payloads.len());
    let mut violations = Vec::with_capacity(payloads.len());

    for (index, payload) in payloads.iter().enumerate() {
        let slice = Slice {
            context,
            start: index as f64 / total * PARSE_SHARE,
            span: PARSE_SHARE / total,
        };
        let parsed = import_document(payload, &slice).map_err(|err| err.to_failure())?;
        let mut document = PendingDocument::new(parsed.graph, parsed.content_hash);
        if settings.keep_source {
            document = document.with_source(String::from_utf8_lossy(payload));
        }
        violations.push(parsed.violations);
        pending.push(document);
    }

    let headers: Vec<(SetId, u32)> = pending
        .iter()
        .map(|document| {
            let header = &document.graph.header;
            (header.set_id.clone(), header.version)
        })
        .collect();
    let outcomes = store
        .commit_batch(pending, || context.begin_commit())
        .map_err(|err| err.to_failure())?;
    context.set_progress(0.95);

    if settings.autosave
        && let Some(path) = &settings.snapshot_path
        && let Err(err) = save_snapshot(store, path)
    {
        warn!(error = %err, "snapshot not saved after import");
    }

    let documents: Vec<ImportedDocument> = outcomes
        .into_iter()
        .zip(headers)
        .zip(violations)
        .map(|((outcome, (set_id, version)), violations)| ImportedDocument {
            document_id: outcome.document_id(),
            set_id,
            version,
            created: matches!(outcome, CommitOutcome::Created(_)),
            violations,
        })
        .collect();
    info!(
        documents = documents.len(),
        created = documents.iter().filter(|document| document.created).count(),
        "import committed"
    );
    Ok(JobOutput::Import(ImportSummary { documents }))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, mpsc};

    use spl_model::ErrorKind;

    use super::*;
    use crate::config::JobSettings;
    use crate::jobs::{JobStatus, JobTracker, OperationKind};

    const PENICILLAMINE: &[u8] = include_bytes!("../../spl-xml/tests/fixtures/penicillamine.xml");

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn import_cancelled_while_running_commits_nothing() {
        let tracker = JobTracker::new(&JobSettings::default()).unwrap();
        let store = Arc::new(Store::new());
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (result_tx, result_rx) = mpsc::channel();
        let worker_store = Arc::clone(&store);
        let id = tracker.submit(OperationKind::Import, move |context| {
            context.set_progress(0.1);
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            let result = run_import(
                &worker_store,
                &StoreSettings::default(),
                &[PENICILLAMINE.to_vec()],
                context,
            );
            result_tx
                .send(result.as_ref().err().map(|failure| failure.kind))
                .unwrap();
            result
        });

        started_rx.recv().unwrap();
        let running = tracker.progress(id).unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert!(running.percent > 0);
        assert!(tracker.cancel(id).unwrap());
        release_tx.send(()).unwrap();

        assert_eq!(result_rx.recv().unwrap(), Some(ErrorKind::Cancelled));
        let done = tracker.wait(id).await.unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.error.unwrap().kind, ErrorKind::Cancelled);
        assert!(store.sets().is_empty());
    }
}
