use std::sync::Arc;

use spl_compare::compare_document;
use spl_model::DocumentId;
use spl_store::{Store, open_or_create, save_snapshot_async};
use spl_xml::{ExportFormat, export_document};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::jobs::{JobTracker, OperationId, OperationKind, Progress};
use crate::work::{JobOutput, run_import};

/// Workflow facade over the store, the codecs and the job tracker.
///
/// Must be created inside a tokio runtime.
pub struct Engine {
    store: Arc<Store>,
    jobs: JobTracker<JobOutput>,
    config: EngineConfig,
}

impl Engine {
    /// Open the configured snapshot (or start empty) and bind to the runtime.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let store = match &config.store.snapshot_path {
            Some(path) => open_or_create(path)?,
            None => Store::new(),
        };
        Self::with_store(Arc::new(store), config)
    }

    pub fn with_store(store: Arc<Store>, config: EngineConfig) -> Result<Self> {
        let jobs = JobTracker::new(&config.jobs)?;
        Ok(Self {
            store,
            jobs,
            config,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Import one or more payloads as a single all-or-nothing batch.
    pub fn submit_import(&self, payloads: Vec<Vec<u8>>) -> OperationId {
        let store = Arc::clone(&self.store);
        let settings = self.config.store.clone();
        self.jobs.submit(OperationKind::Import, move |context| {
            run_import(&store, &settings, &payloads, context)
        })
    }

    /// Compare a stored document with `source`, or with its best baseline.
    pub fn submit_comparison(
        &self,
        document_id: DocumentId,
        source: Option<Vec<u8>>,
    ) -> OperationId {
        self.submit_comparison_as(document_id, source, self.config.export.format)
    }

    /// Like [`Engine::submit_comparison`], regenerating in `format`.
    pub fn submit_comparison_as(
        &self,
        document_id: DocumentId,
        source: Option<Vec<u8>>,
        format: ExportFormat,
    ) -> OperationId {
        let store = Arc::clone(&self.store);
        self.jobs.submit(OperationKind::Comparison, move |context| {
            compare_document(&store, document_id, source.as_deref(), format, context)
                .map(JobOutput::Comparison)
                .map_err(|err| err.to_failure())
        })
    }

    pub fn export(&self, document_id: DocumentId, format: ExportFormat) -> Result<String> {
        let graph = self.store.load_document(document_id)?;
        Ok(export_document(&graph, format)?)
    }

    pub fn progress(&self, operation_id: OperationId) -> Result<Progress<JobOutput>> {
        self.jobs.progress(operation_id)
    }

    pub async fn wait(&self, operation_id: OperationId) -> Result<Progress<JobOutput>> {
        self.jobs.wait(operation_id).await
    }

    pub fn cancel(&self, operation_id: OperationId) -> Result<bool> {
        self.jobs.cancel(operation_id)
    }

    pub fn operations(&self) -> Vec<Progress<JobOutput>> {
        self.jobs.operations()
    }

    pub fn purge_expired(&self) -> usize {
        self.jobs.purge_expired()
    }

    /// Write the configured snapshot, if any. Returns whether a file was written.
    pub async fn save_snapshot(&self) -> Result<bool> {
        let Some(path) = self.config.store.snapshot_path.clone() else {
            return Ok(false);
        };
        save_snapshot_async(Arc::clone(&self.store), path).await?;
        Ok(true)
    }
}
