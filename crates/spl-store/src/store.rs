//! The store: versioned commits over [`Tables`].
//!
//! Writers serialize per document set. A batch takes the locks of every set
//! it touches in sorted order, validates versions under a read lock, asks the
//! caller for admission (the cancellation point), then inserts everything
//! under a single write lock so the batch is visible all at once or not at all.

use std::collections::{BTreeMap, HashMap};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use spl_model::{DocumentGraph, DocumentId, DocumentUid, EntityKind, SetId};

use crate::error::{Result, StoreError};
use crate::registry::EntityRegistry;
use crate::rows::DocumentRow;
use crate::tables::Tables;

/// A parsed document waiting to be committed.
#[derive(Debug, Clone)]
pub struct PendingDocument {
    pub graph: DocumentGraph,
    pub content_hash: String,
    pub source: Option<String>,
}

impl PendingDocument {
    pub fn new(graph: DocumentGraph, content_hash: impl Into<String>) -> Self {
        Self {
            graph,
            content_hash: content_hash.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "document_id", rename_all = "snake_case")]
pub enum CommitOutcome {
    Created(DocumentId),
    /// Identical content was already stored under this id.
    Unchanged(DocumentId),
}

impl CommitOutcome {
    pub fn document_id(&self) -> DocumentId {
        match self {
            CommitOutcome::Created(id) | CommitOutcome::Unchanged(id) => *id,
        }
    }
}

/// One row of the set listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetSummary {
    pub set_id: SetId,
    pub current_version: Option<u32>,
    pub current_document: Option<DocumentId>,
    pub versions: Vec<u32>,
}

enum Planned {
    Create,
    Unchanged(DocumentId),
    /// Same content as an earlier document of this batch.
    DuplicateOf(usize),
}

pub struct Store {
    tables: RwLock<Tables>,
    set_locks: Mutex<HashMap<SetId, Arc<Mutex<()>>>>,
    /// Held for a whole snapshot save, from copying the tables to the rename.
    save_lock: Mutex<()>,
    registry: EntityRegistry,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::from_tables(Tables::default())
    }

    pub fn from_tables(tables: Tables) -> Self {
        Self {
            tables: RwLock::new(tables),
            set_locks: Mutex::new(HashMap::new()),
            save_lock: Mutex::new(()),
            registry: EntityRegistry::standard(),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn save_guard(&self) -> MutexGuard<'_, ()> {
        self.save_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_lock(&self, set_id: &SetId) -> Arc<Mutex<()>> {
        let mut locks = self.set_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(set_id.clone()).or_default())
    }

    pub fn commit(&self, document: PendingDocument) -> Result<CommitOutcome> {
        let outcomes = self.commit_batch(vec![document], || true)?;
        outcomes
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Serialization {
                source: "empty commit result".into(),
            })
    }

    /// Commit every document of `batch`, or none of them.
    ///
    /// `admit` runs once, under the set locks, after validation and right
    /// before rows are written. Returning `false` cancels the batch.
    #[instrument(skip_all, fields(documents = batch.len()))]
    pub fn commit_batch(
        &self,
        batch: Vec<PendingDocument>,
        admit: impl FnOnce() -> bool,
    ) -> Result<Vec<CommitOutcome>> {
        let mut set_ids: Vec<SetId> = batch
            .iter()
            .map(|document| document.graph.header.set_id.clone())
            .collect();
        set_ids.sort();
        set_ids.dedup();
        let locks: Vec<Arc<Mutex<()>>> = set_ids.iter().map(|id| self.set_lock(id)).collect();
        let _guards: Vec<_> = locks
            .iter()
            .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner))
            .collect();

        let plan = plan_batch(&self.read(), &batch)?;
        if !admit() {
            debug!("batch cancelled before commit");
            return Err(StoreError::Cancelled);
        }

        let imported_at = Utc::now();
        let mut tables = self.write();
        // Document ids are unique across sets, which the set locks do not cover.
        for (document, step) in batch.iter().zip(&plan) {
            if matches!(step, Planned::Create)
                && uid_stored(&tables, &document.graph.header.document_id)
            {
                return Err(uid_conflict(document));
            }
        }
        let mut outcomes: Vec<CommitOutcome> = Vec::with_capacity(batch.len());
        for (document, step) in batch.into_iter().zip(plan) {
            let outcome = match step {
                Planned::Create => {
                    let set_id = document.graph.header.set_id.clone();
                    let version = document.graph.header.version;
                    let id = tables.insert_document(
                        document.graph,
                        document.content_hash,
                        document.source,
                        imported_at,
                    );
                    info!(%set_id, version, document_id = %id, "document committed");
                    CommitOutcome::Created(id)
                }
                Planned::Unchanged(id) => CommitOutcome::Unchanged(id),
                Planned::DuplicateOf(index) => {
                    CommitOutcome::Unchanged(outcomes[index].document_id())
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    pub fn load_document(&self, id: DocumentId) -> Result<DocumentGraph> {
        self.read()
            .document_graph(id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Document, id))
    }

    pub fn document(&self, id: DocumentId) -> Result<DocumentRow> {
        self.read()
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Document, id))
    }

    /// The payload a document was imported from, if it was kept.
    pub fn source(&self, id: DocumentId) -> Result<Option<String>> {
        Ok(self.document(id)?.source)
    }

    pub fn current_document(&self, set_id: &SetId) -> Result<DocumentId> {
        self.read()
            .sets
            .get(set_id)
            .and_then(|set| set.current())
            .map(|(_, id)| id)
            .ok_or_else(|| StoreError::SetNotFound(set_id.clone()))
    }

    pub fn find_by_uid(&self, uid: &DocumentUid) -> Option<DocumentId> {
        self.read()
            .documents
            .values()
            .find(|row| &row.document_uid == uid)
            .map(|row| row.id)
    }

    pub fn sets(&self) -> Vec<SetSummary> {
        self.read()
            .sets
            .values()
            .map(|set| {
                let current = set.current();
                SetSummary {
                    set_id: set.set_id.clone(),
                    current_version: current.map(|(version, _)| version),
                    current_document: current.map(|(_, id)| id),
                    versions: set.versions.keys().copied().collect(),
                }
            })
            .collect()
    }

    /// Cascading delete of a document and all rows it owns.
    pub fn delete_document(&self, id: DocumentId) -> Result<usize> {
        self.delete_entity(EntityKind::Document, &id.to_string())
    }

    pub fn get_entity(&self, kind: EntityKind, id: &str) -> Result<Value> {
        self.registry.repository(kind)?.get(&self.read(), id)
    }

    pub fn list_entities(&self, kind: EntityKind) -> Result<Vec<Value>> {
        self.registry.repository(kind)?.list(&self.read())
    }

    pub fn delete_entity(&self, kind: EntityKind, id: &str) -> Result<usize> {
        let repository = self.registry.repository(kind)?;
        let set_id = match kind {
            EntityKind::Document => {
                let key: DocumentId = id.parse().map_err(|_| StoreError::InvalidId {
                    kind,
                    value: id.to_string(),
                })?;
                Some(self.document(key)?.set_id)
            }
            _ => None,
        };
        let lock = set_id.as_ref().map(|set_id| self.set_lock(set_id));
        let _guard = lock
            .as_ref()
            .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner));

        let removed = repository.delete(&mut self.write(), id)?;
        info!(%kind, id, removed, "entity deleted");
        Ok(removed)
    }

    pub fn row_counts(&self) -> BTreeMap<EntityKind, usize> {
        self.read().row_counts()
    }

    /// Copy of every table, as written to a snapshot.
    pub fn tables(&self) -> Tables {
        self.read().clone()
    }
}

fn conflict(document: &PendingDocument, reason: String) -> StoreError {
    StoreError::VersionConflict {
        set_id: document.graph.header.set_id.clone(),
        version: document.graph.header.version,
        reason,
    }
}

fn uid_conflict(document: &PendingDocument) -> StoreError {
    conflict(
        document,
        format!("document id {} is already used", document.graph.header.document_id),
    )
}

fn uid_stored(tables: &Tables, uid: &DocumentUid) -> bool {
    tables.documents.values().any(|row| &row.document_uid == uid)
}

/// Decide what each document of the batch does, failing on the first conflict.
fn plan_batch(tables: &Tables, batch: &[PendingDocument]) -> Result<Vec<Planned>> {
    let mut planned_versions: HashMap<(&SetId, u32), usize> = HashMap::new();
    let mut planned_uids: HashMap<&DocumentUid, usize> = HashMap::new();
    let mut plan = Vec::with_capacity(batch.len());

    for (index, document) in batch.iter().enumerate() {
        let header = &document.graph.header;

        if let Some(&first) = planned_versions.get(&(&header.set_id, header.version)) {
            if batch[first].content_hash == document.content_hash {
                plan.push(Planned::DuplicateOf(first));
                continue;
            }
            return Err(conflict(
                document,
                "the batch contains this version twice with different content".to_string(),
            ));
        }

        let set = tables.sets.get(&header.set_id);
        if let Some(existing) = set.and_then(|set| set.versions.get(&header.version)) {
            let same_content = tables
                .documents
                .get(existing)
                .is_some_and(|row| row.content_hash == document.content_hash);
            if same_content {
                plan.push(Planned::Unchanged(*existing));
                continue;
            }
            return Err(conflict(
                document,
                "this version is already stored with different content".to_string(),
            ));
        }

        let stored_current = set.and_then(|set| set.current()).map(|(version, _)| version);
        let planned_current = planned_versions
            .keys()
            .filter(|(set_id, _)| *set_id == &header.set_id)
            .map(|(_, version)| *version)
            .max();
        if let Some(current) = stored_current.max(planned_current)
            && header.version < current
        {
            return Err(conflict(
                document,
                format!("version is lower than the current version {current}"),
            ));
        }

        if planned_uids.contains_key(&header.document_id)
            || uid_stored(tables, &header.document_id)
        {
            return Err(uid_conflict(document));
        }

        planned_versions.insert((&header.set_id, header.version), index);
        planned_uids.insert(&header.document_id, index);
        plan.push(Planned::Create);
    }
    Ok(plan)
}
