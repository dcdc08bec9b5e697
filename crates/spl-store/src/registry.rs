//! Entity registry: maps entity-type tags to typed table handlers.
//!
//! Rows are exposed as JSON values so generic callers (the CLI, the job
//! tracker) can fetch any entity by tag and id without knowing its type.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use spl_model::{DocumentId, EntityKind, SurrogateId};

use crate::error::{Result, StoreError};
use crate::tables::Tables;

/// Typed access to one entity table.
pub trait Repository: Send + Sync {
    fn kind(&self) -> EntityKind;

    fn get(&self, tables: &Tables, id: &str) -> Result<Value>;

    fn list(&self, tables: &Tables) -> Result<Vec<Value>>;

    /// Delete a row and everything it owns. Returns the number of rows removed.
    ///
    /// Only documents own a complete subtree; removing any other row alone
    /// would orphan its dependents.
    fn delete(&self, _tables: &mut Tables, _id: &str) -> Result<usize> {
        Err(StoreError::RefusedWrite {
            operation: "delete",
            kind: self.kind(),
            reason: "rows are owned by their document".to_string(),
        })
    }
}

fn to_value<R: Serialize>(row: &R) -> Result<Value> {
    serde_json::to_value(row).map_err(|e| StoreError::Serialization {
        source: Box::new(e),
    })
}

fn parse_id<I: SurrogateId + FromStr>(value: &str) -> Result<I> {
    value.parse().map_err(|_| StoreError::InvalidId {
        kind: I::KIND,
        value: value.to_string(),
    })
}

/// Repository over a single `BTreeMap` table of [`Tables`].
struct TableRepository<I, R> {
    table: fn(&Tables) -> &BTreeMap<I, R>,
}

impl<I, R> Repository for TableRepository<I, R>
where
    I: SurrogateId + FromStr + Send + Sync,
    R: Serialize + Send + Sync,
{
    fn kind(&self) -> EntityKind {
        I::KIND
    }

    fn get(&self, tables: &Tables, id: &str) -> Result<Value> {
        let key: I = parse_id(id)?;
        let row = (self.table)(tables)
            .get(&key)
            .ok_or_else(|| StoreError::not_found(I::KIND, key))?;
        to_value(row)
    }

    fn list(&self, tables: &Tables) -> Result<Vec<Value>> {
        (self.table)(tables).values().map(to_value).collect()
    }
}

/// Documents additionally support cascading delete.
struct DocumentRepository;

impl Repository for DocumentRepository {
    fn kind(&self) -> EntityKind {
        EntityKind::Document
    }

    fn get(&self, tables: &Tables, id: &str) -> Result<Value> {
        let key: DocumentId = parse_id(id)?;
        let row = tables
            .documents
            .get(&key)
            .ok_or_else(|| StoreError::not_found(EntityKind::Document, key))?;
        to_value(row)
    }

    fn list(&self, tables: &Tables) -> Result<Vec<Value>> {
        tables.documents.values().map(to_value).collect()
    }

    fn delete(&self, tables: &mut Tables, id: &str) -> Result<usize> {
        let key: DocumentId = parse_id(id)?;
        tables
            .delete_document(key)
            .ok_or_else(|| StoreError::not_found(EntityKind::Document, key))
    }
}

fn table<I, R>(table: fn(&Tables) -> &BTreeMap<I, R>) -> Box<dyn Repository>
where
    I: SurrogateId + FromStr + Send + Sync + 'static,
    R: Serialize + Send + Sync + 'static,
{
    Box::new(TableRepository { table })
}

pub struct EntityRegistry {
    repositories: BTreeMap<EntityKind, Box<dyn Repository>>,
}

impl EntityRegistry {
    pub fn empty() -> Self {
        Self {
            repositories: BTreeMap::new(),
        }
    }

    /// Registry with a handler for every entity category.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(DocumentRepository));
        registry.register(table(|t| &t.organizations));
        registry.register(table(|t| &t.organization_roles));
        registry.register(table(|t| &t.sections));
        registry.register(table(|t| &t.products));
        registry.register(table(|t| &t.active_ingredients));
        registry.register(table(|t| &t.inactive_ingredients));
        registry.register(table(|t| &t.product_identifiers));
        registry.register(table(|t| &t.marketing_categories));
        registry.register(table(|t| &t.pharmacologic_classes));
        registry.register(table(|t| &t.packaging_levels));
        registry.register(table(|t| &t.package_items));
        registry.register(table(|t| &t.package_identifiers));
        registry.register(table(|t| &t.drug_interactions));
        registry.register(table(|t| &t.contraindicated_drugs));
        registry
    }

    pub fn register(&mut self, repository: Box<dyn Repository>) {
        self.repositories.insert(repository.kind(), repository);
    }

    pub fn repository(&self, kind: EntityKind) -> Result<&dyn Repository> {
        self.repositories
            .get(&kind)
            .map(Box::as_ref)
            .ok_or_else(|| StoreError::RefusedWrite {
                operation: "access",
                kind,
                reason: "no repository registered".to_string(),
            })
    }

    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.repositories.keys().copied()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
