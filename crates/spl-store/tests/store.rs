use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use tempfile::tempdir;

use spl_model::{DocumentUid, EntityKind, ErrorKind, SetId};
use spl_store::{CommitOutcome, PendingDocument, Store, StoreError, load_snapshot, save_snapshot};
use spl_xml::{NoProgress, canonical_hash, import_document};

const PENICILLAMINE: &[u8] = include_bytes!("../../spl-xml/tests/fixtures/penicillamine.xml");

fn pending() -> PendingDocument {
    let parsed = import_document(PENICILLAMINE, &NoProgress).unwrap();
    PendingDocument::new(parsed.graph, parsed.content_hash)
        .with_source(String::from_utf8_lossy(PENICILLAMINE))
}

/// The fixture re-labelled as another version, optionally in another set.
fn variant(set: Option<&str>, version: u32, title: &str) -> PendingDocument {
    let mut document = pending();
    let header = &mut document.graph.header;
    if let Some(set) = set {
        header.set_id = SetId::new(set).unwrap();
    }
    header.version = version;
    header.document_id = DocumentUid::new(format!("{}-v{version}", header.set_id)).unwrap();
    header.title = Some(title.to_string());
    document.content_hash = canonical_hash(&document.graph).unwrap();
    document.source = None;
    document
}

#[test]
fn test_commit_and_reload_graph() {
    let store = Store::new();
    let document = pending();
    let expected = document.graph.clone();

    let outcome = store.commit(document).unwrap();
    let CommitOutcome::Created(id) = outcome else {
        panic!("expected a new document, got {outcome:?}");
    };
    assert_eq!(store.load_document(id).unwrap(), expected);
    assert!(store.source(id).unwrap().unwrap().contains("DEPEN"));

    let counts = store.row_counts();
    assert_eq!(counts[&EntityKind::Document], 1);
    assert_eq!(counts[&EntityKind::Product], 1);
    assert_eq!(counts[&EntityKind::OrganizationRole], 3);
}

#[test]
fn test_identical_reimport_is_a_no_op() {
    let store = Store::new();
    let first = store.commit(pending()).unwrap();
    let second = store.commit(pending()).unwrap();
    assert_eq!(second, CommitOutcome::Unchanged(first.document_id()));
    assert_eq!(store.row_counts()[&EntityKind::Document], 1);
}

#[test]
fn test_conflicting_content_for_same_version() {
    let store = Store::new();
    store.commit(pending()).unwrap();

    let mut changed = pending();
    changed.graph.header.title = Some("Changed title".to_string());
    changed.content_hash = canonical_hash(&changed.graph).unwrap();
    let err = store.commit(changed).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionConflict);
    assert_eq!(store.row_counts()[&EntityKind::Document], 1);
}

#[test]
fn test_versions_and_current_document() {
    let store = Store::new();
    let set = SetId::new("set-versions").unwrap();
    let v1 = store.commit(variant(Some("set-versions"), 1, "one")).unwrap();
    let v3 = store.commit(variant(Some("set-versions"), 3, "three")).unwrap();
    assert_eq!(store.current_document(&set).unwrap(), v3.document_id());

    let err = store
        .commit(variant(Some("set-versions"), 2, "two"))
        .unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { version: 2, .. }));

    let summary = store
        .sets()
        .into_iter()
        .find(|summary| summary.set_id == set)
        .unwrap();
    assert_eq!(summary.versions, vec![1, 3]);
    assert_ne!(v1.document_id(), v3.document_id());
}

#[test]
fn test_batch_is_all_or_nothing() {
    let store = Store::new();
    store.commit(variant(Some("existing"), 5, "five")).unwrap();

    let batch = vec![
        variant(Some("fresh"), 1, "fresh"),
        variant(Some("existing"), 4, "stale"),
    ];
    let err = store
        .commit_batch(batch, || true)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionConflict);
    assert!(
        store
            .current_document(&SetId::new("fresh").unwrap())
            .is_err()
    );
    assert_eq!(store.row_counts()[&EntityKind::Document], 1);
}

#[test]
fn test_cancelled_batch_commits_nothing() {
    let store = Store::new();
    let err = store
        .commit_batch(vec![pending()], || false)
        .unwrap_err();
    assert!(matches!(err, StoreError::Cancelled));
    assert!(store.sets().is_empty());
}

#[test]
fn test_duplicate_within_batch() {
    let store = Store::new();
    let outcomes = store
        .commit_batch(vec![pending(), pending()], || true)
        .unwrap();
    assert!(matches!(outcomes[0], CommitOutcome::Created(_)));
    assert_eq!(
        outcomes[1],
        CommitOutcome::Unchanged(outcomes[0].document_id())
    );
}

#[test]
fn test_shared_organizations_are_deduplicated() {
    let store = Store::new();
    store.commit(variant(Some("a"), 1, "a")).unwrap();
    store.commit(variant(Some("b"), 1, "b")).unwrap();
    let counts = store.row_counts();
    assert_eq!(counts[&EntityKind::OrganizationRole], 6);
    assert_eq!(
        counts[&EntityKind::Organization],
        store.list_entities(EntityKind::Organization).unwrap().len()
    );
    assert!(counts[&EntityKind::Organization] <= 3);
}

#[test]
fn test_cascade_delete_keeps_counters() {
    let store = Store::new();
    let set = SetId::new("deleted").unwrap();
    let first = store.commit(variant(Some("deleted"), 1, "one")).unwrap();
    let removed = store.delete_document(first.document_id()).unwrap();
    assert!(removed > 10);
    assert_eq!(store.row_counts()[&EntityKind::Product], 0);
    assert_eq!(store.row_counts()[&EntityKind::Section], 0);
    assert!(matches!(
        store.current_document(&set),
        Err(StoreError::SetNotFound(_))
    ));

    let second = store.commit(variant(Some("deleted"), 2, "two")).unwrap();
    assert_ne!(second.document_id(), first.document_id());

    let err = store.load_document(first.document_id()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityNotFound);
}

#[test]
fn test_registry_lookup() {
    let store = Store::new();
    let id = store.commit(pending()).unwrap().document_id();
    let row = store
        .get_entity(EntityKind::Document, &id.to_string())
        .unwrap();
    assert_eq!(row["version"], 1);

    let products = store.list_entities(EntityKind::Product).unwrap();
    assert_eq!(products[0]["name"], "Depen");

    let product_id = products[0]["id"].as_str().unwrap();
    let err = store
        .delete_entity(EntityKind::Product, product_id)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReferentialIntegrity);
}

#[test]
fn test_concurrent_commits_to_distinct_sets() {
    let store = Arc::new(Store::new());
    let handles: Vec<_> = (0..8)
        .map(|n| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let set = format!("concurrent-{n}");
                store.commit(variant(Some(&set), 1, &set)).unwrap()
            })
        })
        .collect();
    let ids: HashSet<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().document_id())
        .collect();
    assert_eq!(ids.len(), 8);
    assert_eq!(store.sets().len(), 8);
}

#[test]
fn test_document_id_claimed_by_another_set_during_commit() {
    let store = Store::new();
    let first = variant(Some("first"), 1, "first");
    let mut second = variant(Some("second"), 1, "second");
    second.graph.header.document_id = first.graph.header.document_id.clone();
    second.content_hash = canonical_hash(&second.graph).unwrap();

    // The other set's lock is free while this batch holds its own.
    let err = store
        .commit_batch(vec![second], || {
            store.commit(first).unwrap();
            true
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionConflict);
    assert_eq!(store.row_counts()[&EntityKind::Document], 1);
    assert!(
        store
            .current_document(&SetId::new("second").unwrap())
            .is_err()
    );
}

#[test]
fn test_snapshot_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.json");

    let store = Store::new();
    let id = store.commit(pending()).unwrap().document_id();
    save_snapshot(&store, &path).unwrap();

    let loaded = load_snapshot(&path).unwrap();
    assert_eq!(
        loaded.load_document(id).unwrap(),
        store.load_document(id).unwrap()
    );

    let next = loaded.commit(variant(None, 2, "two")).unwrap();
    assert!(!store.tables().documents.contains_key(&next.document_id()));
}

#[test]
fn test_concurrent_saves_keep_the_newest_tables() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.json");
    let store = Arc::new(Store::new());
    let handles: Vec<_> = (0..8)
        .map(|n| {
            let store = Arc::clone(&store);
            let path = path.clone();
            thread::spawn(move || {
                let set = format!("saved-{n}");
                store.commit(variant(Some(&set), 1, &set)).unwrap();
                save_snapshot(&store, &path).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let loaded = load_snapshot(&path).unwrap();
    assert_eq!(loaded.sets(), store.sets());
    assert_eq!(loaded.sets().len(), 8);
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("store.json")]);
}

#[tokio::test]
async fn test_snapshot_async_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.json");
    let store = Arc::new(Store::new());
    store.commit(pending()).unwrap();

    spl_store::save_snapshot_async(Arc::clone(&store), path.clone())
        .await
        .unwrap();
    let loaded = spl_store::load_snapshot_async(path).await.unwrap();
    assert_eq!(loaded.sets(), store.sets());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn surrogate_ids_are_never_reused(versions in proptest::collection::btree_set(1u32..50, 1..6)) {
        let store = Store::new();
        let mut seen = HashSet::new();
        for version in versions {
            let id = store.commit(variant(Some("prop"), version, "p")).unwrap().document_id();
            prop_assert!(seen.insert(id));
            store.delete_document(id).unwrap();
        }
        let tables = store.tables();
        prop_assert!(tables.documents.is_empty());
        prop_assert!(tables.sets[&SetId::new("prop").unwrap()].next_counter > 0);
    }
}
