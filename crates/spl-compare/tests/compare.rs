use std::sync::atomic::{AtomicBool, Ordering};

use spl_compare::{Baseline, CompareError, compare_document};
use spl_model::{DocumentId, ErrorKind, Outcome, ReportCategory};
use spl_store::{PendingDocument, Store};
use spl_xml::{ExportFormat, NoProgress, ProgressMonitor, import_document};

const PENICILLAMINE: &str = include_str!("../../spl-xml/tests/fixtures/penicillamine.xml");

fn store_with(source: &str, keep_source: bool) -> (Store, DocumentId) {
    let parsed = import_document(source.as_bytes(), &NoProgress).unwrap();
    let mut pending = PendingDocument::new(parsed.graph, parsed.content_hash);
    if keep_source {
        pending = pending.with_source(source);
    }
    let store = Store::new();
    let id = store.commit(pending).unwrap().document_id();
    (store, id)
}

fn render(report: &spl_model::FidelityReport) -> String {
    report
        .discrepancies()
        .map(|entry| {
            format!(
                "{} {} {}",
                entry.outcome.label(),
                entry.category.label(),
                entry.path
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn test_penicillamine_matches_its_source() {
    let (store, id) = store_with(PENICILLAMINE, false);
    for format in [ExportFormat::Pretty, ExportFormat::Minified] {
        let comparison = compare_document(
            &store,
            id,
            Some(PENICILLAMINE.as_bytes()),
            format,
            &NoProgress,
        )
        .unwrap();
        assert_eq!(comparison.baseline, Baseline::Source);
        assert!(
            comparison.report.is_faithful(),
            "{}",
            render(&comparison.report)
        );
        assert!(comparison.report.totals.matched > 50);
        assert!(comparison.report.by_section.contains_key("34067-9"));
    }
}

#[test]
fn test_stored_source_is_the_default_baseline() {
    let (store, id) = store_with(PENICILLAMINE, true);
    let comparison =
        compare_document(&store, id, None, ExportFormat::Pretty, &NoProgress).unwrap();
    assert_eq!(comparison.baseline, Baseline::Stored);
    assert!(comparison.report.is_faithful());
}

#[test]
fn test_round_trip_baseline_without_source() {
    let (store, id) = store_with(PENICILLAMINE, false);
    for format in [ExportFormat::Pretty, ExportFormat::Minified] {
        let comparison = compare_document(&store, id, None, format, &NoProgress).unwrap();
        assert_eq!(comparison.baseline, Baseline::RoundTrip);
        assert_eq!(comparison.report.discrepancy_count(), 0);
    }
}

#[test]
fn test_changed_value_is_a_mismatch() {
    let (store, id) = store_with(PENICILLAMINE, false);
    let edited = PENICILLAMINE.replace("<name>Depen</name>", "<name>Depen XL</name>");
    let comparison = compare_document(
        &store,
        id,
        Some(edited.as_bytes()),
        ExportFormat::Pretty,
        &NoProgress,
    )
    .unwrap();

    insta::assert_snapshot!(
        render(&comparison.report),
        @"ValueMismatch Product /document/component/structuredBody/component/section/subject/manufacturedProduct/manufacturedProduct/name/text()"
    );
    let entry = comparison.report.discrepancies().next().unwrap();
    assert_eq!(entry.expected.as_deref(), Some("Depen XL"));
    assert_eq!(entry.actual.as_deref(), Some("Depen"));
    assert_eq!(entry.section_code.as_deref(), Some("48780-1"));
}

#[test]
fn test_skipped_elements_are_reported_missing() {
    let source = PENICILLAMINE.replace(
        "<title>INDICATIONS AND USAGE</title>",
        "<title>INDICATIONS AND USAGE</title><excerpt><highlight>Boxed</highlight></excerpt>",
    );
    let (store, id) = store_with(&source, true);
    let comparison =
        compare_document(&store, id, None, ExportFormat::Minified, &NoProgress).unwrap();

    let missing: Vec<_> = comparison.report.discrepancies().collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].outcome, Outcome::Missing);
    assert_eq!(
        missing[0].path,
        "/document/component/structuredBody/component[2]/section/excerpt"
    );
    assert_eq!(missing[0].category, ReportCategory::Section);
    assert_eq!(missing[0].expected.as_deref(), Some("Boxed"));
    assert_eq!(comparison.report.by_section["34067-9"].missing, 1);
}

#[test]
fn test_reordered_section_children_are_reported() {
    let source = PENICILLAMINE.replace(
        r#"<code code="34067-9" codeSystem="2.16.840.1.113883.6.1" displayName="INDICATIONS &amp; USAGE SECTION"/>
          <title>INDICATIONS AND USAGE</title>"#,
        r#"<title>INDICATIONS AND USAGE</title>
          <code code="34067-9" codeSystem="2.16.840.1.113883.6.1" displayName="INDICATIONS &amp; USAGE SECTION"/>"#,
    );
    assert_ne!(source, PENICILLAMINE);
    let (store, id) = store_with(&source, true);
    let comparison =
        compare_document(&store, id, None, ExportFormat::Pretty, &NoProgress).unwrap();

    insta::assert_snapshot!(
        render(&comparison.report),
        @"ValueMismatch Section /document/component/structuredBody/component[2]/section/*"
    );
    let entry = comparison.report.discrepancies().next().unwrap();
    assert_eq!(entry.section_code.as_deref(), Some("34067-9"));
    assert!(entry.expected.as_deref().unwrap().starts_with("id, title, code"));
    assert!(entry.actual.as_deref().unwrap().starts_with("id, code, title"));
}

#[test]
fn test_unknown_document_is_not_found() {
    let store = Store::new();
    let id: DocumentId = "00112233445566778899aabbccddeeff".parse().unwrap();
    let err = compare_document(&store, id, None, ExportFormat::Pretty, &NoProgress).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EntityNotFound);
}

#[test]
fn test_malformed_baseline_fails() {
    let (store, id) = store_with(PENICILLAMINE, false);
    let err = compare_document(
        &store,
        id,
        Some(&b"<document><id>"[..]),
        ExportFormat::Pretty,
        &NoProgress,
    )
    .unwrap_err();
    assert!(matches!(err, CompareError::Baseline(_)));
    assert_eq!(err.kind(), ErrorKind::Malformed);
}

struct CancelAfterStart(AtomicBool);

impl ProgressMonitor for CancelAfterStart {
    fn report(&self, _fraction: f64) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[test]
fn test_cancellation_between_phases() {
    let (store, id) = store_with(PENICILLAMINE, false);
    let monitor = CancelAfterStart(AtomicBool::new(false));
    let err = compare_document(&store, id, None, ExportFormat::Pretty, &monitor).unwrap_err();
    assert!(matches!(err, CompareError::Cancelled));
}
