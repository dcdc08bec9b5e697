use clap::Parser;
use tracing::level_filters::LevelFilter;

use spl_cli::cli::{Cli, Command, FormatArg};
use spl_cli::logging::default_directives;
use spl_cli::summary::{import_table, sets_table, violation_table};
use spl_engine::{ImportSummary, ImportedDocument};
use spl_model::{DocumentId, EntityKind, Location, SchemaViolation, SetId, ViolationRule};
use spl_store::SetSummary;

const DOCUMENT: &str = "0123456789abcdef0123456789abcdef";

fn document_id() -> DocumentId {
    DOCUMENT.parse().unwrap()
}

fn summary(violations: Vec<SchemaViolation>) -> ImportSummary {
    ImportSummary {
        documents: vec![ImportedDocument {
            document_id: document_id(),
            set_id: SetId::new("set-1").unwrap(),
            version: 3,
            created: true,
            violations,
        }],
    }
}

#[test]
fn test_parse_import_with_globals() {
    let cli = Cli::try_parse_from([
        "spl", "--store", "labels.json", "import", "a.xml", "b.xml", "--json",
    ])
    .unwrap();
    assert!(cli.json);
    assert_eq!(cli.store.unwrap().to_str(), Some("labels.json"));
    let Command::Import(args) = cli.command else {
        panic!("expected import");
    };
    assert_eq!(args.files.len(), 2);
}

#[test]
fn test_import_requires_a_file() {
    assert!(Cli::try_parse_from(["spl", "import"]).is_err());
}

#[test]
fn test_parse_compare_and_entities() {
    let cli = Cli::try_parse_from([
        "spl", "compare", DOCUMENT, "--format", "minified", "--all",
    ])
    .unwrap();
    let Command::Compare(args) = cli.command else {
        panic!("expected compare");
    };
    assert_eq!(args.document, document_id());
    assert!(matches!(args.format, Some(FormatArg::Minified)));
    assert!(args.all);

    let cli = Cli::try_parse_from(["spl", "entities", "package_item"]).unwrap();
    let Command::Entities(args) = cli.command else {
        panic!("expected entities");
    };
    assert_eq!(args.kind, EntityKind::PackageItem);
    assert!(args.id.is_none());
}

#[test]
fn test_invalid_document_id_is_rejected() {
    assert!(Cli::try_parse_from(["spl", "export", "not-an-id"]).is_err());
}

#[test]
fn test_default_log_directives() {
    insta::assert_snapshot!(
        default_directives(LevelFilter::INFO),
        @"warn,spl_cli=info,spl_compare=info,spl_engine=info,spl_model=info,spl_store=info,spl_xml=info"
    );
}

#[test]
fn test_import_table_lists_documents() {
    let mut table = import_table(&summary(Vec::new()));
    table.force_no_tty();
    let rendered = table.to_string();
    assert!(rendered.contains(DOCUMENT));
    assert!(rendered.contains("set-1"));
    assert!(rendered.contains("created"));
    assert!(violation_table(&summary(Vec::new())).is_none());
}

#[test]
fn test_violation_table_shows_rule_and_path() {
    let violation = SchemaViolation::new(
        ViolationRule::MissingRoute,
        "product has no route of administration",
        Location::new("/document/component/section/subject", None),
    );
    let mut table = violation_table(&summary(vec![violation])).unwrap();
    table.force_no_tty();
    let rendered = table.to_string();
    assert!(rendered.contains("missing_route"));
    assert!(rendered.contains("/document/component/section/subject"));
}

#[test]
fn test_sets_table() {
    let sets = vec![SetSummary {
        set_id: SetId::new("set-1").unwrap(),
        current_version: Some(2),
        current_document: Some(document_id()),
        versions: vec![1, 2],
    }];
    let mut table = sets_table(&sets);
    table.force_no_tty();
    let rendered = table.to_string();
    assert!(rendered.contains("1, 2"));
    assert!(rendered.contains(DOCUMENT));
}
