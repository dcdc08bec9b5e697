use proptest::prelude::*;

use spl_model::ErrorKind;
use spl_xml::{ExportFormat, NoProgress, export_document, import_document};

const PENICILLAMINE: &[u8] = include_bytes!("fixtures/penicillamine.xml");

fn reimport(xml: &str) -> spl_xml::ParsedDocument {
    import_document(xml.as_bytes(), &NoProgress).unwrap()
}

#[test]
fn test_export_reimports_to_identical_graph() {
    let original = import_document(PENICILLAMINE, &NoProgress).unwrap();
    for format in [ExportFormat::Pretty, ExportFormat::Minified] {
        let xml = export_document(&original.graph, format).unwrap();
        let again = reimport(&xml);
        assert_eq!(again.graph, original.graph, "format {format}");
        assert_eq!(again.content_hash, original.content_hash);
        assert!(again.violations.is_empty());
    }
}

#[test]
fn test_pretty_and_minified_share_content_hash() {
    let original = import_document(PENICILLAMINE, &NoProgress).unwrap();
    let pretty = reimport(&export_document(&original.graph, ExportFormat::Pretty).unwrap());
    let minified = reimport(&export_document(&original.graph, ExportFormat::Minified).unwrap());
    assert_eq!(pretty.content_hash, minified.content_hash);
}

#[test]
fn test_export_is_stable_after_one_round_trip() {
    let original = import_document(PENICILLAMINE, &NoProgress).unwrap();
    let first = export_document(&original.graph, ExportFormat::Pretty).unwrap();
    let second = export_document(&reimport(&first).graph, ExportFormat::Pretty).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_pretty_export_keeps_adjacent_inline_text() {
    let source = r#"<document><id root="d"/><setId root="s"/><versionNumber value="1"/><component><structuredBody><component><section><id root="a"/><code code="34067-9"/><text><paragraph><content styleCode="bold">one</content><content>two</content></paragraph></text></section></component></structuredBody></component></document>"#;
    let original = reimport(source);
    let xml = export_document(&original.graph, ExportFormat::Pretty).unwrap();
    let again = reimport(&xml);

    let paragraph = again.graph.sections[0].content[0].as_element().unwrap();
    assert_eq!(paragraph.text_content(), "onetwo");
    assert_eq!(again.graph, original.graph);
}

fn sections_xml(titles: &[String]) -> String {
    let mut body = String::new();
    for (index, title) in titles.iter().enumerate() {
        body.push_str(&format!(
            r#"<component><section><id root="sub-{index}"/><code code="42229-5"/><title>{title}</title><text><paragraph>Block {index}</paragraph></text></section></component>"#
        ));
    }
    format!(
        r#"<document xmlns="urn:hl7-org:v3"><id root="d"/><setId root="s"/><versionNumber value="3"/><component><structuredBody><component><section><id root="parent"/><code code="34071-1"/>{body}</section></component></structuredBody></component></document>"#
    )
}

fn package_chain_xml(codes: &[String]) -> String {
    let mut packaging = String::new();
    for code in codes {
        packaging.push_str(&format!(
            r#"<asContent><containerPackagedProduct><code code="{code}"/>"#
        ));
    }
    for _ in codes {
        packaging.push_str("</containerPackagedProduct></asContent>");
    }
    format!(
        r#"<document><id root="d"/><setId root="s"/><versionNumber value="1"/><component><structuredBody><component><section><id root="p"/><code code="48780-1"/><subject><manufacturedProduct><manufacturedProduct><formCode code="C42998"/>{packaging}</manufacturedProduct><consumedIn><substanceAdministration><routeCode code="C38288"/></substanceAdministration></consumedIn></manufacturedProduct></subject></section></component></structuredBody></component></document>"#
    )
}

proptest! {
    #[test]
    fn subsection_order_survives_round_trip(
        titles in proptest::collection::vec("[A-Z][a-z]{0,8}( [a-z]{1,6})?", 1..8).prop_shuffle()
    ) {
        let parsed = import_document(sections_xml(&titles).as_bytes(), &NoProgress).unwrap();
        for format in [ExportFormat::Pretty, ExportFormat::Minified] {
            let xml = export_document(&parsed.graph, format).unwrap();
            let again = import_document(xml.as_bytes(), &NoProgress).unwrap();
            let order: Vec<String> = again.graph.sections[0]
                .subsections
                .iter()
                .filter_map(|section| section.title.clone())
                .collect();
            prop_assert_eq!(&order, &titles);
        }
    }

    #[test]
    fn distinct_package_codes_are_accepted(
        codes in proptest::collection::hash_set("[0-9]{4}-[0-9]{4}-[0-9]{2}", 1..6)
    ) {
        let codes: Vec<String> = codes.into_iter().collect();
        let parsed = import_document(package_chain_xml(&codes).as_bytes(), &NoProgress).unwrap();
        let product = parsed.graph.products()[0];
        prop_assert_eq!(product.packaging[0].level.level_count(), codes.len());
    }

    #[test]
    fn repeated_package_code_is_a_cycle(
        codes in proptest::collection::hash_set("[0-9]{4}-[0-9]{4}-[0-9]{2}", 1..6),
        repeat_at in 0usize..6,
    ) {
        let mut codes: Vec<String> = codes.into_iter().collect();
        let repeated = codes[repeat_at % codes.len()].clone();
        codes.push(repeated);
        let err = import_document(package_chain_xml(&codes).as_bytes(), &NoProgress).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::ReferentialIntegrity);
    }
}
