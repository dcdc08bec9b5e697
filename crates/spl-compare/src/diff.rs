//! Path-addressed structural diff of two element trees.
//!
//! Same-named siblings are paired by position; the relative order of the
//! paired children is compared separately and reported at `<parent>/*`.
//! Attribute order, namespace
//! declarations, comments and processing instructions never reach this
//! module (the tree reader drops them); text is compared with whitespace
//! collapsed and trimmed.

use spl_model::{FidelityReport, Outcome, PathEntry, ReportCategory, XmlElement, XmlNode};
use spl_xml::common::{normalize_text, path_segment};

/// Diff `actual` (the regenerated document) against `expected` (the baseline).
pub fn compare_trees(expected: &XmlElement, actual: &XmlElement) -> FidelityReport {
    let mut report = FidelityReport::default();
    let context = Context {
        category: ReportCategory::Document,
        section_code: None,
    };
    if expected.name == actual.name {
        compare_element(&mut report, &format!("/{}", expected.name), expected, actual, &context);
    } else {
        unmatched(&mut report, &format!("/{}", expected.name), expected, Outcome::Missing, &context);
        unmatched(&mut report, &format!("/{}", actual.name), actual, Outcome::Extra, &context);
    }
    report
}

/// Entity and section an element belongs to.
#[derive(Debug, Clone)]
struct Context {
    category: ReportCategory,
    section_code: Option<String>,
}

impl Context {
    fn enter(&self, element: &XmlElement, counterpart: Option<&XmlElement>) -> Self {
        let mut next = self.clone();
        if let Some(category) = category_of(&element.name, self.category) {
            next.category = category;
        }
        if element.name == "section" {
            next.section_code = section_code(element).or_else(|| counterpart.and_then(section_code));
        }
        next
    }
}

/// Category an element opens, if it starts a new entity.
fn category_of(name: &str, current: ReportCategory) -> Option<ReportCategory> {
    let category = match name {
        "author" | "representedOrganization" | "assignedOrganization" => {
            ReportCategory::Organization
        }
        "section" => ReportCategory::Section,
        "text" if current == ReportCategory::Section => ReportCategory::Content,
        "manufacturedProduct" => ReportCategory::Product,
        "ingredient" => ReportCategory::Ingredient,
        "asContent" | "containerPackagedProduct" => ReportCategory::Packaging,
        "approval" => ReportCategory::MarketingCategory,
        "interaction" | "contraindication" => ReportCategory::Interaction,
        _ => return None,
    };
    Some(category)
}

fn section_code(section: &XmlElement) -> Option<String> {
    section
        .child("code")
        .and_then(|code| code.attribute("code"))
        .map(str::to_string)
}

/// Text directly inside `element`, ignoring child elements.
fn own_text(element: &XmlElement) -> String {
    let mut text = String::new();
    for child in &element.children {
        if let XmlNode::Text { value } = child {
            text.push_str(value);
        }
    }
    normalize_text(&text)
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn record(
    report: &mut FidelityReport,
    path: String,
    outcome: Outcome,
    context: &Context,
    expected: Option<String>,
    actual: Option<String>,
) {
    report.push(PathEntry {
        path,
        outcome,
        category: context.category,
        section_code: context.section_code.clone(),
        expected,
        actual,
    });
}

fn compare_element(
    report: &mut FidelityReport,
    path: &str,
    expected: &XmlElement,
    actual: &XmlElement,
    parent: &Context,
) {
    let context = parent.enter(expected, Some(actual));
    record(report, path.to_string(), Outcome::Match, &context, None, None);
    compare_attributes(report, path, expected, actual, &context);
    compare_text(report, path, expected, actual, &context);
    compare_children(report, path, expected, actual, &context);
}

fn compare_attributes(
    report: &mut FidelityReport,
    path: &str,
    expected: &XmlElement,
    actual: &XmlElement,
    context: &Context,
) {
    for (key, value) in &expected.attributes {
        let attribute_path = format!("{path}/@{key}");
        let wanted = normalize_text(value);
        match actual.attribute(key).map(normalize_text) {
            Some(found) if found == wanted => {
                record(report, attribute_path, Outcome::Match, context, None, None);
            }
            Some(found) => record(
                report,
                attribute_path,
                Outcome::ValueMismatch,
                context,
                Some(wanted),
                Some(found),
            ),
            None => record(
                report,
                attribute_path,
                Outcome::Missing,
                context,
                Some(wanted),
                None,
            ),
        }
    }
    for (key, value) in &actual.attributes {
        if expected.attribute(key).is_none() {
            record(
                report,
                format!("{path}/@{key}"),
                Outcome::Extra,
                context,
                None,
                Some(normalize_text(value)),
            );
        }
    }
}

fn compare_text(
    report: &mut FidelityReport,
    path: &str,
    expected: &XmlElement,
    actual: &XmlElement,
    context: &Context,
) {
    let wanted = own_text(expected);
    let found = own_text(actual);
    let outcome = match (wanted.is_empty(), found.is_empty()) {
        (true, true) => return,
        (false, true) => Outcome::Missing,
        (true, false) => Outcome::Extra,
        (false, false) if wanted == found => Outcome::Match,
        (false, false) => Outcome::ValueMismatch,
    };
    let (expected_value, actual_value) = if outcome == Outcome::Match {
        (None, None)
    } else {
        (non_empty(wanted), non_empty(found))
    };
    record(
        report,
        format!("{path}/text()"),
        outcome,
        context,
        expected_value,
        actual_value,
    );
}

fn compare_children(
    report: &mut FidelityReport,
    path: &str,
    expected: &XmlElement,
    actual: &XmlElement,
    context: &Context,
) {
    let mut names: Vec<&str> = Vec::new();
    for child in expected.child_elements().chain(actual.child_elements()) {
        if !names.contains(&child.name.as_str()) {
            names.push(&child.name);
        }
    }

    for name in names {
        let wanted: Vec<&XmlElement> = expected.child_elements().filter(|c| c.name == name).collect();
        let found: Vec<&XmlElement> = actual.child_elements().filter(|c| c.name == name).collect();
        for index in 0..wanted.len().max(found.len()) {
            let child_path = format!("{path}/{}", path_segment(name, index + 1));
            match (wanted.get(index), found.get(index)) {
                (Some(left), Some(right)) => {
                    compare_element(report, &child_path, left, right, context);
                }
                (Some(left), None) => {
                    unmatched(report, &child_path, left, Outcome::Missing, context);
                }
                (None, Some(right)) => {
                    unmatched(report, &child_path, right, Outcome::Extra, context);
                }
                (None, None) => {}
            }
        }
    }

    let wanted = paired_order(expected, actual);
    let found = paired_order(actual, expected);
    if wanted != found {
        record(
            report,
            format!("{path}/*"),
            Outcome::ValueMismatch,
            context,
            Some(wanted.join(", ")),
            Some(found.join(", ")),
        );
    }
}

/// Child element names of `side` in document order, keeping only the
/// occurrences that have a positional counterpart in `other`.
fn paired_order<'a>(side: &'a XmlElement, other: &XmlElement) -> Vec<&'a str> {
    let mut seen: Vec<(&str, usize)> = Vec::new();
    let mut order = Vec::new();
    for child in side.child_elements() {
        let name = child.name.as_str();
        let occurrence = match seen.iter_mut().find(|(seen_name, _)| *seen_name == name) {
            Some((_, count)) => {
                *count += 1;
                *count
            }
            None => {
                seen.push((name, 1));
                1
            }
        };
        if other.child_elements().filter(|c| c.name == name).count() >= occurrence {
            order.push(name);
        }
    }
    order
}

/// One entry for a subtree present on one side only.
fn unmatched(
    report: &mut FidelityReport,
    path: &str,
    element: &XmlElement,
    outcome: Outcome,
    parent: &Context,
) {
    let context = parent.enter(element, None);
    let summary = non_empty(normalize_text(&element.text_content()))
        .or_else(|| Some(format!("<{}>", element.name)));
    let (expected, actual) = match outcome {
        Outcome::Extra => (None, summary),
        _ => (summary, None),
    };
    record(report, path.to_string(), outcome, &context, expected, actual);
}

#[cfg(test)]
mod tests {
    use spl_xml::parse_tree;

    use super::*;

    fn diff(expected: &str, actual: &str) -> FidelityReport {
        compare_trees(
            &parse_tree(expected.as_bytes()).unwrap(),
            &parse_tree(actual.as_bytes()).unwrap(),
        )
    }

    #[test]
    fn identical_trees_have_only_matches() {
        let xml = r#"<document><id root="a"/><title>T</title></document>"#;
        let report = diff(xml, xml);
        assert!(report.is_faithful());
        assert_eq!(report.totals.matched, 5);
    }

    #[test]
    fn attribute_order_and_whitespace_are_ignored() {
        let report = diff(
            r#"<document xmlns="urn:hl7-org:v3"><!-- c --><id root="a" extension="b"/>
                 <title>  Two   words </title></document>"#,
            r#"<document><id extension="b" root="a"/><title>Two words</title></document>"#,
        );
        assert!(report.is_faithful(), "{:?}", report.entries);
    }

    #[test]
    fn discrepancies_are_classified() {
        let report = diff(
            r#"<document><id root="a"/><title>Old</title><component><section><code code="34067-9"/></section></component></document>"#,
            r#"<document><id root="b"/><title>New</title><extra/></document>"#,
        );
        let outcomes: Vec<_> = report
            .discrepancies()
            .map(|entry| (entry.path.as_str(), entry.outcome))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("/document/id/@root", Outcome::ValueMismatch),
                ("/document/title/text()", Outcome::ValueMismatch),
                ("/document/component", Outcome::Missing),
                ("/document/extra", Outcome::Extra),
            ]
        );
    }

    #[test]
    fn entries_carry_category_and_section() {
        let report = diff(
            r#"<document><component><section><code code="48780-1"/><subject><manufacturedProduct><manufacturedProduct><ingredient classCode="ACTIB"/></manufacturedProduct></manufacturedProduct></subject></section></component></document>"#,
            r#"<document><component><section><code code="48780-1"/><subject><manufacturedProduct><manufacturedProduct><ingredient classCode="IACT"/></manufacturedProduct></manufacturedProduct></subject></section></component></document>"#,
        );
        let entry = report.discrepancies().next().unwrap();
        assert_eq!(
            entry.path,
            "/document/component/section/subject/manufacturedProduct/manufacturedProduct/ingredient/@classCode"
        );
        assert_eq!(entry.category, ReportCategory::Ingredient);
        assert_eq!(entry.section_code.as_deref(), Some("48780-1"));
        assert_eq!(report.by_section["48780-1"].mismatched, 1);
        assert_eq!(report.by_category[&ReportCategory::Ingredient].mismatched, 1);
    }

    #[test]
    fn positional_steps_for_repeated_siblings() {
        let report = diff(
            "<document><component/><component><section/></component></document>",
            "<document><component/><component/></document>",
        );
        let missing = report.discrepancies().next().unwrap();
        assert_eq!(missing.path, "/document/component[2]/section");
        assert_eq!(missing.outcome, Outcome::Missing);
        assert_eq!(missing.category, ReportCategory::Section);
    }

    #[test]
    fn section_text_is_content() {
        let report = diff(
            "<document><section><text><paragraph>One</paragraph></text></section></document>",
            "<document><section><text><paragraph>Two</paragraph></text></section></document>",
        );
        let entry = report.discrepancies().next().unwrap();
        assert_eq!(entry.category, ReportCategory::Content);
        assert_eq!(entry.expected.as_deref(), Some("One"));
        assert_eq!(entry.actual.as_deref(), Some("Two"));
    }

    #[test]
    fn reordered_siblings_are_a_mismatch() {
        let report = diff(
            r#"<document><section><id root="a"/><title>Indications</title><code code="34067-9"/></section></document>"#,
            r#"<document><section><id root="a"/><code code="34067-9"/><title>Indications</title></section></document>"#,
        );
        assert_eq!(report.discrepancy_count(), 1);
        let entry = report.discrepancies().next().unwrap();
        assert_eq!(entry.path, "/document/section/*");
        assert_eq!(entry.outcome, Outcome::ValueMismatch);
        assert_eq!(entry.expected.as_deref(), Some("id, title, code"));
        assert_eq!(entry.actual.as_deref(), Some("id, code, title"));
        assert_eq!(entry.section_code.as_deref(), Some("34067-9"));
    }

    #[test]
    fn unpaired_children_do_not_count_as_reordering() {
        let report = diff(
            "<document><id/><extra/><title>T</title></document>",
            "<document><id/><title>T</title></document>",
        );
        let outcomes: Vec<_> = report
            .discrepancies()
            .map(|entry| (entry.path.as_str(), entry.outcome))
            .collect();
        assert_eq!(outcomes, vec![("/document/extra", Outcome::Missing)]);
    }
}
