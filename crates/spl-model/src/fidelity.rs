use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome for one XML path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Match,
    /// Present in the source, absent after the round trip.
    Missing,
    /// Present after the round trip, absent in the source.
    Extra,
    ValueMismatch,
}

impl Outcome {
    pub fn is_discrepancy(&self) -> bool {
        !matches!(self, Outcome::Match)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Match => "Match",
            Outcome::Missing => "Missing",
            Outcome::Extra => "Extra",
            Outcome::ValueMismatch => "ValueMismatch",
        }
    }
}

/// Entity type a path belongs to, for summary aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    Document,
    Organization,
    Product,
    Ingredient,
    Packaging,
    MarketingCategory,
    Interaction,
    Section,
    Content,
}

impl ReportCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ReportCategory::Document => "Document",
            ReportCategory::Organization => "Organization",
            ReportCategory::Product => "Product",
            ReportCategory::Ingredient => "Ingredient",
            ReportCategory::Packaging => "Packaging",
            ReportCategory::MarketingCategory => "MarketingCategory",
            ReportCategory::Interaction => "Interaction",
            ReportCategory::Section => "Section",
            ReportCategory::Content => "Content",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    pub path: String,
    pub outcome: Outcome,
    pub category: ReportCategory,
    /// Code of the innermost enclosing section, if any.
    pub section_code: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub matched: usize,
    pub missing: usize,
    pub extra: usize,
    pub mismatched: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Match => self.matched += 1,
            Outcome::Missing => self.missing += 1,
            Outcome::Extra => self.extra += 1,
            Outcome::ValueMismatch => self.mismatched += 1,
        }
    }

    pub fn discrepancies(&self) -> usize {
        self.missing + self.extra + self.mismatched
    }
}

/// Structured result of comparing a source document with its regeneration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FidelityReport {
    pub entries: Vec<PathEntry>,
    pub totals: OutcomeCounts,
    pub by_category: BTreeMap<ReportCategory, OutcomeCounts>,
    pub by_section: BTreeMap<String, OutcomeCounts>,
}

impl FidelityReport {
    pub fn push(&mut self, entry: PathEntry) {
        self.totals.record(entry.outcome);
        self.by_category
            .entry(entry.category)
            .or_default()
            .record(entry.outcome);
        if let Some(code) = &entry.section_code {
            self.by_section
                .entry(code.clone())
                .or_default()
                .record(entry.outcome);
        }
        self.entries.push(entry);
    }

    pub fn discrepancy_count(&self) -> usize {
        self.totals.discrepancies()
    }

    pub fn is_faithful(&self) -> bool {
        self.discrepancy_count() == 0
    }

    pub fn discrepancies(&self) -> impl Iterator<Item = &PathEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.outcome.is_discrepancy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, outcome: Outcome, section: Option<&str>) -> PathEntry {
        PathEntry {
            path: path.to_string(),
            outcome,
            category: ReportCategory::Section,
            section_code: section.map(str::to_string),
            expected: None,
            actual: None,
        }
    }

    #[test]
    fn report_aggregates_counts() {
        let mut report = FidelityReport::default();
        report.push(entry("/document", Outcome::Match, None));
        report.push(entry("/document/a", Outcome::Missing, Some("34067-9")));
        report.push(entry("/document/b", Outcome::Extra, Some("34067-9")));
        report.push(entry("/document/c/@x", Outcome::ValueMismatch, Some("34084-4")));

        assert_eq!(report.totals.matched, 1);
        assert_eq!(report.discrepancy_count(), 3);
        assert!(!report.is_faithful());
        assert_eq!(report.by_section["34067-9"].discrepancies(), 2);
        assert_eq!(report.by_category[&ReportCategory::Section].discrepancies(), 3);
        assert_eq!(report.discrepancies().count(), 3);
    }

    #[test]
    fn empty_report_is_faithful() {
        assert!(FidelityReport::default().is_faithful());
    }
}
