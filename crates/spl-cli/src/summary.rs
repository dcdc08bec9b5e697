//! Table rendering for command results.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use spl_compare::Comparison;
use spl_engine::ImportSummary;
use spl_model::{FidelityReport, Outcome, OutcomeCounts, PathEntry};
use spl_store::SetSummary;

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

pub fn import_table(summary: &ImportSummary) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Document"),
        header_cell("Set"),
        header_cell("Version"),
        header_cell("Status"),
        header_cell("Violations"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    align_column(&mut table, 4, CellAlignment::Right);
    for document in &summary.documents {
        let status = if document.created {
            Cell::new("created").fg(Color::Green)
        } else {
            dim_cell("unchanged")
        };
        table.add_row(vec![
            Cell::new(document.document_id),
            Cell::new(&document.set_id),
            Cell::new(document.version),
            status,
            count_cell(document.violations.len(), Color::Yellow),
        ]);
    }
    table
}

/// Schema violations of every imported document, or `None` if there are none.
pub fn violation_table(summary: &ImportSummary) -> Option<Table> {
    if summary.violation_count() == 0 {
        return None;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Version"),
        header_cell("Rule"),
        header_cell("Path"),
        header_cell("Message"),
    ]);
    apply_table_style(&mut table);
    for document in &summary.documents {
        for violation in &document.violations {
            table.add_row(vec![
                Cell::new(document.version),
                Cell::new(violation.rule.as_str()).fg(Color::Yellow),
                Cell::new(&violation.location.path),
                Cell::new(&violation.message),
            ]);
        }
    }
    Some(table)
}

pub fn comparison_table(comparison: &Comparison) -> Table {
    let report = &comparison.report;
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Category"),
        header_cell("Match"),
        header_cell("Missing"),
        header_cell("Extra"),
        header_cell("Mismatch"),
    ]);
    apply_table_style(&mut table);
    for column in 1..=4 {
        align_column(&mut table, column, CellAlignment::Right);
    }
    for (category, counts) in &report.by_category {
        table.add_row(counts_row(Cell::new(category.label()), counts));
    }
    table.add_row(counts_row(
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        &report.totals,
    ));
    table
}

/// Path-level entries; discrepancies only unless `all` is set.
pub fn entry_table(report: &FidelityReport, all: bool) -> Option<Table> {
    let entries: Vec<&PathEntry> = if all {
        report.entries.iter().collect()
    } else {
        report.discrepancies().collect()
    };
    if entries.is_empty() {
        return None;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Outcome"),
        header_cell("Category"),
        header_cell("Section"),
        header_cell("Path"),
        header_cell("Expected"),
        header_cell("Actual"),
    ]);
    apply_table_style(&mut table);
    for entry in entries {
        table.add_row(vec![
            outcome_cell(entry.outcome),
            Cell::new(entry.category.label()),
            optional_cell(entry.section_code.as_deref()),
            Cell::new(&entry.path),
            optional_cell(entry.expected.as_deref()),
            optional_cell(entry.actual.as_deref()),
        ]);
    }
    Some(table)
}

pub fn sets_table(sets: &[SetSummary]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Set"),
        header_cell("Current"),
        header_cell("Document"),
        header_cell("Versions"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    for set in sets {
        let versions: Vec<String> = set.versions.iter().map(u32::to_string).collect();
        table.add_row(vec![
            Cell::new(&set.set_id),
            optional_cell(set.current_version.map(|v| v.to_string()).as_deref()),
            optional_cell(set.current_document.map(|id| id.to_string()).as_deref()),
            Cell::new(versions.join(", ")),
        ]);
    }
    table
}

fn counts_row(label: Cell, counts: &OutcomeCounts) -> Vec<Cell> {
    vec![
        label,
        Cell::new(counts.matched),
        count_cell(counts.missing, Color::Red),
        count_cell(counts.extra, Color::Red),
        count_cell(counts.mismatched, Color::Yellow),
    ]
}

fn outcome_cell(outcome: Outcome) -> Cell {
    let cell = Cell::new(outcome.label());
    match outcome {
        Outcome::Match => cell.fg(Color::Green),
        Outcome::Missing | Outcome::Extra => cell.fg(Color::Red).add_attribute(Attribute::Bold),
        Outcome::ValueMismatch => cell.fg(Color::Yellow).add_attribute(Attribute::Bold),
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn optional_cell(value: Option<&str>) -> Cell {
    match value {
        Some(value) => Cell::new(value),
        None => dim_cell("-"),
    }
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value.to_string()).fg(Color::DarkGrey)
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}
