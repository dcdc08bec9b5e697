//! CLI argument definitions for the `spl` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

use spl_model::{DocumentId, EntityKind};
use spl_xml::ExportFormat;

/// Snapshot used when neither `--store` nor the config file names one.
pub const DEFAULT_STORE: &str = "spl-store.json";

#[derive(Parser)]
#[command(
    name = "spl",
    version,
    about = "Import, export and round-trip check Structured Product Labeling documents",
    long_about = "Import SPL XML documents into a versioned relational store, \
                  regenerate them as XML and report how faithfully a document \
                  survives the round trip."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Store snapshot file (overrides the configuration).
    #[arg(long, value_name = "PATH", global = true)]
    pub store: Option<PathBuf>,

    /// Print machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import one or more SPL documents as a single batch.
    Import(ImportArgs),

    /// Regenerate a stored document as SPL XML.
    Export(ExportArgs),

    /// Report how faithfully a stored document round-trips.
    Compare(CompareArgs),

    /// List document sets and their versions.
    Sets,

    /// Show stored rows of one entity type.
    Entities(EntitiesArgs),

    /// Delete a document and the rows it owns.
    Delete(DeleteArgs),
}

#[derive(Parser)]
pub struct ImportArgs {
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Parser)]
pub struct ExportArgs {
    #[arg(value_name = "DOCUMENT_ID")]
    pub document: DocumentId,

    /// Output layout (default from configuration).
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Write to this file instead of stdout.
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Parser)]
pub struct CompareArgs {
    #[arg(value_name = "DOCUMENT_ID")]
    pub document: DocumentId,

    /// Compare against this file instead of the stored source.
    #[arg(long, value_name = "FILE")]
    pub source: Option<PathBuf>,

    /// Regenerate in this layout (default from configuration).
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// List matching paths too, not only discrepancies.
    #[arg(long)]
    pub all: bool,
}

#[derive(Parser)]
pub struct EntitiesArgs {
    /// Entity type, e.g. `product` or `package_item`.
    #[arg(value_name = "KIND")]
    pub kind: EntityKind,

    /// Show one row instead of the whole table.
    #[arg(value_name = "ID")]
    pub id: Option<String>,
}

#[derive(Parser)]
pub struct DeleteArgs {
    #[arg(value_name = "DOCUMENT_ID")]
    pub document: DocumentId,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Pretty,
    Minified,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Pretty => ExportFormat::Pretty,
            FormatArg::Minified => ExportFormat::Minified,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
