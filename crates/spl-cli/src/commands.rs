use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use serde::Serialize;

use spl_engine::{Engine, EngineConfig, JobOutput, JobStatus, OperationId, Progress};
use spl_model::OperationFailure;

use spl_cli::cli::{CompareArgs, DEFAULT_STORE, DeleteArgs, EntitiesArgs, ExportArgs, ImportArgs};
use spl_cli::summary::{comparison_table, entry_table, import_table, sets_table, violation_table};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Load configuration, apply CLI overrides and open the store.
pub fn open_engine(config: Option<&Path>, store: Option<&Path>) -> Result<Engine> {
    let mut config = EngineConfig::load_or_default(config).context("load configuration")?;
    if let Some(store) = store {
        config.store.snapshot_path = Some(store.to_path_buf());
    } else if config.store.snapshot_path.is_none() {
        config.store.snapshot_path = Some(DEFAULT_STORE.into());
    }
    debug!(snapshot = ?config.store.snapshot_path, "opening store");
    Engine::new(config).context("open store")
}

pub async fn run_import(engine: &Engine, args: &ImportArgs, json: bool) -> Result<i32> {
    let mut payloads = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let payload =
            std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        payloads.push(payload);
    }
    info!(files = payloads.len(), "submitting import");
    let id = engine.submit_import(payloads);
    let progress = follow(engine, id, "importing", !json).await?;
    if !engine.config().store.autosave {
        engine.save_snapshot().await.context("save store")?;
    }
    if json {
        print_json(&progress)?;
        return Ok(exit_code(&progress));
    }
    match progress.result {
        Some(JobOutput::Import(summary)) => {
            println!("{}", import_table(&summary));
            if let Some(table) = violation_table(&summary) {
                println!();
                println!("Schema violations:");
                println!("{table}");
            }
            Ok(0)
        }
        _ => Err(failure_error(progress.error)),
    }
}

pub fn run_export(engine: &Engine, args: &ExportArgs) -> Result<i32> {
    let format = args
        .format
        .map_or(engine.config().export.format, Into::into);
    let xml = engine.export(args.document, format)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &xml).with_context(|| format!("write {}", path.display()))?;
            info!(path = %path.display(), %format, "document exported");
        }
        None => println!("{xml}"),
    }
    Ok(0)
}

pub async fn run_compare(engine: &Engine, args: &CompareArgs, json: bool) -> Result<i32> {
    let source = match &args.source {
        Some(path) => {
            Some(std::fs::read(path).with_context(|| format!("read {}", path.display()))?)
        }
        None => None,
    };
    let format = args
        .format
        .map_or(engine.config().export.format, Into::into);
    let id = engine.submit_comparison_as(args.document, source, format);
    let progress = follow(engine, id, "comparing", !json).await?;
    if json {
        print_json(&progress)?;
        return Ok(exit_code(&progress));
    }
    let Some(JobOutput::Comparison(comparison)) = progress.result else {
        return Err(failure_error(progress.error));
    };
    println!(
        "Document {} compared against {} ({} output)",
        comparison.document_id,
        comparison.baseline.as_str(),
        comparison.format
    );
    println!("{}", comparison_table(&comparison));
    if let Some(table) = entry_table(&comparison.report, args.all) {
        println!();
        println!("{table}");
    }
    let discrepancies = comparison.report.discrepancy_count();
    if discrepancies == 0 {
        println!("No discrepancies.");
        Ok(0)
    } else {
        println!("{discrepancies} discrepancies.");
        Ok(1)
    }
}

pub fn run_sets(engine: &Engine, json: bool) -> Result<i32> {
    let sets = engine.store().sets();
    if json {
        print_json(&sets)?;
    } else if sets.is_empty() {
        println!("The store is empty.");
    } else {
        println!("{}", sets_table(&sets));
    }
    Ok(0)
}

pub fn run_entities(engine: &Engine, args: &EntitiesArgs) -> Result<i32> {
    let store = engine.store();
    match &args.id {
        Some(id) => print_json(&store.get_entity(args.kind, id)?)?,
        None => print_json(&store.list_entities(args.kind)?)?,
    }
    Ok(0)
}

pub async fn run_delete(engine: &Engine, args: &DeleteArgs) -> Result<i32> {
    let removed = engine.store().delete_document(args.document)?;
    engine.save_snapshot().await.context("save store")?;
    println!("Deleted document {} ({removed} rows).", args.document);
    Ok(0)
}

/// Poll an operation until it finishes, with a spinner on the terminal.
async fn follow(
    engine: &Engine,
    id: OperationId,
    label: &str,
    show_spinner: bool,
) -> Result<Progress<JobOutput>> {
    let spinner = spinner(show_spinner);
    loop {
        let progress = engine.progress(id)?;
        if progress.status.is_terminal() {
            spinner.finish_and_clear();
            return Ok(progress);
        }
        spinner.set_message(format!(
            "{label} ({}, {}%)",
            progress.status.as_str(),
            progress.percent
        ));
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn spinner(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn exit_code(progress: &Progress<JobOutput>) -> i32 {
    match progress.status {
        JobStatus::Succeeded => 0,
        _ => 1,
    }
}

fn failure_error(failure: Option<OperationFailure>) -> anyhow::Error {
    let Some(failure) = failure else {
        return anyhow!("operation finished without a result");
    };
    match &failure.suggestion {
        Some(hint) => anyhow!("{failure}\nhint: {hint}"),
        None => anyhow!("{failure}"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
