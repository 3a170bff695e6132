//! Batch processing command for many documents.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use poline_core::{Document, DocumentProcessor, ProcessingOutcome, SheetHeader};

use super::process::{format_outcome, OutputFormat};
use super::{is_supported_input, load_config};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern for input documents
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Vendor name written to every row
    #[arg(long, default_value = "")]
    vendor: String,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of documents processed at once
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

/// Result of processing a single file.
struct ProcessResult {
    path: PathBuf,
    header: SheetHeader,
    outcome: Option<ProcessingOutcome>,
    error: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    let mut files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| is_supported_input(p))
        .collect();
    files.sort();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    eprintln!("{} Found {} files to process", style("ℹ").blue(), files.len());

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let processor = Arc::new(DocumentProcessor::new(config)?);
    let permits = Arc::new(Semaphore::new(args.jobs.max(1)));
    let mut tasks = JoinSet::new();

    for (index, path) in files.into_iter().enumerate() {
        let processor = processor.clone();
        let permits = permits.clone();
        let vendor = args.vendor.clone();

        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await?;
            let result = tokio::task::spawn_blocking(move || process_single_file(path, &processor, &vendor)).await?;
            anyhow::Ok((index, result))
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined??;
        overall_pb.inc(1);

        if let Some(message) = &result.error {
            if args.continue_on_error {
                warn!("Failed to process {}: {}", result.path.display(), message);
            } else {
                error!("Failed to process {}: {}", result.path.display(), message);
                tasks.abort_all();
                anyhow::bail!("Processing failed: {}", message);
            }
        }
        results.push((index, result));
    }

    overall_pb.finish_with_message("Complete");
    results.sort_by_key(|(index, _)| *index);
    let results: Vec<ProcessResult> = results.into_iter().map(|(_, result)| result).collect();

    if let Some(output_dir) = &args.output_dir {
        for result in &results {
            if let Some(outcome) = &result.outcome {
                let output_name = result.path.file_stem().and_then(|s| s.to_str()).unwrap_or("invoice");
                let output_path = output_dir.join(format!("{}.{}", output_name, args.format.extension()));

                fs::write(&output_path, format_outcome(outcome, &result.header, args.format)?)?;
                debug!("Wrote output to {}", output_path.display());
            }
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        eprintln!("{} Summary written to {}", style("✓").green(), summary_path.display());
    }

    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();
    let items: usize = results.iter().filter_map(|r| r.outcome.as_ref()).map(|o| o.items.len()).sum();

    eprintln!();
    eprintln!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    eprintln!(
        "   {} successful, {} failed, {} line items",
        style(results.len() - failed.len()).green(),
        style(failed.len()).red(),
        items
    );

    if !failed.is_empty() {
        eprintln!();
        eprintln!("{}", style("Failed files:").red());
        for result in &failed {
            eprintln!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

fn process_single_file(path: PathBuf, processor: &DocumentProcessor, vendor: &str) -> ProcessResult {
    let file_start = Instant::now();

    let loaded = Document::from_file(&path);
    let (header, outcome, error) = match loaded {
        Ok(document) => {
            let header = SheetHeader::from_text(document.text(), vendor);
            let outcome = processor.process(&document);
            (header, Some(outcome), None)
        }
        Err(e) => (SheetHeader::default(), None, Some(e.to_string())),
    };

    ProcessResult {
        path,
        header,
        outcome,
        error,
        processing_time_ms: file_start.elapsed().as_millis() as u64,
    }
}

fn write_summary(path: &Path, results: &[ProcessResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "invoice_number",
        "order_date",
        "line_items",
        "rejected",
        "placeholder_patterns",
        "partial",
        "processing_time_ms",
        "error",
    ])?;

    for result in results {
        let filename = result.path.file_name().and_then(|s| s.to_str()).unwrap_or("");

        if let Some(outcome) = &result.outcome {
            let report = &outcome.report;
            wtr.write_record([
                filename,
                "success",
                &result.header.invoice_number,
                &result
                    .header
                    .order_date
                    .map(|d| d.format("%m/%d/%Y").to_string())
                    .unwrap_or_default(),
                &outcome.items.len().to_string(),
                &report.rejected.to_string(),
                &report.placeholder_patterns.len().to_string(),
                &(report.timed_out || report.cancelled).to_string(),
                &result.processing_time_ms.to_string(),
                "",
            ])?;
        } else {
            wtr.write_record([
                filename,
                "error",
                "",
                "",
                "",
                "",
                "",
                "",
                &result.processing_time_ms.to_string(),
                result.error.as_deref().unwrap_or(""),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
