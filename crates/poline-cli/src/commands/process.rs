//! Process command - extract line items from a single document.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info, warn};

use poline_core::{sheet_rows, Document, DocumentProcessor, LineItem, ProcessingOutcome, ProcessingReport, SheetHeader, SheetRow};

use super::{is_supported_input, load_config};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input document (upstream JSON or plain text with form-feed page breaks)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Vendor name written to every row
    #[arg(long, default_value = "")]
    vendor: String,

    /// Invoice number, overriding the one found in the document
    #[arg(long)]
    invoice_number: Option<String>,

    /// Print processing counters to stderr
    #[arg(long)]
    show_report: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON with header, items and report
    Json,
    /// Spreadsheet rows as CSV
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

#[derive(Serialize)]
struct ProcessOutput<'a> {
    header: &'a SheetHeader,
    items: &'a [LineItem],
    report: &'a ProcessingReport,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }
    if !is_supported_input(&args.input) {
        anyhow::bail!("Unsupported file format: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Loading document...");

    let document = Document::from_file(&args.input)?;
    debug!("Document has {} pages", document.page_count());

    let mut header = SheetHeader::from_text(document.text(), args.vendor.clone());
    if let Some(number) = &args.invoice_number {
        header.invoice_number = number.clone();
    }

    pb.set_message("Extracting line items...");

    let processor = DocumentProcessor::new(config)?;
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    });

    let outcome = tokio::task::spawn_blocking(move || processor.process_with_cancel(&document, &cancel)).await?;

    pb.finish_and_clear();

    if outcome.report.timed_out {
        warn!("Time budget exhausted, results are partial");
    }
    if outcome.report.cancelled {
        warn!("Processing cancelled, results are partial");
    }

    let output = format_outcome(&outcome, &header, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!("{} Output written to {}", style("✓").green(), output_path.display());
    } else {
        print!("{}", output);
    }

    if args.show_report {
        print_report(&outcome.report);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

pub fn format_outcome(outcome: &ProcessingOutcome, header: &SheetHeader, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => {
            let output = ProcessOutput {
                header,
                items: &outcome.items,
                report: &outcome.report,
            };
            Ok(serde_json::to_string_pretty(&output)? + "\n")
        }
        OutputFormat::Csv => format_csv(&sheet_rows(&outcome.items, header)),
        OutputFormat::Text => Ok(format_text(outcome, header)),
    }
}

pub fn format_csv(rows: &[SheetRow]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(SheetRow::HEADERS)?;
    for row in rows {
        wtr.write_record(row.fields())?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(outcome: &ProcessingOutcome, header: &SheetHeader) -> String {
    let mut output = String::new();

    if !header.invoice_number.is_empty() {
        output.push_str(&format!("Invoice: {}\n", header.invoice_number));
    }
    if !header.vendor_name.is_empty() {
        output.push_str(&format!("Vendor: {}\n", header.vendor_name));
    }
    if let Some(date) = header.order_date {
        output.push_str(&format!("Order date: {}\n", date.format("%m/%d/%Y")));
    }
    output.push('\n');

    for row in sheet_rows(&outcome.items, header) {
        output.push_str(&format!("  {:>6} x {:>9}  {}\n", row.quantity, row.unit_price, row.description));
    }

    output.push_str(&format!("\n{} line items\n", outcome.items.len()));
    output
}

fn print_report(report: &ProcessingReport) {
    eprintln!();
    eprintln!(
        "{} {} pages in {} chunks ({} failed), {}ms",
        style("ℹ").blue(),
        report.pages,
        report.chunks,
        report.chunks_failed,
        report.processing_time_ms
    );
    eprintln!(
        "{} {} candidates, {} rejected, {} duplicates",
        style("ℹ").blue(),
        report.candidates,
        report.rejected,
        report.duplicates
    );
    for pattern in &report.placeholder_patterns {
        eprintln!(
            "{} placeholder pattern {} x {} on {} of {} items",
            style("!").yellow(),
            pattern.price,
            pattern.quantity,
            pattern.occurrences,
            pattern.total
        );
    }
}
