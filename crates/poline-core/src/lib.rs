//! Core library for purchase-order line-item extraction.
//!
//! This crate provides:
//! - Product code location for several code families at once
//! - Tiered price and quantity extraction (tabular, pattern, contextual)
//! - Description composition with UPC integration
//! - Business rule validation and document-wide placeholder detection
//! - A page-chunked processor with timeouts, cancellation and optional
//!   parallelism (`parallel` feature)

pub mod error;
pub mod invoice;
pub mod models;

pub use error::{ChunkError, PolineError, Rejection, Result};
pub use invoice::{
    DocumentProcessor, ExtractionObserver, ProcessingOutcome, ProcessingReport, ProcessorState, RecordingObserver,
    TracingObserver,
};
pub use invoice::rules::{extract_invoice_number, extract_order_date, PatternSet, ProductCodeLocator};
pub use models::config::PolineConfig;
pub use models::document::{Document, Entity, Page, TextSpan};
pub use models::line_item::{sheet_rows, LineItem, SheetHeader, SheetRow, SourceTier, ValidationFlag};
