//! Page-chunked document processor.
//!
//! Pages are grouped into chunks sized by document length. Each chunk goes
//! through `ChunkLoaded -> Extracting -> Validating -> ChunkReleased`; once
//! every chunk is done (or the budget runs out) the accepted items are
//! checked for document-wide placeholder patterns in `Aggregating`.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ChunkError, Rejection, Result};
use crate::invoice::chunk::{plan_chunks, DocumentChunk};
use crate::invoice::observer::{ExtractionObserver, ProcessorState, TracingObserver};
use crate::invoice::rules::{
    line_bounds, price_cascade, quantity_cascade, CodeContext, ColumnLayout, DescriptionComposer, ExtractionMatch,
    FieldExtractor, PatternSet, ProductCodeLocator, TierCascade,
};
use crate::invoice::validator::{DraftItem, PlaceholderPattern, Validator};
use crate::models::config::PolineConfig;
use crate::models::document::Document;
use crate::models::line_item::{LineItem, SourceTier};

/// A located product code and the text it was found in, before the cascades run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionCandidate {
    pub product_code: String,
    /// Lines around the first occurrence of the code.
    pub window: String,
    pub chunk: usize,
    /// Whether an upstream line-item entity mentions the code.
    pub confirmed: bool,
}

/// Counters and diagnostics for one processed document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingReport {
    pub pages: usize,
    pub chunks: usize,
    pub chunks_processed: usize,
    pub chunks_failed: usize,
    pub pages_failed: usize,
    /// Located codes, counting a code once per chunk.
    pub candidates: usize,
    pub rejected: usize,
    /// Candidates dropped because an earlier chunk already produced the code.
    pub duplicates: usize,
    pub placeholder_patterns: Vec<PlaceholderPattern>,
    /// Accepted items whose code an upstream entity also mentions.
    pub entity_confirmed: usize,
    pub timed_out: bool,
    pub cancelled: bool,
    pub processing_time_ms: u64,
}

/// Line items of a document and how they were obtained.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingOutcome {
    pub items: Vec<LineItem>,
    pub report: ProcessingReport,
}

/// A validated item with what is needed to re-extract it.
#[derive(Debug, Clone)]
struct Accepted {
    item: LineItem,
    candidate: ExtractionCandidate,
    price_tier: SourceTier,
    quantity_tier: SourceTier,
}

#[derive(Debug, Default)]
struct ChunkResult {
    accepted: Vec<Accepted>,
    candidates: usize,
    rejected: usize,
    known: usize,
    failed_pages: Vec<ChunkError>,
    discount_context: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Timeout,
    Cancelled,
}

#[derive(Debug)]
enum ChunkRun {
    Done(ChunkResult),
    Failed(ChunkError),
    Skipped(StopReason),
}

/// Extracts validated line items from multi-page documents.
pub struct DocumentProcessor {
    config: PolineConfig,
    patterns: Arc<PatternSet>,
    locator: ProductCodeLocator,
    prices: TierCascade<Decimal>,
    quantities: TierCascade<i64>,
    descriptions: DescriptionComposer,
    validator: Validator,
    observer: Arc<dyn ExtractionObserver>,
}

impl DocumentProcessor {
    /// Create a processor, compiling and validating every configured pattern.
    pub fn new(config: PolineConfig) -> Result<Self> {
        Self::with_observer(config, Arc::new(TracingObserver))
    }

    /// Create a processor that reports diagnostics to `observer`.
    pub fn with_observer(config: PolineConfig, observer: Arc<dyn ExtractionObserver>) -> Result<Self> {
        config.validate()?;
        let patterns = Arc::new(PatternSet::compile(&config)?);

        Ok(Self {
            locator: ProductCodeLocator::new(patterns.clone()),
            prices: price_cascade(patterns.clone(), &config.extraction, observer.clone()),
            quantities: quantity_cascade(patterns.clone(), &config.extraction, observer.clone()),
            descriptions: DescriptionComposer::new(patterns.clone(), &config.extraction),
            validator: Validator::new(&config.validation, patterns.clone()),
            patterns,
            observer,
            config,
        })
    }

    pub fn config(&self) -> &PolineConfig {
        &self.config
    }

    /// Process a document with no external cancellation.
    pub fn process(&self, document: &Document) -> ProcessingOutcome {
        self.process_with_cancel(document, &AtomicBool::new(false))
    }

    /// Process plain text, splitting pages on form feeds.
    pub fn process_text(&self, text: &str) -> ProcessingOutcome {
        self.process(&Document::from_form_feed(text))
    }

    /// Process a document, stopping between chunks once `cancel` is set or the
    /// time budget is spent. Work completed before the stop is kept.
    pub fn process_with_cancel(&self, document: &Document, cancel: &AtomicBool) -> ProcessingOutcome {
        let started = Instant::now();
        let page_count = document.page_count();
        let plan = plan_chunks(page_count, &self.config.processing);

        let mut report = ProcessingReport {
            pages: page_count,
            chunks: plan.len(),
            ..Default::default()
        };

        self.observer.on_state(None, ProcessorState::Idle);
        info!("Processing document: {} pages in {} chunks", page_count, plan.len());

        let confirmed = self.locator.confirmed_codes(document.line_item_mentions());

        let mut accepted: Vec<Accepted> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut discount_context = false;

        for (index, run) in self.run_chunks(document, &plan, started, cancel).into_iter().enumerate() {
            match run {
                ChunkRun::Done(result) => {
                    report.chunks_processed += 1;
                    report.candidates += result.candidates;
                    report.rejected += result.rejected;
                    report.duplicates += result.known;
                    report.pages_failed += result.failed_pages.len();
                    discount_context |= result.discount_context;

                    for error in &result.failed_pages {
                        self.observer.on_chunk_error(index, error);
                    }

                    for mut entry in result.accepted {
                        if seen.insert(entry.item.product_code.clone()) {
                            entry.candidate.confirmed = confirmed.contains(&entry.item.product_code);
                            accepted.push(entry);
                        } else {
                            report.duplicates += 1;
                        }
                    }
                }
                ChunkRun::Failed(error) => {
                    report.chunks_failed += 1;
                    report.pages_failed += plan.get(index).map_or(0, |pages| pages.len());
                    self.observer.on_chunk_error(index, &error);
                }
                ChunkRun::Skipped(StopReason::Timeout) => report.timed_out = true,
                ChunkRun::Skipped(StopReason::Cancelled) => report.cancelled = true,
            }
        }

        if report.timed_out {
            warn!(
                "Timeout after {} of {} chunks; returning partial results",
                report.chunks_processed + report.chunks_failed,
                report.chunks
            );
        }

        self.observer.on_state(None, ProcessorState::Aggregating);
        let items = self.aggregate(accepted, discount_context, &mut report);

        for code in &confirmed {
            if !items.iter().any(|item| &item.product_code == code) {
                debug!(code = %code, "entity hint without an accepted line item");
            }
        }
        report.entity_confirmed = items.iter().filter(|item| confirmed.contains(&item.product_code)).count();
        report.processing_time_ms = started.elapsed().as_millis() as u64;

        self.observer.on_state(None, ProcessorState::Done);
        info!(
            "Extracted {} line items ({} candidates, {} rejected, {} duplicates) in {}ms",
            items.len(),
            report.candidates,
            report.rejected,
            report.duplicates,
            report.processing_time_ms
        );

        ProcessingOutcome { items, report }
    }

    fn stop_reason(&self, started: Instant, cancel: &AtomicBool) -> Option<StopReason> {
        if cancel.load(Ordering::SeqCst) {
            return Some(StopReason::Cancelled);
        }
        let budget = self.config.processing.timeout_ms.map(Duration::from_millis)?;
        (started.elapsed() >= budget).then_some(StopReason::Timeout)
    }

    #[cfg(feature = "parallel")]
    fn run_chunks(&self, document: &Document, plan: &[Range<usize>], started: Instant, cancel: &AtomicBool) -> Vec<ChunkRun> {
        use rayon::prelude::*;

        let processing = &self.config.processing;
        if !processing.parallel || document.page_count() <= processing.parallel_page_threshold {
            return self.run_sequential(document, plan, started, cancel);
        }

        debug!("Processing {} chunks in parallel", plan.len());
        let known = HashSet::new();
        plan.par_iter()
            .enumerate()
            .map(|(index, pages)| match self.stop_reason(started, cancel) {
                Some(reason) => ChunkRun::Skipped(reason),
                None => self.run_chunk(document, index, pages.clone(), &known),
            })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn run_chunks(&self, document: &Document, plan: &[Range<usize>], started: Instant, cancel: &AtomicBool) -> Vec<ChunkRun> {
        self.run_sequential(document, plan, started, cancel)
    }

    fn run_sequential(&self, document: &Document, plan: &[Range<usize>], started: Instant, cancel: &AtomicBool) -> Vec<ChunkRun> {
        let mut known: HashSet<String> = HashSet::new();
        let mut runs = Vec::with_capacity(plan.len());

        for (index, pages) in plan.iter().enumerate() {
            if let Some(reason) = self.stop_reason(started, cancel) {
                runs.push(ChunkRun::Skipped(reason));
                break;
            }

            let run = self.run_chunk(document, index, pages.clone(), &known);
            if let ChunkRun::Done(result) = &run {
                known.extend(result.accepted.iter().map(|a| a.item.product_code.clone()));
            }
            runs.push(run);
        }

        runs
    }

    /// Load, extract and validate one chunk. Codes in `known` are skipped.
    fn run_chunk(&self, document: &Document, index: usize, pages: Range<usize>, known: &HashSet<String>) -> ChunkRun {
        let overlap = self.config.processing.page_overlap_chars;
        let mut chunk = match DocumentChunk::load(document, index, pages, overlap) {
            Ok(chunk) => chunk,
            Err(error) => return ChunkRun::Failed(error),
        };
        self.observer.on_state(Some(index), ProcessorState::ChunkLoaded);
        debug!(chunk = index, pages = ?chunk.pages, "chunk loaded");

        self.observer.on_state(Some(index), ProcessorState::Extracting);
        let mut result = ChunkResult {
            discount_context: self.patterns.has_discount_context(chunk.text()),
            failed_pages: std::mem::take(&mut chunk.failed_pages),
            ..Default::default()
        };

        let text = chunk.text();
        let layout = ColumnLayout::detect(text, &self.patterns);
        let spans = self.code_spans(text);
        let mut drafts = Vec::new();

        for located in self.locator.extract_all(text) {
            result.candidates += 1;
            if known.contains(&located.code) {
                result.known += 1;
                continue;
            }

            let candidate = ExtractionCandidate {
                window: self.candidate_window(text, located.start, located.end),
                product_code: located.code,
                chunk: index,
                confirmed: false,
            };
            let draft = {
                let ctx = CodeContext::new(text, &candidate.product_code, layout.as_ref()).bounded_by(spans.iter().cloned());
                self.draft(&ctx, &candidate)
            };
            drafts.push((candidate, draft));
        }

        self.observer.on_state(Some(index), ProcessorState::Validating);
        for (candidate, draft) in drafts {
            let tiers = draft.price.as_ref().map(|m| m.tier).zip(draft.quantity.as_ref().map(|m| m.tier));
            match self.validator.validate(draft) {
                Ok(item) => {
                    let (price_tier, quantity_tier) = tiers.unwrap_or((item.source_tier, item.source_tier));
                    result.accepted.push(Accepted {
                        item,
                        candidate,
                        price_tier,
                        quantity_tier,
                    });
                }
                Err(rejection) => {
                    result.rejected += 1;
                    self.observer.on_rejection(&candidate.product_code, &rejection);
                }
            }
        }

        chunk.release();
        self.observer.on_state(Some(index), ProcessorState::ChunkReleased);
        ChunkRun::Done(result)
    }

    /// Run both cascades and the composer for one code.
    fn draft(&self, ctx: &CodeContext<'_>, candidate: &ExtractionCandidate) -> DraftItem {
        let code = candidate.product_code.as_str();
        let window = candidate.window.as_str();

        let price = self
            .prices
            .run(ctx, &|p: &Decimal| self.validator.price_acceptable(p, window));
        // A negative quantity ends the cascade; the validator rejects it.
        let quantity = self
            .quantities
            .run(ctx, &|q: &i64| *q < 0 || self.validator.quantity_acceptable(code, q));
        let composed = self.descriptions.compose(ctx);

        DraftItem {
            product_code: code.to_string(),
            description: composed.render(code),
            upc: composed.upc,
            price,
            quantity,
            window: window.to_string(),
        }
    }

    /// Byte spans of every located code in `text`.
    fn code_spans(&self, text: &str) -> Vec<Range<usize>> {
        self.locator.locate_all(text).into_iter().map(|m| m.start..m.end).collect()
    }

    /// Lines within the contextual window around a code occurrence.
    fn candidate_window(&self, text: &str, start: usize, end: usize) -> String {
        let width = self.config.extraction.contextual_window;
        let from = line_bounds(text, start.saturating_sub(width)).start;
        let to = line_bounds(text, end.saturating_add(width).min(text.len())).end;
        text[from..to].to_string()
    }

    /// Apply document-wide placeholder detection to the accepted items.
    ///
    /// Flagged items are re-extracted once; the result is checked again and
    /// items still matching a pattern are dropped.
    fn aggregate(&self, accepted: Vec<Accepted>, discount_context: bool, report: &mut ProcessingReport) -> Vec<LineItem> {
        let pairs: Vec<(Decimal, u32)> = accepted.iter().map(|a| a.item.pair()).collect();
        let mut patterns = self.validator.detect_placeholder_patterns(&pairs, discount_context);

        for pattern in &patterns {
            self.observer.on_placeholder_pattern(pattern);
        }

        let mut items = Vec::with_capacity(accepted.len());
        for entry in accepted {
            let pair = entry.item.pair();
            match patterns.iter().find(|p| p.matches(pair)) {
                None => items.push(entry.item),
                Some(pattern) => match self.re_extract(&entry, pattern) {
                    Ok(item) => {
                        debug!(code = %item.product_code, price = %item.unit_price, quantity = item.quantity, "re-extracted");
                        items.push(item);
                    }
                    Err(rejection) => {
                        report.rejected += 1;
                        self.observer.on_rejection(&entry.item.product_code, &rejection);
                    }
                },
            }
        }

        if !patterns.is_empty() {
            let pairs: Vec<(Decimal, u32)> = items.iter().map(LineItem::pair).collect();
            let residual = self.validator.detect_placeholder_patterns(&pairs, discount_context);

            if !residual.is_empty() {
                items.retain(|item| {
                    let Some(pattern) = residual.iter().find(|p| p.matches(item.pair())) else {
                        return true;
                    };
                    report.rejected += 1;
                    self.observer.on_rejection(
                        &item.product_code,
                        &Rejection::PlaceholderPattern {
                            price: pattern.price,
                            quantity: pattern.quantity,
                        },
                    );
                    false
                });

                for pattern in residual {
                    if !patterns.iter().any(|p| p.price == pattern.price && p.quantity == pattern.quantity) {
                        self.observer.on_placeholder_pattern(&pattern);
                        patterns.push(pattern);
                    }
                }
            }
        }

        report.placeholder_patterns = patterns;
        items
    }

    /// Re-run the cascades after the tiers that produced a flagged pair.
    ///
    /// A new price is required; the quantity is replaced when a later tier
    /// finds a different one and kept otherwise.
    fn re_extract(&self, entry: &Accepted, pattern: &PlaceholderPattern) -> std::result::Result<LineItem, Rejection> {
        let flagged = Rejection::PlaceholderPattern {
            price: pattern.price,
            quantity: pattern.quantity,
        };

        let code = entry.candidate.product_code.as_str();
        let window = entry.candidate.window.as_str();
        let layout = ColumnLayout::detect(window, &self.patterns);
        let ctx = CodeContext::new(window, code, layout.as_ref()).bounded_by(self.code_spans(window));

        let price = entry
            .price_tier
            .next()
            .and_then(|from| {
                self.prices.run_from(from, &ctx, &|p: &Decimal| {
                    *p != pattern.price && self.validator.price_acceptable(p, window)
                })
            })
            .ok_or(flagged)?;

        let flagged_quantity = i64::from(pattern.quantity);
        let quantity = entry
            .quantity_tier
            .next()
            .and_then(|from| {
                self.quantities.run_from(from, &ctx, &|q: &i64| {
                    *q != flagged_quantity && self.validator.quantity_acceptable(code, q)
                })
            })
            .unwrap_or_else(|| {
                ExtractionMatch::new(
                    i64::from(entry.item.quantity),
                    entry.quantity_tier,
                    entry.item.quantity.to_string(),
                )
            });

        self.validator.validate(DraftItem {
            product_code: code.to_string(),
            upc: entry.item.upc.clone(),
            description: Some(entry.item.description.clone()),
            price: Some(price),
            quantity: Some(quantity),
            window: window.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::observer::RecordingObserver;
    use pretty_assertions::assert_eq;

    fn processor() -> (DocumentProcessor, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::new());
        let processor = DocumentProcessor::with_observer(PolineConfig::default(), observer.clone()).unwrap();
        (processor, observer)
    }

    #[test]
    fn test_single_row_document() {
        let (processor, _) = processor();
        let text = "Invoice # CS003837319\n\
                    Item | UPC | Description | Ord | Alloc | Ship | BkOrd | U/M | List Price | Your Price | Amount\n\
                    XS9826A | 191009727774 | 6\"H Metal Ballerina Ornament | 24 | 0 | 0 | 24 | each | 2.00 | 1.60 | 38.40";

        let outcome = processor.process_text(text);
        assert_eq!(outcome.items.len(), 1);

        let item = &outcome.items[0];
        assert_eq!(item.product_code, "XS9826A");
        assert_eq!(item.upc.as_deref(), Some("191009727774"));
        assert_eq!(item.unit_price, Decimal::new(160, 2));
        assert_eq!(item.quantity, 24);
        assert_eq!(item.source_tier, SourceTier::Tabular);
        assert!(item.description.contains("Metal Ballerina Ornament"));
    }

    #[test]
    fn test_state_sequence() {
        let (processor, observer) = processor();
        processor.process_text("DF6802 Stoneware Vase 12 each 6.80");

        assert_eq!(
            observer.states(),
            vec![
                ProcessorState::Idle,
                ProcessorState::ChunkLoaded,
                ProcessorState::Extracting,
                ProcessorState::Validating,
                ProcessorState::ChunkReleased,
                ProcessorState::Aggregating,
                ProcessorState::Done,
            ]
        );
    }

    #[test]
    fn test_missing_description_is_rejected() {
        let (processor, observer) = processor();
        let outcome = processor.process_text("XS1001 24 1.60");

        assert!(outcome.items.is_empty());
        assert_eq!(outcome.report.rejected, 1);
        assert_eq!(
            observer.rejections(),
            vec![("XS1001".to_string(), Rejection::MissingDescription)]
        );
    }

    #[test]
    fn test_candidate_window_is_whole_lines() {
        let (processor, _) = processor();
        let text = "aaaa\nbbbb XS1001 cccc\ndddd";
        let window = processor.candidate_window(text, 10, 16);
        assert_eq!(window, text);

        let mut config = PolineConfig::default();
        config.extraction.contextual_window = 2;
        let narrow = DocumentProcessor::new(config).unwrap();
        assert_eq!(narrow.candidate_window(text, 10, 16), "bbbb XS1001 cccc");
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let mut config = PolineConfig::default();
        config.extraction.price_patterns = vec!["(".to_string()];
        assert!(DocumentProcessor::new(config).is_err());
    }

    #[test]
    fn test_empty_document() {
        let (processor, observer) = processor();
        let outcome = processor.process(&Document::default());
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.report.chunks, 0);
        assert_eq!(
            observer.states(),
            vec![ProcessorState::Idle, ProcessorState::Aggregating, ProcessorState::Done]
        );
    }
}
