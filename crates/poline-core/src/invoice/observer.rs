//! Observer interface for extraction diagnostics.
//!
//! The pipeline reports every tier attempt, rejection, state transition and
//! chunk failure through an [`ExtractionObserver`]. Diagnostics stay out of
//! the control flow: the default [`TracingObserver`] forwards events to
//! `tracing`, and [`RecordingObserver`] keeps them in memory for inspection.
//!
//! Implementations must be `Send + Sync`; with the `parallel` feature, chunk
//! events arrive from several threads at once.

use std::fmt;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::{ChunkError, Rejection};
use crate::invoice::validator::PlaceholderPattern;
use crate::models::line_item::SourceTier;

/// Field a tier cascade resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Price,
    Quantity,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Price => "price",
            Field::Quantity => "quantity",
        })
    }
}

/// Whether a tier produced an approved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierOutcome {
    Hit,
    Miss,
}

/// One tier invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierEvent {
    pub field: Field,
    pub tier: SourceTier,
    pub product_code: String,
    pub outcome: TierOutcome,
    pub value: Option<String>,
}

/// States of the page-chunked document processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorState {
    Idle,
    ChunkLoaded,
    Extracting,
    Validating,
    ChunkReleased,
    Aggregating,
    Done,
}

/// Receives pipeline diagnostics. All methods default to no-ops.
pub trait ExtractionObserver: Send + Sync {
    /// A tier was invoked for a product code.
    fn on_tier(&self, event: &TierEvent) {
        let _ = event;
    }

    /// A candidate was dropped.
    fn on_rejection(&self, product_code: &str, rejection: &Rejection) {
        let _ = (product_code, rejection);
    }

    /// The processor moved to `state`; `chunk` is set inside the chunk loop.
    fn on_state(&self, chunk: Option<usize>, state: ProcessorState) {
        let _ = (chunk, state);
    }

    /// A page or chunk could not be loaded and was skipped.
    fn on_chunk_error(&self, chunk: usize, error: &ChunkError) {
        let _ = (chunk, error);
    }

    /// A document-wide placeholder pattern was detected.
    fn on_placeholder_pattern(&self, pattern: &PlaceholderPattern) {
        let _ = pattern;
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ExtractionObserver for NoopObserver {}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ExtractionObserver for TracingObserver {
    fn on_tier(&self, event: &TierEvent) {
        debug!(
            code = %event.product_code,
            field = %event.field,
            tier = %event.tier,
            outcome = ?event.outcome,
            value = event.value.as_deref().unwrap_or(""),
            "tier attempt"
        );
    }

    fn on_rejection(&self, product_code: &str, rejection: &Rejection) {
        debug!(code = %product_code, reason = %rejection, "candidate rejected");
    }

    fn on_state(&self, chunk: Option<usize>, state: ProcessorState) {
        trace!(chunk = ?chunk, state = ?state, "processor state");
    }

    fn on_chunk_error(&self, chunk: usize, error: &ChunkError) {
        warn!(chunk, error = %error, "skipping unreadable page data");
    }

    fn on_placeholder_pattern(&self, pattern: &PlaceholderPattern) {
        warn!(
            price = %pattern.price,
            quantity = pattern.quantity,
            occurrences = pattern.occurrences,
            total = pattern.total,
            reason = ?pattern.reason,
            "placeholder pattern detected"
        );
    }
}

/// Any event the recording observer captured.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    Tier(TierEvent),
    Rejection { product_code: String, rejection: Rejection },
    State { chunk: Option<usize>, state: ProcessorState },
    ChunkError { chunk: usize, error: ChunkError },
    Placeholder(PlaceholderPattern),
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: ObservedEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// Snapshot of all events.
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Tiers invoked for `code` and `field`, in order.
    pub fn tiers_invoked(&self, code: &str, field: Field) -> Vec<SourceTier> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ObservedEvent::Tier(t) if t.product_code == code && t.field == field => Some(t.tier),
                _ => None,
            })
            .collect()
    }

    /// Rejections, in order.
    pub fn rejections(&self) -> Vec<(String, Rejection)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ObservedEvent::Rejection {
                    product_code,
                    rejection,
                } => Some((product_code, rejection)),
                _ => None,
            })
            .collect()
    }

    /// State transitions, in order.
    pub fn states(&self) -> Vec<ProcessorState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ObservedEvent::State { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }

    /// Detected placeholder patterns.
    pub fn placeholder_patterns(&self) -> Vec<PlaceholderPattern> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ObservedEvent::Placeholder(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

impl ExtractionObserver for RecordingObserver {
    fn on_tier(&self, event: &TierEvent) {
        self.push(ObservedEvent::Tier(event.clone()));
    }

    fn on_rejection(&self, product_code: &str, rejection: &Rejection) {
        self.push(ObservedEvent::Rejection {
            product_code: product_code.to_string(),
            rejection: rejection.clone(),
        });
    }

    fn on_state(&self, chunk: Option<usize>, state: ProcessorState) {
        self.push(ObservedEvent::State { chunk, state });
    }

    fn on_chunk_error(&self, chunk: usize, error: &ChunkError) {
        self.push(ObservedEvent::ChunkError {
            chunk,
            error: error.clone(),
        });
    }

    fn on_placeholder_pattern(&self, pattern: &PlaceholderPattern) {
        self.push(ObservedEvent::Placeholder(pattern.clone()));
    }
}
