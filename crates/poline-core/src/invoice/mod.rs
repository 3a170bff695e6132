//! Line-item extraction: rules, validation and the chunked document processor.

pub mod chunk;
pub mod observer;
pub mod processor;
pub mod rules;
pub mod validator;

pub use chunk::{plan_chunks, DocumentChunk};
pub use observer::{
    ExtractionObserver, Field, NoopObserver, ObservedEvent, ProcessorState, RecordingObserver, TierEvent, TierOutcome,
    TracingObserver,
};
pub use processor::{DocumentProcessor, ExtractionCandidate, ProcessingOutcome, ProcessingReport};
pub use validator::{DraftItem, PatternReason, PlaceholderPattern, Validator};
