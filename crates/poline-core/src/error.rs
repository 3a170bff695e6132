//! Error types for the poline-core library.

use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the poline library.
#[derive(Error, Debug)]
pub enum PolineError {
    /// Document chunk could not be assembled.
    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    /// A configured regular expression failed to compile.
    #[error("invalid pattern '{name}': {source}")]
    Pattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while turning page spans into chunk text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// A page text span points outside the document text or splits a character.
    #[error("page {page} has invalid text span {start}..{end} (document length {len})")]
    InvalidSpan {
        page: usize,
        start: usize,
        end: usize,
        len: usize,
    },

    /// Page index beyond the document.
    #[error("page {0} does not exist")]
    MissingPage(usize),

    /// Every page of the chunk failed to load.
    #[error("chunk {chunk} has no readable pages")]
    NoReadablePages { chunk: usize },
}

/// Why a candidate was refused by the validator.
///
/// Rejections are expected outcomes, not failures: the candidate is dropped
/// and processing continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No price tier produced an acceptable value.
    #[error("no unit price found")]
    MissingPrice,

    /// No quantity tier produced an acceptable value.
    #[error("no quantity found")]
    MissingQuantity,

    /// Price outside the plausible range.
    #[error("price {price} outside [{min}, {max}]")]
    PriceOutOfRange {
        price: Decimal,
        min: Decimal,
        max: Decimal,
    },

    /// Price equals a known placeholder value and nothing justifies it.
    #[error("price {price} is a placeholder value")]
    PlaceholderPrice { price: Decimal },

    /// Quantity below zero.
    #[error("negative quantity {quantity}")]
    NegativeQuantity { quantity: i64 },

    /// Quantity above the product family ceiling (only when configured to reject).
    #[error("quantity {quantity} above family ceiling {ceiling}")]
    QuantityAboveCeiling { quantity: i64, ceiling: u32 },

    /// Quantity too large to represent.
    #[error("quantity {quantity} out of range")]
    QuantityOutOfRange { quantity: i64 },

    /// No meaningful description text near the code.
    #[error("no description found")]
    MissingDescription,

    /// Description equals a known fallback sentence.
    #[error("description is a fallback sentinel: {description}")]
    FallbackDescription { description: String },

    /// Description carries nothing beyond the product code.
    #[error("description has no content beyond the product code")]
    EmptyDescription,

    /// Description does not mention the product code.
    #[error("description does not contain the product code")]
    DescriptionMissingCode,

    /// The (price, quantity) pair was flagged as a document-wide placeholder pattern
    /// and no fallback tier produced a replacement.
    #[error("placeholder pattern {price} x {quantity}")]
    PlaceholderPattern { price: Decimal, quantity: u32 },
}

/// Result type for the poline library.
pub type Result<T> = std::result::Result<T, PolineError>;
