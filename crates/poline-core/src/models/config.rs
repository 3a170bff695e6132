//! Configuration structures for the extraction pipeline.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PolineError, Result};

/// Currency value with two fractional digits, with or without thousands separators.
const AMOUNT: &str = r"\d{1,3}(?:,\d{3})+\.\d{2}|\d+\.\d{2}";

/// Main configuration for the poline pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolineConfig {
    /// Code location and tier extraction settings.
    pub extraction: ExtractionConfig,

    /// Business rules applied before a candidate becomes a line item.
    pub validation: ValidationConfig,

    /// Chunking, timeout and parallelism.
    pub processing: ProcessingConfig,
}

impl PolineConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.extraction.code_families.is_empty() {
            return Err(PolineError::Config(
                "at least one product code family is required".to_string(),
            ));
        }
        if self.validation.min_price > self.validation.max_price {
            return Err(PolineError::Config(format!(
                "min_price {} exceeds max_price {}",
                self.validation.min_price, self.validation.max_price
            )));
        }
        if !(0.0..=1.0).contains(&self.validation.placeholder_share) {
            return Err(PolineError::Config(format!(
                "placeholder_share must be within 0..=1, got {}",
                self.validation.placeholder_share
            )));
        }
        let p = &self.processing;
        if p.medium_chunk_pages == 0 || p.large_chunk_pages == 0 || p.huge_chunk_pages == 0 {
            return Err(PolineError::Config("chunk sizes must be at least one page".to_string()));
        }
        Ok(())
    }
}

/// One product-code grammar, e.g. the "D" four-digit family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFamily {
    /// Family name used in logs.
    pub name: String,
    /// Regular expression matching a whole code.
    pub pattern: String,
}

impl CodeFamily {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }
}

/// Code location and tier extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Product code grammars. Earlier families win overlapping matches.
    pub code_families: Vec<CodeFamily>,

    /// Characters after a code searched by the pattern tier.
    pub pattern_window: usize,

    /// Characters on each side of a code searched by the contextual tier.
    pub contextual_window: usize,

    /// Lowest price the contextual tier accepts.
    pub contextual_price_min: Decimal,

    /// Highest price the contextual tier accepts.
    pub contextual_price_max: Decimal,

    /// Pattern-tier price expressions; each needs a `price` capture group.
    pub price_patterns: Vec<String>,

    /// Pattern-tier quantity expressions; each needs a `qty` capture group.
    pub quantity_patterns: Vec<String>,

    /// Contextual-tier quantity expressions; each needs a `qty` capture group.
    pub quantity_context_patterns: Vec<String>,

    /// Header fragments that mark a line-item table header.
    pub header_markers: Vec<String>,

    /// Unit-of-measure tokens separating quantity and price columns.
    pub units: Vec<String>,

    /// Lines after a standalone code line scanned for a description.
    pub description_scan_lines: usize,

    /// Minimum alphabetic characters for description text to count.
    pub min_description_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            code_families: vec![
                CodeFamily::new("d-code", r"\bD[A-Z]\d{4}[A-Z]?\b"),
                CodeFamily::new("xs-code", r"\bXS\d{3,6}[A-Z]?\b"),
            ],
            pattern_window: 200,
            contextual_window: 250,
            contextual_price_min: Decimal::new(1, 2),
            contextual_price_max: Decimal::new(100_000, 2),
            price_patterns: vec![
                format!(r"(?i)\bwholesale(?:\s+price)?\s*[:\-]?\s*\$?\s*(?P<price>{AMOUNT})"),
                format!(r"(?i)\byour\s+price\s*[:\-]?\s*\$?\s*(?P<price>{AMOUNT})"),
                format!(r"(?i)\$\s*(?P<price>{AMOUNT})\s*(?:each|ea\b|/\s*ea\b)"),
                format!(r"(?i)\b(?:unit\s+)?price\s*[:\-]\s*\$?\s*(?P<price>{AMOUNT})"),
            ],
            quantity_patterns: vec![
                r"(?i)\b(?:qty|quantity)(?:\s+shipped)?\s*[:\-]?\s*(?P<qty>-?\d{1,5})\b".to_string(),
                r"(?i)\bshipped\s*[:\-]\s*(?P<qty>-?\d{1,5})\b".to_string(),
            ],
            quantity_context_patterns: vec![
                r"(?i)(?:^|[^\d.,$])(?P<qty>\d{1,5})\s*(?:each|ea|pcs|pieces|units)\b".to_string(),
            ],
            header_markers: vec![
                "your price".to_string(),
                "list price".to_string(),
                "unit price".to_string(),
                "net price".to_string(),
            ],
            units: ["each", "ea", "set", "pc", "pcs", "dz", "doz", "pk", "pack", "cs", "case", "bx", "box", "pr", "pair", "ct"]
                .iter()
                .map(|u| u.to_string())
                .collect(),
            description_scan_lines: 3,
            min_description_chars: 5,
        }
    }
}

/// Expected quantity behaviour for codes sharing a two-letter prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyRule {
    /// Two-letter code prefix, or `*` for the fallback rule.
    pub prefix: String,
    /// Upper end of the usual order range.
    pub typical_max: u32,
    /// Items per case; quantities are normally a multiple of it.
    pub case_pack: u32,
    /// Quantities above this are flagged.
    pub ceiling: u32,
}

impl FamilyRule {
    pub fn new(prefix: impl Into<String>, typical_max: u32, case_pack: u32, ceiling: u32) -> Self {
        Self {
            prefix: prefix.into(),
            typical_max,
            case_pack,
            ceiling,
        }
    }
}

/// A (price, quantity) pair known to be produced by naive fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderPair {
    pub price: Decimal,
    pub quantity: u32,
}

/// Business rule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Lowest acceptable unit price.
    pub min_price: Decimal,

    /// Highest acceptable unit price.
    pub max_price: Decimal,

    /// Prices that are placeholders unless discount context is present.
    pub placeholder_prices: Vec<Decimal>,

    /// Pairs that may appear at most once per document.
    pub placeholder_pairs: Vec<PlaceholderPair>,

    /// Keywords that justify an otherwise suspicious price (case-insensitive).
    pub discount_keywords: Vec<String>,

    /// Descriptions produced by naive fallbacks (case-insensitive).
    pub fallback_descriptions: Vec<String>,

    /// Per-family quantity rules keyed by two-letter prefix.
    pub families: Vec<FamilyRule>,

    /// Rule for codes whose prefix has no entry in `families`.
    pub default_family: FamilyRule,

    /// Reject, rather than flag, quantities above the family ceiling.
    pub reject_above_ceiling: bool,

    /// Share of candidates one pair must exceed to count as a placeholder pattern.
    pub placeholder_share: f64,

    /// Fewest candidates for which the distribution check runs.
    pub placeholder_min_items: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_price: Decimal::new(10, 2),
            max_price: Decimal::new(1000, 0),
            placeholder_prices: vec![Decimal::new(12345, 2), Decimal::new(99999, 2)],
            placeholder_pairs: vec![PlaceholderPair {
                price: Decimal::new(160, 2),
                quantity: 24,
            }],
            discount_keywords: [
                "volume discount",
                "% off",
                "percent off",
                "special pricing",
                "promotional",
                "closeout",
                "clearance",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
            fallback_descriptions: [
                "Traditional D-code format item",
                "Product description not available",
                "Item description unavailable",
                "Description not found",
            ]
            .iter()
            .map(|d| d.to_string())
            .collect(),
            families: vec![
                FamilyRule::new("XS", 96, 6, 576),
                FamilyRule::new("DA", 48, 4, 288),
                FamilyRule::new("DF", 72, 6, 432),
                FamilyRule::new("DG", 72, 6, 432),
                FamilyRule::new("DH", 48, 4, 288),
            ],
            default_family: FamilyRule::new("*", 144, 1, 1000),
            reject_above_ceiling: false,
            placeholder_share: 0.75,
            placeholder_min_items: 4,
        }
    }
}

/// Chunking, timeout and parallelism configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Documents up to this many pages are processed as one chunk.
    pub single_chunk_max_pages: usize,

    /// Documents up to this many pages use `medium_chunk_pages`.
    pub medium_document_max_pages: usize,
    pub medium_chunk_pages: usize,

    /// Documents up to this many pages use `large_chunk_pages`.
    pub large_document_max_pages: usize,
    pub large_chunk_pages: usize,

    /// Chunk size for anything larger.
    pub huge_chunk_pages: usize,

    /// Leading bytes of the next page appended to each chunk.
    pub page_overlap_chars: usize,

    /// Budget for one document in milliseconds (`None` = unlimited).
    pub timeout_ms: Option<u64>,

    /// Process chunks in parallel when the `parallel` feature is enabled.
    pub parallel: bool,

    /// Minimum page count before chunks run in parallel.
    pub parallel_page_threshold: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            single_chunk_max_pages: 5,
            medium_document_max_pages: 20,
            medium_chunk_pages: 5,
            large_document_max_pages: 50,
            large_chunk_pages: 3,
            huge_chunk_pages: 1,
            page_overlap_chars: 200,
            timeout_ms: Some(60_000),
            parallel: true,
            parallel_page_threshold: 10,
        }
    }
}

impl ProcessingConfig {
    /// Pages per chunk for a document of `page_count` pages.
    pub fn chunk_size(&self, page_count: usize) -> usize {
        if page_count <= self.single_chunk_max_pages {
            page_count.max(1)
        } else if page_count <= self.medium_document_max_pages {
            self.medium_chunk_pages
        } else if page_count <= self.large_document_max_pages {
            self.large_chunk_pages
        } else {
            self.huge_chunk_pages
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size_adapts_to_page_count() {
        let config = ProcessingConfig::default();
        assert_eq!(config.chunk_size(1), 1);
        assert_eq!(config.chunk_size(5), 5);
        assert_eq!(config.chunk_size(6), 5);
        assert_eq!(config.chunk_size(20), 5);
        assert_eq!(config.chunk_size(21), 3);
        assert_eq!(config.chunk_size(50), 3);
        assert_eq!(config.chunk_size(51), 1);
    }

    #[test]
    fn test_default_config_is_valid() {
        PolineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_inverted_price_range() {
        let mut config = PolineConfig::default();
        config.validation.min_price = Decimal::new(2000, 0);
        assert!(matches!(config.validate(), Err(PolineError::Config(_))));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = PolineConfig::default();
        config.processing.timeout_ms = None;
        config.validation.families.push(FamilyRule::new("DW", 24, 2, 120));
        config.save(&path).unwrap();

        let loaded = PolineConfig::from_file(&path).unwrap();
        assert_eq!(loaded.processing.timeout_ms, None);
        assert_eq!(loaded.validation.families.last().unwrap().prefix, "DW");
        assert_eq!(loaded.validation.placeholder_pairs[0].price, Decimal::new(160, 2));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: PolineConfig =
            serde_json::from_str(r#"{"processing": {"timeout_ms": 500}}"#).unwrap();
        assert_eq!(config.processing.timeout_ms, Some(500));
        assert_eq!(config.processing.single_chunk_max_pages, 5);
        assert_eq!(config.extraction.code_families.len(), 2);
    }
}
