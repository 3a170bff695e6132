//! Rule-based extractors for invoice line items.

pub mod amounts;
pub mod description;
pub mod header;
pub mod locator;
pub mod patterns;
pub mod price;
pub mod quantity;
pub mod table;

pub use amounts::{format_currency, parse_currency, AmountExtractor};
pub use description::{ComposedDescription, DescriptionComposer};
pub use header::{extract_invoice_number, extract_order_date, DateExtractor};
pub use locator::{CodeMatch, ProductCodeLocator};
pub use patterns::PatternSet;
pub use price::price_cascade;
pub use quantity::{quantity_cascade, QuantityColumns};
pub use table::{ColumnKind, ColumnLayout, TableRow};

use std::ops::Range;
use std::sync::Arc;

use crate::invoice::observer::{ExtractionObserver, Field, TierEvent, TierOutcome};
use crate::models::line_item::SourceTier;

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// An extracted value with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionMatch<T> {
    /// Extracted value.
    pub value: T,
    /// Tier that produced the value.
    pub tier: SourceTier,
    /// Position in source text.
    pub position: Option<(usize, usize)>,
    /// Source text that was matched.
    pub source: String,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, tier: SourceTier, source: impl Into<String>) -> Self {
        Self {
            value,
            tier,
            position: None,
            source: source.into(),
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }
}

/// A product code and where it occurs in the text being searched.
#[derive(Debug, Clone)]
pub struct CodeContext<'a> {
    pub text: &'a str,
    pub code: &'a str,
    /// Byte ranges of standalone occurrences of `code`.
    pub occurrences: Vec<Range<usize>>,
    /// Table header layout detected in `text`, if any.
    pub layout: Option<&'a ColumnLayout>,
    /// Spans of other product codes, sorted by start. Search windows stop at
    /// their lines.
    neighbours: Vec<Range<usize>>,
}

impl<'a> CodeContext<'a> {
    pub fn new(text: &'a str, code: &'a str, layout: Option<&'a ColumnLayout>) -> Self {
        Self {
            text,
            code,
            occurrences: find_code_occurrences(text, code),
            layout,
            neighbours: Vec::new(),
        }
    }

    /// Limit `after` and `before` windows to the text between this code and
    /// the nearest other located codes.
    pub fn bounded_by(mut self, codes: impl IntoIterator<Item = Range<usize>>) -> Self {
        let occurrences = &self.occurrences;
        let mut neighbours: Vec<Range<usize>> = codes
            .into_iter()
            .filter(|span| !occurrences.iter().any(|o| span.start < o.end && o.start < span.end))
            .collect();
        neighbours.sort_by_key(|span| span.start);
        self.neighbours = neighbours;
        self
    }

    /// The full line containing each occurrence, deduplicated.
    pub fn lines(&self) -> Vec<&'a str> {
        let mut lines: Vec<&'a str> = Vec::new();
        let mut seen = Vec::new();
        for occurrence in &self.occurrences {
            let range = line_bounds(self.text, occurrence.start);
            if !seen.contains(&range.start) {
                seen.push(range.start);
                lines.push(&self.text[range]);
            }
        }
        lines
    }

    /// Text following each occurrence, up to `width` bytes.
    ///
    /// Stops at the line of the next other code, or at the code itself when it
    /// shares the occurrence's line.
    pub fn after(&self, width: usize) -> Vec<&'a str> {
        self.occurrences
            .iter()
            .map(|o| {
                let mut end = o.end.saturating_add(width);
                if let Some(next) = self.neighbours.iter().find(|n| n.start >= o.end) {
                    let line = line_bounds(self.text, next.start);
                    end = end.min(if line.start > o.end { line.start } else { next.start });
                }
                slice_window(self.text, o.end, end)
            })
            .collect()
    }

    /// Text preceding each occurrence, up to `width` bytes.
    ///
    /// Starts after the line of the previous other code; empty when that code
    /// shares the occurrence's line.
    pub fn before(&self, width: usize) -> Vec<&'a str> {
        self.occurrences
            .iter()
            .map(|o| {
                let mut start = o.start.saturating_sub(width);
                if let Some(prev) = self.neighbours.iter().rev().find(|n| n.end <= o.start) {
                    let line = line_bounds(self.text, prev.start);
                    start = start.max(if line.end < o.start { line.end + 1 } else { o.start });
                }
                slice_window(self.text, start, o.start)
            })
            .collect()
    }
}

/// One strategy in a fallback cascade.
pub trait Tier<T>: Send + Sync {
    /// Which tier this is.
    fn source(&self) -> SourceTier;

    /// First value this tier finds that `accept` approves.
    fn extract(&self, ctx: &CodeContext<'_>, accept: &dyn Fn(&T) -> bool) -> Option<ExtractionMatch<T>>;
}

/// Ordered tiers for one field; the first approved value wins.
pub struct TierCascade<T> {
    field: Field,
    tiers: Vec<Box<dyn Tier<T>>>,
    observer: Arc<dyn ExtractionObserver>,
}

impl<T: ToString> TierCascade<T> {
    pub fn new(field: Field, tiers: Vec<Box<dyn Tier<T>>>, observer: Arc<dyn ExtractionObserver>) -> Self {
        Self {
            field,
            tiers,
            observer,
        }
    }

    /// Run every tier from the first.
    pub fn run(&self, ctx: &CodeContext<'_>, accept: &dyn Fn(&T) -> bool) -> Option<ExtractionMatch<T>> {
        self.run_from(SourceTier::Tabular, ctx, accept)
    }

    /// Run tiers starting at `start`; tiers after a success are never invoked.
    pub fn run_from(
        &self,
        start: SourceTier,
        ctx: &CodeContext<'_>,
        accept: &dyn Fn(&T) -> bool,
    ) -> Option<ExtractionMatch<T>> {
        for tier in self.tiers.iter().filter(|t| t.source() >= start) {
            let found = tier.extract(ctx, accept);

            self.observer.on_tier(&TierEvent {
                field: self.field,
                tier: tier.source(),
                product_code: ctx.code.to_string(),
                outcome: if found.is_some() { TierOutcome::Hit } else { TierOutcome::Miss },
                value: found.as_ref().map(|m| m.value.to_string()),
            });

            if found.is_some() {
                return found;
            }
        }
        None
    }
}

/// Byte ranges where `code` appears as a whole token.
pub fn find_code_occurrences(text: &str, code: &str) -> Vec<Range<usize>> {
    if code.is_empty() {
        return Vec::new();
    }

    text.match_indices(code)
        .filter(|(start, _)| {
            let end = start + code.len();
            let before = text[..*start].chars().next_back();
            let after = text[end..].chars().next();
            !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
        })
        .map(|(start, _)| start..start + code.len())
        .collect()
}

/// Range of the line containing byte `index`, without the newline.
pub fn line_bounds(text: &str, index: usize) -> Range<usize> {
    let index = floor_boundary(text, index.min(text.len()));
    let start = text[..index].rfind('\n').map_or(0, |i| i + 1);
    let end = text[index..].find('\n').map_or(text.len(), |i| index + i);
    start..end
}

/// `text[start..end]` with both ends moved inward to character boundaries.
pub fn slice_window(text: &str, start: usize, end: usize) -> &str {
    let end = floor_boundary(text, end.min(text.len()));
    let start = ceil_boundary(text, start.min(end));
    &text[start..end]
}

fn floor_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Collapse runs of whitespace and trim table separators from both ends.
pub fn clean_cell(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| matches!(c, '|' | '-' | ':' | ',' | ';') || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurrences_require_token_boundaries() {
        let text = "XS9826A 24\nXS9826 12\nXXS9826 1";
        assert_eq!(find_code_occurrences(text, "XS9826"), vec![11..17]);
        assert_eq!(find_code_occurrences(text, "XS9826A"), vec![0..7]);
    }

    #[test]
    fn test_line_bounds() {
        let text = "first\nsecond line\nthird";
        assert_eq!(&text[line_bounds(text, 8)], "second line");
        assert_eq!(&text[line_bounds(text, 0)], "first");
        assert_eq!(&text[line_bounds(text, text.len())], "third");
    }

    #[test]
    fn test_slice_window_respects_char_boundaries() {
        let text = "a€b";
        assert_eq!(slice_window(text, 0, 2), "a");
        assert_eq!(slice_window(text, 2, 5), "b");
        assert_eq!(slice_window(text, 0, 100), "a€b");
    }

    #[test]
    fn test_context_lines_and_windows() {
        let text = "header\nDF6802 | Stoneware Vase | 8\nfooter DF6802 again";
        let ctx = CodeContext::new(text, "DF6802", None);
        assert_eq!(ctx.occurrences.len(), 2);
        assert_eq!(ctx.lines(), vec!["DF6802 | Stoneware Vase | 8", "footer DF6802 again"]);
        assert_eq!(ctx.after(8)[0], " | Stone");
        assert_eq!(ctx.before(3)[1], "er ");
    }

    #[test]
    fn test_windows_stop_at_neighbouring_codes() {
        let text = "XS2003 | Cotton Tea Towel | 4.50\nXS2004 | Woven Placemat | 4.50\nXS2005 $3.95 each";
        let spans = [0..6, 33..39, 64..70];
        let ctx = CodeContext::new(text, "XS2004", None).bounded_by(spans);

        assert_eq!(ctx.after(200), vec![" | Woven Placemat | 4.50\n"]);
        assert_eq!(ctx.before(200), vec![""]);

        let same_line = "DF1000 Vase 3.25 XS1001 Bowl 4.00";
        let ctx = CodeContext::new(same_line, "XS1001", None).bounded_by([0..6, 17..23]);
        assert_eq!(ctx.before(100), vec![""]);
        let ctx = CodeContext::new(same_line, "DF1000", None).bounded_by([0..6, 17..23]);
        assert_eq!(ctx.after(100), vec![" Vase 3.25 "]);
    }

    #[test]
    fn test_clean_cell() {
        assert_eq!(clean_cell("  | Metal   Ballerina  Ornament |"), "Metal Ballerina Ornament");
    }
}
