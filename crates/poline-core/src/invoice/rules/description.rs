//! Line-item description composition.
//!
//! Free text is taken from the first source that yields meaningful text:
//! 1. The description cell of the code's table row
//! 2. Digits followed by words directly after the code, or words alone
//! 3. The lines following a code that stands alone on its line
//!
//! Nothing is synthesized; when no source has text the composer says so and
//! the validator drops the candidate.

use std::sync::Arc;

use super::patterns::{PatternSet, DIGITS_THEN_WORDS, PRICE_TOKEN, UPC_CODE, WORDS_AFTER_CODE};
use super::table::{is_quantity_token, TableRow};
use super::{clean_cell, line_bounds, CodeContext};
use crate::models::config::ExtractionConfig;

/// Description parts found for one code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposedDescription {
    pub upc: Option<String>,
    /// Free text, or `None` when nothing meaningful was found.
    pub text: Option<String>,
}

impl ComposedDescription {
    /// `"<code> - UPC: <upc> - <text>"`, or `None` without text.
    pub fn render(&self, code: &str) -> Option<String> {
        let text = self.text.as_deref()?;
        Some(match &self.upc {
            Some(upc) => format!("{} - UPC: {} - {}", code, upc, text),
            None => format!("{} - {}", code, text),
        })
    }
}

pub struct DescriptionComposer {
    patterns: Arc<PatternSet>,
    scan_lines: usize,
    min_chars: usize,
}

impl DescriptionComposer {
    pub fn new(patterns: Arc<PatternSet>, config: &ExtractionConfig) -> Self {
        Self {
            patterns,
            scan_lines: config.description_scan_lines,
            min_chars: config.min_description_chars,
        }
    }

    /// Whether `text` has enough letters to describe a product.
    pub fn is_meaningful(&self, text: &str) -> bool {
        text.chars().filter(|c| c.is_alphabetic()).count() >= self.min_chars
    }

    pub fn compose(&self, ctx: &CodeContext<'_>) -> ComposedDescription {
        let mut upc = None;

        for occurrence in &ctx.occurrences {
            let bounds = line_bounds(ctx.text, occurrence.start);
            let line = &ctx.text[bounds.clone()];
            let rest = &ctx.text[occurrence.end..bounds.end];
            let following = ctx.text.get(bounds.end + 1..).unwrap_or("");

            if upc.is_none() {
                upc = find_upc(rest).or_else(|| following.lines().next().and_then(find_upc));
            }

            if let Some(row) = TableRow::parse(line, ctx.code, ctx.layout, &self.patterns) {
                if row.upc.is_some() {
                    upc = row.upc.clone();
                }
                if let Some(text) = row.description.filter(|d| self.is_meaningful(d)) {
                    return ComposedDescription { upc, text: Some(text) };
                }
            }

            if let Some(text) = self.words_after_code(rest, &mut upc) {
                return ComposedDescription { upc, text: Some(text) };
            }

            if !self.is_meaningful(rest) {
                if let Some(text) = self.scan_following(following, ctx.code) {
                    return ComposedDescription { upc, text: Some(text) };
                }
            }
        }

        ComposedDescription { upc, text: None }
    }

    fn words_after_code(&self, rest: &str, upc: &mut Option<String>) -> Option<String> {
        if let Some(caps) = DIGITS_THEN_WORDS.captures(rest) {
            let digits = &caps["digits"];
            if upc.is_none() && digits.len() == 12 {
                *upc = Some(digits.to_string());
            }
            let text = self.trim_values(&caps["words"]);
            if self.is_meaningful(&text) {
                return Some(text);
            }
        }

        let caps = WORDS_AFTER_CODE.captures(rest)?;
        let text = self.trim_values(&caps["words"]);
        self.is_meaningful(&text).then_some(text)
    }

    fn scan_following(&self, following: &str, code: &str) -> Option<String> {
        for line in following.lines().filter(|l| !l.trim().is_empty()).take(self.scan_lines) {
            if self.patterns.contains_code(line) && !line.contains(code) {
                break;
            }
            if !line.chars().any(char::is_alphabetic) {
                continue;
            }

            let without_upc = UPC_CODE.replace_all(line, "");
            let text = self.trim_values(&without_upc);
            if self.is_meaningful(&text) {
                return Some(text);
            }
        }
        None
    }

    /// Cut trailing quantity, unit and price columns from free text.
    fn trim_values(&self, text: &str) -> String {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut kept = Vec::with_capacity(tokens.len());

        for (i, token) in tokens.iter().enumerate() {
            let next = tokens.get(i + 1).copied();
            let is_value_run = PRICE_TOKEN.is_match(token)
                || (token.parse::<i64>().is_ok()
                    && next.is_none_or(|n| {
                        self.patterns.is_unit(n) || PRICE_TOKEN.is_match(n) || is_quantity_token(n)
                    }));
            if is_value_run {
                break;
            }
            kept.push(*token);
        }

        clean_cell(&kept.join(" "))
    }
}

fn find_upc(text: &str) -> Option<String> {
    UPC_CODE.captures(text).map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::PolineConfig;
    use pretty_assertions::assert_eq;

    fn composer() -> DescriptionComposer {
        let config = PolineConfig::default();
        let patterns = Arc::new(PatternSet::compile(&config).unwrap());
        DescriptionComposer::new(patterns, &config.extraction)
    }

    fn compose(text: &str, code: &str) -> ComposedDescription {
        composer().compose(&CodeContext::new(text, code, None))
    }

    #[test]
    fn test_table_cell_with_upc() {
        let text = "XS9826A | 191009727774 | 6\"H Metal Ballerina Ornament | 24 | 0 | 0 | 24 | each | 2.00 | 1.60 | 38.40";
        let composed = compose(text, "XS9826A");

        assert_eq!(composed.upc.as_deref(), Some("191009727774"));
        assert_eq!(
            composed.render("XS9826A").unwrap(),
            "XS9826A - UPC: 191009727774 - 6\"H Metal Ballerina Ornament"
        );
    }

    #[test]
    fn test_digits_then_words() {
        let composed = compose("DF6802 191009551232 Stoneware Vase, Cream", "DF6802");
        assert_eq!(composed.upc.as_deref(), Some("191009551232"));
        assert_eq!(composed.text.as_deref(), Some("Stoneware Vase, Cream"));
    }

    #[test]
    fn test_words_after_code_stop_at_values() {
        let composed = compose("DG0110A Wood Bead Garland 12 each 3.20", "DG0110A");
        assert_eq!(composed.upc, None);
        assert_eq!(composed.render("DG0110A").unwrap(), "DG0110A - Wood Bead Garland");
    }

    #[test]
    fn test_numbers_inside_text_are_kept() {
        let composed = compose("DA1234 Set of 4 Linen Napkins", "DA1234");
        assert_eq!(composed.text.as_deref(), Some("Set of 4 Linen Napkins"));
    }

    #[test]
    fn test_scan_after_standalone_code() {
        let text = "DH4471\n191009300021\nEmbroidered Cotton Pillow\n12 each 14.00";
        let composed = compose(text, "DH4471");

        assert_eq!(composed.upc.as_deref(), Some("191009300021"));
        assert_eq!(composed.text.as_deref(), Some("Embroidered Cotton Pillow"));
    }

    #[test]
    fn test_scan_stops_at_next_code() {
        let text = "DH4471\nDH4472 Embroidered Cotton Pillow";
        assert_eq!(compose(text, "DH4471").text, None);
    }

    #[test]
    fn test_no_description() {
        let composed = compose("XS1001 24 1.60", "XS1001");
        assert_eq!(composed.text, None);
        assert_eq!(composed.render("XS1001"), None);
    }

    #[test]
    fn test_short_text_is_not_meaningful() {
        assert!(!composer().is_meaningful("Pk 24"));
        assert!(composer().is_meaningful("Glass Jar"));
    }
}
