//! Regex patterns for line-item extraction.
//!
//! Vendor-agnostic lexical patterns live in immutable statics. Everything a
//! vendor can change is compiled once into a [`PatternSet`] from
//! configuration and shared with each component.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{PolineError, Result};
use crate::models::config::PolineConfig;

lazy_static! {
    // Currency value: optional $, thousands separators, two decimals
    pub static ref CURRENCY_AMOUNT: Regex = Regex::new(
        r"\$?\s?((?:\d{1,3}(?:,\d{3})+|\d+)\.\d{2})\b"
    ).unwrap();

    // A cell or token that is nothing but a currency value
    pub static ref PRICE_TOKEN: Regex = Regex::new(
        r"^\$?\s?(?:\d{1,3}(?:,\d{3})+|\d+)\.\d{2}$"
    ).unwrap();

    // 12-digit UPC-A
    pub static ref UPC_CODE: Regex = Regex::new(
        r"\b(\d{12})\b"
    ).unwrap();

    // "code then digits then words"
    pub static ref DIGITS_THEN_WORDS: Regex = Regex::new(
        r"^[\s|:\-]*(?P<digits>\d{6,14})[\s|:\-]+(?P<words>[^\n|\t]*[A-Za-z][^\n|\t]*)"
    ).unwrap();

    // Words directly after the code
    pub static ref WORDS_AFTER_CODE: Regex = Regex::new(
        r"^[\s|:\-]*(?P<words>[^\s\d|\t][^\n|\t]*)"
    ).unwrap();

    // Invoice number, labeled
    pub static ref INVOICE_NUMBER: Regex = Regex::new(
        r"(?i)\binvoice\s*(?:#|no\.?|num(?:ber)?\.?)\s*[:\-]?\s*([A-Z0-9][A-Z0-9\-/]{2,})"
    ).unwrap();

    // Invoice number on the line after a bare "Invoice" label
    pub static ref INVOICE_NUMBER_NEXT_LINE: Regex = Regex::new(
        r"(?im)^\s*invoice\s*(?:#|no\.?)?\s*:?\s*$\n\s*([A-Z0-9][A-Z0-9\-/]{2,})"
    ).unwrap();

    // US and ISO dates
    pub static ref DATE_MDY: Regex = Regex::new(
        r"\b(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})\b"
    ).unwrap();

    pub static ref DATE_YMD: Regex = Regex::new(
        r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b"
    ).unwrap();

    pub static ref DATE_LONG: Regex = Regex::new(
        r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|jun(?:e)?|jul(?:y)?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+(\d{1,2}),?\s+(\d{4})\b"
    ).unwrap();

    // Labeled dates
    pub static ref ORDER_DATE: Regex = Regex::new(
        r"(?i)\b(?:order|po)\s+date\s*[:\-]?\s*(.+?)(?:\n|$)"
    ).unwrap();

    pub static ref INVOICE_DATE: Regex = Regex::new(
        r"(?i)\b(?:invoice|ship)\s+date\s*[:\-]?\s*(.+?)(?:\n|$)"
    ).unwrap();
}

/// A compiled product-code family.
#[derive(Debug, Clone)]
pub struct CompiledFamily {
    pub name: String,
    pub regex: Regex,
}

/// Every configurable pattern, compiled once per configuration.
#[derive(Debug, Clone)]
pub struct PatternSet {
    pub families: Vec<CompiledFamily>,
    pub price_patterns: Vec<Regex>,
    pub quantity_patterns: Vec<Regex>,
    pub quantity_context_patterns: Vec<Regex>,
    /// Lowercased table header fragments.
    pub header_markers: Vec<String>,
    /// Lowercased unit-of-measure tokens.
    pub units: HashSet<String>,
    /// Lowercased discount keywords.
    pub discount_keywords: Vec<String>,
}

impl PatternSet {
    /// Compile all patterns named by `config`.
    ///
    /// Fails on the first invalid expression, or on a tier pattern missing its
    /// named capture group.
    pub fn compile(config: &PolineConfig) -> Result<Self> {
        let extraction = &config.extraction;

        let families = extraction
            .code_families
            .iter()
            .map(|family| {
                Ok(CompiledFamily {
                    name: family.name.clone(),
                    regex: compile_named(&family.name, &family.pattern)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let price_patterns = compile_with_group("price_patterns", &extraction.price_patterns, "price")?;
        let quantity_patterns =
            compile_with_group("quantity_patterns", &extraction.quantity_patterns, "qty")?;
        let quantity_context_patterns = compile_with_group(
            "quantity_context_patterns",
            &extraction.quantity_context_patterns,
            "qty",
        )?;

        Ok(Self {
            families,
            price_patterns,
            quantity_patterns,
            quantity_context_patterns,
            header_markers: lowercase_all(&extraction.header_markers),
            units: extraction.units.iter().map(|u| u.to_lowercase()).collect(),
            discount_keywords: lowercase_all(&config.validation.discount_keywords),
        })
    }

    /// Whether `token` is a unit of measure ("each", "pcs", ...).
    pub fn is_unit(&self, token: &str) -> bool {
        let token = token.trim().trim_end_matches('.').to_lowercase();
        self.units.contains(&token)
    }

    /// Whether `line` looks like a line-item table header.
    pub fn is_header_line(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.header_markers.iter().any(|m| lower.contains(m.as_str()))
    }

    /// Whether `text` contains any discount keyword.
    pub fn has_discount_context(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.discount_keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    /// Whether any code family matches somewhere in `text`.
    pub fn contains_code(&self, text: &str) -> bool {
        self.families.iter().any(|f| f.regex.is_match(text))
    }
}

fn compile_named(name: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| PolineError::Pattern {
        name: name.to_string(),
        source,
    })
}

fn compile_with_group(name: &str, patterns: &[String], group: &str) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .enumerate()
        .map(|(index, pattern)| {
            let label = format!("{}[{}]", name, index);
            let regex = compile_named(&label, pattern)?;
            if !regex.capture_names().any(|n| n == Some(group)) {
                return Err(PolineError::Config(format!(
                    "{} is missing the `{}` capture group",
                    label, group
                )));
            }
            Ok(regex)
        })
        .collect()
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::CodeFamily;

    #[test]
    fn test_default_patterns_compile() {
        let set = PatternSet::compile(&PolineConfig::default()).unwrap();
        assert_eq!(set.families.len(), 2);
        assert!(set.is_unit("each"));
        assert!(set.is_unit("EA."));
        assert!(!set.is_unit("ornament"));
    }

    #[test]
    fn test_invalid_family_is_reported_by_name() {
        let mut config = PolineConfig::default();
        config.extraction.code_families.push(CodeFamily::new("broken", r"(\d+"));

        match PatternSet::compile(&config) {
            Err(PolineError::Pattern { name, .. }) => assert_eq!(name, "broken"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_price_pattern_requires_group() {
        let mut config = PolineConfig::default();
        config.extraction.price_patterns = vec![r"price\s+(\d+\.\d{2})".to_string()];
        assert!(matches!(PatternSet::compile(&config), Err(PolineError::Config(_))));
    }

    #[test]
    fn test_currency_amount() {
        let caps = CURRENCY_AMOUNT.captures("Total $1,234.50 due").unwrap();
        assert_eq!(&caps[1], "1,234.50");
        assert!(PRICE_TOKEN.is_match("1.60"));
        assert!(PRICE_TOKEN.is_match("$38.40"));
        assert!(!PRICE_TOKEN.is_match("24"));
    }

    #[test]
    fn test_discount_context_is_case_insensitive() {
        let set = PatternSet::compile(&PolineConfig::default()).unwrap();
        assert!(set.has_discount_context("Includes VOLUME DISCOUNT pricing"));
        assert!(set.has_discount_context("50% off all ornaments"));
        assert!(!set.has_discount_context("Your Price 1.60"));
    }
}
