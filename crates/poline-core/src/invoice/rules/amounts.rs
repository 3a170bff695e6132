//! Currency amount parsing and formatting.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::patterns::CURRENCY_AMOUNT;
use super::{ExtractionMatch, FieldExtractor};
use crate::models::line_item::SourceTier;

/// Currency amount extractor for free text; matches are contextual.
pub struct AmountExtractor;

impl AmountExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AmountExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for AmountExtractor {
    type Output = ExtractionMatch<Decimal>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results = Vec::new();

        for caps in CURRENCY_AMOUNT.captures_iter(text) {
            let (Some(full), Some(value)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if let Some(amount) = parse_currency(value.as_str()) {
                results.push(
                    ExtractionMatch::new(amount, SourceTier::Contextual, full.as_str())
                        .with_position(full.start(), full.end()),
                );
            }
        }

        results
    }
}

/// Parse a currency token ("$1,234.50", "1.6") into a two-decimal amount.
///
/// Currency symbols, whitespace and thousands separators are stripped; any
/// other stray character makes the token unparseable.
pub fn parse_currency(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '\u{00a0}'))
        .collect();

    if cleaned.is_empty()
        || cleaned.matches('.').count() > 1
        || !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        return None;
    }

    let mut amount = Decimal::from_str(&cleaned).ok()?;
    amount.rescale(2);
    Some(amount)
}

/// Format an amount as US currency ("$1,234.56").
pub fn format_currency(amount: Decimal) -> String {
    let s = format!("{:.2}", amount.abs());
    let (integer_part, decimal_part) = s.split_once('.').unwrap_or((s.as_str(), "00"));

    let chars: Vec<char> = integer_part.chars().collect();
    let mut formatted = String::new();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(*c);
    }

    let sign = if amount.is_sign_negative() && !amount.is_zero() { "-" } else { "" };
    format!("{}${}.{}", sign, formatted, decimal_part)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_currency() {
        assert_eq!(parse_currency("1.60"), Some(Decimal::new(160, 2)));
        assert_eq!(parse_currency("$1,234.56"), Some(Decimal::new(123456, 2)));
        assert_eq!(parse_currency("$ 38.40"), Some(Decimal::new(3840, 2)));
        assert_eq!(parse_currency("2"), Some(Decimal::new(200, 2)));
    }

    #[test]
    fn test_parse_currency_rejects_malformed() {
        assert_eq!(parse_currency("1.6O"), None);
        assert_eq!(parse_currency("1.2.3"), None);
        assert_eq!(parse_currency("$"), None);
        assert_eq!(parse_currency("-4.00"), None);
    }

    #[test]
    fn test_parse_currency_has_two_decimals() {
        assert_eq!(parse_currency("1.6").unwrap().scale(), 2);
        assert_eq!(parse_currency("1.604").unwrap(), Decimal::new(160, 2));
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(Decimal::new(160, 2)), "$1.60");
        assert_eq!(format_currency(Decimal::new(123456, 2)), "$1,234.56");
        assert_eq!(format_currency(Decimal::new(1_000_000, 0)), "$1,000,000.00");
    }

    #[test]
    fn test_extract_all_amounts() {
        let extractor = AmountExtractor::new();
        let text = "List 2.00, your price $1.60, extended 38.40";

        let results = extractor.extract_all(text);
        let values: Vec<_> = results.iter().map(|m| m.value).collect();
        assert_eq!(
            values,
            vec![Decimal::new(200, 2), Decimal::new(160, 2), Decimal::new(3840, 2)]
        );
        assert_eq!(results[0].tier, SourceTier::Contextual);
    }
}
