//! Business rule validation for line-item candidates.
//!
//! Per-candidate checks run on every draft before it becomes a [`LineItem`];
//! the document-wide placeholder check runs once all chunks are extracted.
//! Everything here is pure: the same inputs always give the same verdict.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::Rejection;
use crate::invoice::rules::{ExtractionMatch, PatternSet};
use crate::models::config::{FamilyRule, ValidationConfig};
use crate::models::line_item::{LineItem, ValidationFlag};

/// Why a (price, quantity) pair was judged a placeholder pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternReason {
    /// One pair dominates the document's candidates.
    Distribution,
    /// A configured sentinel pair occurs more than once.
    SentinelPair,
}

/// A (price, quantity) pair flagged across the whole document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceholderPattern {
    pub price: Decimal,
    pub quantity: u32,
    /// Items carrying the pair.
    pub occurrences: usize,
    /// Items in the document.
    pub total: usize,
    pub reason: PatternReason,
}

impl PlaceholderPattern {
    pub fn matches(&self, pair: (Decimal, u32)) -> bool {
        self.price == pair.0.normalize() && self.quantity == pair.1
    }
}

/// Everything extracted for one product code, before validation.
#[derive(Debug, Clone)]
pub struct DraftItem {
    pub product_code: String,
    pub upc: Option<String>,
    /// Rendered description, or `None` when no text was found.
    pub description: Option<String>,
    pub price: Option<ExtractionMatch<Decimal>>,
    pub quantity: Option<ExtractionMatch<i64>>,
    /// Text around the code, searched for discount context.
    pub window: String,
}

/// Business rule gate between extraction and output.
pub struct Validator {
    config: ValidationConfig,
    patterns: Arc<PatternSet>,
}

impl Validator {
    pub fn new(config: &ValidationConfig, patterns: Arc<PatternSet>) -> Self {
        Self {
            config: config.clone(),
            patterns,
        }
    }

    /// Check a unit price found near `window`.
    ///
    /// A placeholder-valued price passes only with discount wording in the
    /// window, and is then flagged.
    pub fn check_price(&self, price: Decimal, window: &str) -> Result<Option<ValidationFlag>, Rejection> {
        if price < self.config.min_price || price > self.config.max_price {
            return Err(Rejection::PriceOutOfRange {
                price,
                min: self.config.min_price,
                max: self.config.max_price,
            });
        }

        let normalized = price.normalize();
        if self.config.placeholder_prices.iter().any(|p| p.normalize() == normalized) {
            if self.patterns.has_discount_context(window) {
                return Ok(Some(ValidationFlag::DiscountedPlaceholderPrice));
            }
            return Err(Rejection::PlaceholderPrice { price });
        }

        Ok(None)
    }

    pub fn price_acceptable(&self, price: &Decimal, window: &str) -> bool {
        self.check_price(*price, window).is_ok()
    }

    /// Check a quantity against the family rule for `code`.
    pub fn check_quantity(&self, code: &str, quantity: i64) -> Result<Vec<ValidationFlag>, Rejection> {
        if quantity < 0 {
            return Err(Rejection::NegativeQuantity { quantity });
        }
        let Ok(value) = u32::try_from(quantity) else {
            return Err(Rejection::QuantityOutOfRange { quantity });
        };
        if value == 0 {
            return Ok(Vec::new());
        }

        let rule = self.family_rule(code);
        let mut flags = Vec::new();

        if value > rule.ceiling {
            if self.config.reject_above_ceiling {
                return Err(Rejection::QuantityAboveCeiling {
                    quantity,
                    ceiling: rule.ceiling,
                });
            }
            flags.push(ValidationFlag::AboveFamilyCeiling { ceiling: rule.ceiling });
        } else if value > rule.typical_max {
            flags.push(ValidationFlag::AboveTypicalRange {
                typical_max: rule.typical_max,
            });
        }

        if rule.case_pack > 1 && value % rule.case_pack != 0 {
            flags.push(ValidationFlag::NotCasePackMultiple {
                case_pack: rule.case_pack,
            });
        }

        Ok(flags)
    }

    pub fn quantity_acceptable(&self, code: &str, quantity: &i64) -> bool {
        self.check_quantity(code, *quantity).is_ok()
    }

    /// Check a rendered description.
    pub fn check_description(&self, code: &str, upc: Option<&str>, description: Option<&str>) -> Result<(), Rejection> {
        let description = description.map(str::trim).filter(|d| !d.is_empty());
        let Some(description) = description else {
            return Err(Rejection::MissingDescription);
        };

        let lower = description.to_lowercase();
        if let Some(fallback) = self
            .config
            .fallback_descriptions
            .iter()
            .find(|f| lower.contains(&f.to_lowercase()))
        {
            return Err(Rejection::FallbackDescription {
                description: fallback.clone(),
            });
        }

        if !description.contains(code) {
            return Err(Rejection::DescriptionMissingCode);
        }

        let mut remainder = description.replacen(code, "", 1);
        if let Some(upc) = upc {
            remainder = remainder.replace(upc, "");
        }
        let remainder = remainder.replace("UPC:", "");
        if !remainder.chars().any(char::is_alphabetic) {
            return Err(Rejection::EmptyDescription);
        }

        Ok(())
    }

    /// Rule for the two-letter prefix of `code`, or the default rule.
    pub fn family_rule(&self, code: &str) -> &FamilyRule {
        let prefix: String = code.chars().take(2).collect::<String>().to_uppercase();
        self.config
            .families
            .iter()
            .find(|rule| rule.prefix.eq_ignore_ascii_case(&prefix))
            .unwrap_or(&self.config.default_family)
    }

    /// Turn a draft into a line item, or say why it cannot be one.
    pub fn validate(&self, draft: DraftItem) -> Result<LineItem, Rejection> {
        let price = draft.price.ok_or(Rejection::MissingPrice)?;
        let quantity = draft.quantity.ok_or(Rejection::MissingQuantity)?;

        let mut flags = Vec::new();
        flags.extend(self.check_price(price.value, &draft.window)?);
        flags.extend(self.check_quantity(&draft.product_code, quantity.value)?);
        self.check_description(&draft.product_code, draft.upc.as_deref(), draft.description.as_deref())?;

        let Some(description) = draft.description else {
            return Err(Rejection::MissingDescription);
        };
        let unit_quantity = u32::try_from(quantity.value).map_err(|_| Rejection::QuantityOutOfRange {
            quantity: quantity.value,
        })?;

        Ok(LineItem {
            product_code: draft.product_code,
            upc: draft.upc,
            description: description.trim().to_string(),
            unit_price: price.value,
            quantity: unit_quantity,
            source_tier: price.tier.max(quantity.tier),
            flags,
        })
    }

    /// Find (price, quantity) pairs that look synthetic across a document.
    ///
    /// Nothing is flagged when the document has discount context. Patterns are
    /// returned in order of first occurrence.
    pub fn detect_placeholder_patterns(&self, pairs: &[(Decimal, u32)], discount_context: bool) -> Vec<PlaceholderPattern> {
        if discount_context || pairs.is_empty() {
            return Vec::new();
        }

        let mut counts: Vec<((Decimal, u32), usize)> = Vec::new();
        for (price, quantity) in pairs {
            let pair = (price.normalize(), *quantity);
            match counts.iter_mut().find(|(p, _)| *p == pair) {
                Some((_, count)) => *count += 1,
                None => counts.push((pair, 1)),
            }
        }

        let total = pairs.len();
        counts
            .into_iter()
            .filter_map(|((price, quantity), occurrences)| {
                let sentinel = self
                    .config
                    .placeholder_pairs
                    .iter()
                    .any(|p| p.price.normalize() == price && p.quantity == quantity);

                let reason = if sentinel && occurrences >= 2 {
                    PatternReason::SentinelPair
                } else if total >= self.config.placeholder_min_items
                    && occurrences as f64 / total as f64 > self.config.placeholder_share
                {
                    PatternReason::Distribution
                } else {
                    return None;
                };

                Some(PlaceholderPattern {
                    price,
                    quantity,
                    occurrences,
                    total,
                    reason,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::PolineConfig;
    use crate::models::line_item::SourceTier;
    use pretty_assertions::assert_eq;

    fn validator_with(config: PolineConfig) -> Validator {
        let patterns = Arc::new(PatternSet::compile(&config).unwrap());
        Validator::new(&config.validation, patterns)
    }

    fn validator() -> Validator {
        validator_with(PolineConfig::default())
    }

    fn draft() -> DraftItem {
        DraftItem {
            product_code: "XS9826A".to_string(),
            upc: Some("191009727774".to_string()),
            description: Some("XS9826A - UPC: 191009727774 - 6\"H Metal Ballerina Ornament".to_string()),
            price: Some(ExtractionMatch::new(Decimal::new(160, 2), SourceTier::Tabular, "1.60")),
            quantity: Some(ExtractionMatch::new(24, SourceTier::Pattern, "Qty 24")),
            window: String::new(),
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_price_range() {
        let v = validator();
        assert!(v.check_price(dec("1.60"), "").is_ok());
        assert!(v.check_price(dec("0.10"), "").is_ok());
        assert!(v.check_price(dec("1000.00"), "").is_ok());
        assert!(matches!(v.check_price(dec("0.09"), ""), Err(Rejection::PriceOutOfRange { .. })));
        assert!(matches!(v.check_price(dec("1000.01"), ""), Err(Rejection::PriceOutOfRange { .. })));
    }

    #[test]
    fn test_placeholder_price_needs_discount_context() {
        let v = validator();
        assert_eq!(
            v.check_price(dec("123.45"), "Stoneware Vase 123.45"),
            Err(Rejection::PlaceholderPrice { price: dec("123.45") })
        );
        assert_eq!(
            v.check_price(dec("123.45"), "Volume Discount applied: 123.45"),
            Ok(Some(ValidationFlag::DiscountedPlaceholderPrice))
        );
    }

    #[test]
    fn test_quantity_rules() {
        let v = validator();
        assert_eq!(v.check_quantity("XS9826A", 0), Ok(vec![]));
        assert_eq!(v.check_quantity("XS9826A", 24), Ok(vec![]));
        assert_eq!(
            v.check_quantity("XS9826A", -1),
            Err(Rejection::NegativeQuantity { quantity: -1 })
        );
        assert_eq!(
            v.check_quantity("XS9826A", 25),
            Ok(vec![ValidationFlag::NotCasePackMultiple { case_pack: 6 }])
        );
        assert_eq!(
            v.check_quantity("XS9826A", 600),
            Ok(vec![ValidationFlag::AboveFamilyCeiling { ceiling: 576 }])
        );
        assert_eq!(
            v.check_quantity("DA1234", 96),
            Ok(vec![ValidationFlag::AboveTypicalRange { typical_max: 48 }])
        );
        assert!(matches!(
            v.check_quantity("DA1234", i64::from(u32::MAX) + 1),
            Err(Rejection::QuantityOutOfRange { .. })
        ));
    }

    #[test]
    fn test_ceiling_can_reject() {
        let mut config = PolineConfig::default();
        config.validation.reject_above_ceiling = true;
        let v = validator_with(config);
        assert_eq!(
            v.check_quantity("XS9826A", 600),
            Err(Rejection::QuantityAboveCeiling {
                quantity: 600,
                ceiling: 576
            })
        );
    }

    #[test]
    fn test_family_rule_lookup() {
        let v = validator();
        assert_eq!(v.family_rule("XS9826A").prefix, "XS");
        assert_eq!(v.family_rule("df6802").prefix, "DF");
        assert_eq!(v.family_rule("DZ1000").prefix, "*");
    }

    #[test]
    fn test_description_rules() {
        let v = validator();
        assert_eq!(v.check_description("XS1", None, None), Err(Rejection::MissingDescription));
        assert_eq!(v.check_description("XS1", None, Some("  ")), Err(Rejection::MissingDescription));
        assert!(matches!(
            v.check_description("DF6802", None, Some("DF6802 - Traditional D-code format item")),
            Err(Rejection::FallbackDescription { .. })
        ));
        assert_eq!(
            v.check_description("DF6802", None, Some("Stoneware Vase")),
            Err(Rejection::DescriptionMissingCode)
        );
        assert_eq!(
            v.check_description("DF6802", Some("191009551232"), Some("DF6802 - UPC: 191009551232 - ")),
            Err(Rejection::EmptyDescription)
        );
        assert!(v.check_description("DF6802", None, Some("DF6802 - Stoneware Vase")).is_ok());
    }

    #[test]
    fn test_validate_builds_item_with_weakest_tier() {
        let item = validator().validate(draft()).unwrap();
        assert_eq!(item.product_code, "XS9826A");
        assert_eq!(item.unit_price, dec("1.60"));
        assert_eq!(item.quantity, 24);
        assert_eq!(item.source_tier, SourceTier::Pattern);
        assert!(item.flags.is_empty());
    }

    #[test]
    fn test_validate_rejects_missing_values() {
        let mut d = draft();
        d.price = None;
        assert_eq!(validator().validate(d), Err(Rejection::MissingPrice));

        let mut d = draft();
        d.quantity = None;
        assert_eq!(validator().validate(d), Err(Rejection::MissingQuantity));

        let mut d = draft();
        d.description = None;
        assert_eq!(validator().validate(d), Err(Rejection::MissingDescription));
    }

    #[test]
    fn test_distribution_pattern() {
        let v = validator();
        let pairs = vec![
            (dec("2.50"), 12),
            (dec("2.5"), 12),
            (dec("2.50"), 12),
            (dec("2.50"), 12),
            (dec("4.00"), 6),
        ];

        let found = v.detect_placeholder_patterns(&pairs, false);
        assert_eq!(
            found,
            vec![PlaceholderPattern {
                price: dec("2.5"),
                quantity: 12,
                occurrences: 4,
                total: 5,
                reason: PatternReason::Distribution,
            }]
        );
        assert!(v.detect_placeholder_patterns(&pairs, true).is_empty());
    }

    #[test]
    fn test_distribution_needs_enough_items() {
        let pairs = vec![(dec("2.50"), 12), (dec("2.50"), 12), (dec("2.50"), 12)];
        assert!(validator().detect_placeholder_patterns(&pairs, false).is_empty());
    }

    #[test]
    fn test_sentinel_pair_twice() {
        let pairs = vec![(dec("1.60"), 24), (dec("3.00"), 6), (dec("1.60"), 24)];
        let found = validator().detect_placeholder_patterns(&pairs, false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].reason, PatternReason::SentinelPair);
        assert!(found[0].matches((dec("1.60"), 24)));

        let once = vec![(dec("1.60"), 24), (dec("3.00"), 6)];
        assert!(validator().detect_placeholder_patterns(&once, false).is_empty());
    }
}
