//! Unit price tier cascade.
//!
//! 1. **Tabular**: the "your price" column of the code's table row.
//! 2. **Pattern**: explicit phrases after the code ("your price $X", "$X each").
//! 3. **Contextual**: the first currency value in range around the code,
//!    searching after the code first and then backwards from it.

use std::sync::Arc;

use rust_decimal::Decimal;

use super::amounts::{parse_currency, AmountExtractor};
use super::patterns::PatternSet;
use super::table::TableRow;
use super::{CodeContext, ExtractionMatch, FieldExtractor, Tier, TierCascade};
use crate::invoice::observer::{ExtractionObserver, Field};
use crate::models::config::ExtractionConfig;
use crate::models::line_item::SourceTier;

/// Build the tabular -> pattern -> contextual price cascade.
pub fn price_cascade(
    patterns: Arc<PatternSet>,
    config: &ExtractionConfig,
    observer: Arc<dyn ExtractionObserver>,
) -> TierCascade<Decimal> {
    TierCascade::new(
        Field::Price,
        vec![
            Box::new(TabularPrice {
                patterns: patterns.clone(),
            }),
            Box::new(PatternPrice {
                patterns,
                window: config.pattern_window,
            }),
            Box::new(ContextualPrice {
                amounts: AmountExtractor::new(),
                window: config.contextual_window,
                min: config.contextual_price_min,
                max: config.contextual_price_max,
            }),
        ],
        observer,
    )
}

struct TabularPrice {
    patterns: Arc<PatternSet>,
}

impl Tier<Decimal> for TabularPrice {
    fn source(&self) -> SourceTier {
        SourceTier::Tabular
    }

    fn extract(&self, ctx: &CodeContext<'_>, accept: &dyn Fn(&Decimal) -> bool) -> Option<ExtractionMatch<Decimal>> {
        ctx.lines().into_iter().find_map(|line| {
            let price = TableRow::parse(line, ctx.code, ctx.layout, &self.patterns)?.your_price?;
            accept(&price).then(|| ExtractionMatch::new(price, SourceTier::Tabular, line))
        })
    }
}

struct PatternPrice {
    patterns: Arc<PatternSet>,
    window: usize,
}

impl Tier<Decimal> for PatternPrice {
    fn source(&self) -> SourceTier {
        SourceTier::Pattern
    }

    fn extract(&self, ctx: &CodeContext<'_>, accept: &dyn Fn(&Decimal) -> bool) -> Option<ExtractionMatch<Decimal>> {
        for window in ctx.after(self.window) {
            for regex in &self.patterns.price_patterns {
                for caps in regex.captures_iter(window) {
                    let Some(price) = caps.name("price").and_then(|m| parse_currency(m.as_str())) else {
                        continue;
                    };
                    if accept(&price) {
                        return Some(ExtractionMatch::new(price, SourceTier::Pattern, caps[0].trim()));
                    }
                }
            }
        }
        None
    }
}

struct ContextualPrice {
    amounts: AmountExtractor,
    window: usize,
    min: Decimal,
    max: Decimal,
}

impl ContextualPrice {
    fn in_range(&self, price: &Decimal) -> bool {
        *price >= self.min && *price <= self.max
    }
}

impl Tier<Decimal> for ContextualPrice {
    fn source(&self) -> SourceTier {
        SourceTier::Contextual
    }

    fn extract(&self, ctx: &CodeContext<'_>, accept: &dyn Fn(&Decimal) -> bool) -> Option<ExtractionMatch<Decimal>> {
        let approved = |m: &ExtractionMatch<Decimal>| self.in_range(&m.value) && accept(&m.value);

        let after = ctx
            .after(self.window)
            .into_iter()
            .find_map(|window| self.amounts.extract_all(window).into_iter().find(|m| approved(m)));

        after.or_else(|| {
            ctx.before(self.window)
                .into_iter()
                .find_map(|window| self.amounts.extract_all(window).into_iter().rev().find(|m| approved(m)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::observer::RecordingObserver;
    use crate::invoice::rules::table::ColumnLayout;
    use crate::models::config::PolineConfig;
    use pretty_assertions::assert_eq;

    fn setup() -> (Arc<PatternSet>, TierCascade<Decimal>, Arc<RecordingObserver>) {
        let config = PolineConfig::default();
        let patterns = Arc::new(PatternSet::compile(&config).unwrap());
        let observer = Arc::new(RecordingObserver::new());
        let cascade = price_cascade(patterns.clone(), &config.extraction, observer.clone());
        (patterns, cascade, observer)
    }

    fn any(_: &Decimal) -> bool {
        true
    }

    #[test]
    fn test_tabular_takes_your_price_not_list_or_extended() {
        let (_, cascade, observer) = setup();
        let text = "XS9826A | 191009727774 | 6\"H Metal Ballerina Ornament | 24 | 0 | 0 | 24 | each | 2.00 | 1.60 | 38.40";
        let ctx = CodeContext::new(text, "XS9826A", None);

        let found = cascade.run(&ctx, &any).unwrap();
        assert_eq!(found.value, Decimal::new(160, 2));
        assert_eq!(found.tier, SourceTier::Tabular);
        assert_eq!(observer.tiers_invoked("XS9826A", Field::Price), vec![SourceTier::Tabular]);
    }

    #[test]
    fn test_tabular_uses_header_layout() {
        let (patterns, cascade, _) = setup();
        let text = "Item | Description | Ordered | Shipped | Your Price | List Price | Amount\n\
                    DG0110A | Wood Bead Garland | 12 | 6 | 3.20 | 4.00 | 19.20";
        let layout = ColumnLayout::detect(text, &patterns);
        let ctx = CodeContext::new(text, "DG0110A", layout.as_ref());

        assert_eq!(cascade.run(&ctx, &any).unwrap().value, Decimal::new(320, 2));
    }

    #[test]
    fn test_pattern_tier() {
        let (_, cascade, observer) = setup();
        let text = "DF6802 Stoneware Vase, Cream\nList $8.50 Your Price: $6.80";
        let ctx = CodeContext::new(text, "DF6802", None);

        let found = cascade.run(&ctx, &any).unwrap();
        assert_eq!(found.value, Decimal::new(680, 2));
        assert_eq!(found.tier, SourceTier::Pattern);
        assert_eq!(
            observer.tiers_invoked("DF6802", Field::Price),
            vec![SourceTier::Tabular, SourceTier::Pattern]
        );
    }

    #[test]
    fn test_contextual_tier_respects_range() {
        let (_, cascade, _) = setup();
        let text = "DF6802 Stoneware Vase\nref 0.00 then 4,500.00 then 12.75";
        let ctx = CodeContext::new(text, "DF6802", None);

        let found = cascade.run(&ctx, &any).unwrap();
        assert_eq!(found.value, Decimal::new(1275, 2));
        assert_eq!(found.tier, SourceTier::Contextual);
    }

    #[test]
    fn test_contextual_before_code_is_nearest_first() {
        let (_, cascade, _) = setup();
        let text = "Freight 15.00\nSpecial 3.25\nDF6802 Stoneware Vase";
        let ctx = CodeContext::new(text, "DF6802", None);

        assert_eq!(cascade.run(&ctx, &any).unwrap().value, Decimal::new(325, 2));
    }

    #[test]
    fn test_run_from_skips_earlier_tiers_and_rejected_values() {
        let (_, cascade, observer) = setup();
        let text = "XS9826A | Metal Ballerina Ornament | 24 | each | 1.60\nwholesale $1.95";
        let ctx = CodeContext::new(text, "XS9826A", None);
        let flagged = Decimal::new(160, 2);

        let found = cascade.run_from(SourceTier::Pattern, &ctx, &|p: &Decimal| *p != flagged).unwrap();
        assert_eq!(found.value, Decimal::new(195, 2));
        assert_eq!(observer.tiers_invoked("XS9826A", Field::Price), vec![SourceTier::Pattern]);
    }

    #[test]
    fn test_all_tiers_miss() {
        let (_, cascade, observer) = setup();
        let ctx = CodeContext::new("DF6802 Stoneware Vase", "DF6802", None);

        assert!(cascade.run(&ctx, &any).is_none());
        assert_eq!(observer.tiers_invoked("DF6802", Field::Price).len(), 3);
    }
}
