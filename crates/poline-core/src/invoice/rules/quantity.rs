//! Quantity resolution and the quantity tier cascade.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::patterns::PatternSet;
use super::table::TableRow;
use super::{CodeContext, ExtractionMatch, Tier, TierCascade};
use crate::invoice::observer::{ExtractionObserver, Field};
use crate::models::config::ExtractionConfig;
use crate::models::line_item::SourceTier;

/// The four quantity columns of an invoice row. Missing columns are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityColumns {
    pub ordered: i64,
    pub allocated: i64,
    pub shipped: i64,
    pub backordered: i64,
}

impl QuantityColumns {
    /// Assign unlabeled quantity values by how many there are.
    pub fn from_count(values: &[i64]) -> Self {
        match *values {
            [ordered, allocated, shipped, backordered] => Self {
                ordered,
                allocated,
                shipped,
                backordered,
            },
            [ordered, shipped, backordered] => Self {
                ordered,
                shipped,
                backordered,
                ..Default::default()
            },
            [ordered, shipped] => Self {
                ordered,
                shipped,
                ..Default::default()
            },
            [shipped] => Self {
                shipped,
                ..Default::default()
            },
            _ => Self::default(),
        }
    }

    /// The best real-world quantity.
    ///
    /// Shipped wins when positive. A fully backordered line reports what was
    /// ordered, then allocated stock; otherwise the line is zero. A negative
    /// column is returned unchanged so the line can be rejected.
    pub fn resolve(&self) -> i64 {
        let columns = [self.ordered, self.allocated, self.shipped, self.backordered];
        if let Some(negative) = columns.into_iter().filter(|q| *q < 0).min() {
            return negative;
        }

        if self.shipped > 0 {
            self.shipped
        } else if self.ordered > 0 && self.backordered > 0 {
            self.ordered
        } else if self.allocated > 0 {
            self.allocated
        } else {
            0
        }
    }
}

/// Build the tabular -> pattern -> contextual quantity cascade.
pub fn quantity_cascade(
    patterns: Arc<PatternSet>,
    config: &ExtractionConfig,
    observer: Arc<dyn ExtractionObserver>,
) -> TierCascade<i64> {
    TierCascade::new(
        Field::Quantity,
        vec![
            Box::new(TabularQuantity {
                patterns: patterns.clone(),
            }),
            Box::new(PatternQuantity {
                patterns: patterns.clone(),
                window: config.pattern_window,
            }),
            Box::new(ContextualQuantity {
                patterns,
                window: config.contextual_window,
            }),
        ],
        observer,
    )
}

/// Quantity columns of the code's table row.
struct TabularQuantity {
    patterns: Arc<PatternSet>,
}

impl Tier<i64> for TabularQuantity {
    fn source(&self) -> SourceTier {
        SourceTier::Tabular
    }

    fn extract(&self, ctx: &CodeContext<'_>, accept: &dyn Fn(&i64) -> bool) -> Option<ExtractionMatch<i64>> {
        ctx.lines().into_iter().find_map(|line| {
            let row = TableRow::parse(line, ctx.code, ctx.layout, &self.patterns)?;
            if row.quantity_columns == 0 {
                return None;
            }
            let quantity = row.quantities.resolve();
            accept(&quantity).then(|| ExtractionMatch::new(quantity, SourceTier::Tabular, line))
        })
    }
}

/// "Qty: N", "Quantity shipped N" after the code.
struct PatternQuantity {
    patterns: Arc<PatternSet>,
    window: usize,
}

impl Tier<i64> for PatternQuantity {
    fn source(&self) -> SourceTier {
        SourceTier::Pattern
    }

    fn extract(&self, ctx: &CodeContext<'_>, accept: &dyn Fn(&i64) -> bool) -> Option<ExtractionMatch<i64>> {
        for window in ctx.after(self.window) {
            for regex in &self.patterns.quantity_patterns {
                for caps in regex.captures_iter(window) {
                    let Some(quantity) = caps.name("qty").and_then(|m| m.as_str().parse::<i64>().ok()) else {
                        continue;
                    };
                    if accept(&quantity) {
                        return Some(ExtractionMatch::new(quantity, SourceTier::Pattern, &caps[0]));
                    }
                }
            }
        }
        None
    }
}

/// "N each" / "N pcs" anywhere around the code, after the code first.
struct ContextualQuantity {
    patterns: Arc<PatternSet>,
    window: usize,
}

impl ContextualQuantity {
    fn scan(&self, window: &str, nearest_last: bool, accept: &dyn Fn(&i64) -> bool) -> Option<ExtractionMatch<i64>> {
        let mut found: Vec<(usize, i64, String)> = Vec::new();
        for regex in &self.patterns.quantity_context_patterns {
            for caps in regex.captures_iter(window) {
                if let Some(m) = caps.name("qty") {
                    if let Ok(quantity) = m.as_str().parse::<i64>() {
                        found.push((m.start(), quantity, caps[0].trim().to_string()));
                    }
                }
            }
        }

        found.sort_by_key(|(start, _, _)| *start);
        if nearest_last {
            found.reverse();
        }

        found
            .into_iter()
            .find(|(_, quantity, _)| accept(quantity))
            .map(|(_, quantity, source)| ExtractionMatch::new(quantity, SourceTier::Contextual, source))
    }
}

impl Tier<i64> for ContextualQuantity {
    fn source(&self) -> SourceTier {
        SourceTier::Contextual
    }

    fn extract(&self, ctx: &CodeContext<'_>, accept: &dyn Fn(&i64) -> bool) -> Option<ExtractionMatch<i64>> {
        ctx.after(self.window)
            .into_iter()
            .find_map(|window| self.scan(window, false, accept))
            .or_else(|| {
                ctx.before(self.window)
                    .into_iter()
                    .find_map(|window| self.scan(window, true, accept))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::observer::RecordingObserver;
    use crate::models::config::PolineConfig;

    fn cascade(observer: Arc<RecordingObserver>) -> TierCascade<i64> {
        let config = PolineConfig::default();
        let patterns = Arc::new(PatternSet::compile(&config).unwrap());
        quantity_cascade(patterns, &config.extraction, observer)
    }

    fn any(_: &i64) -> bool {
        true
    }

    #[test]
    fn test_priority_law() {
        let cols = |ordered, allocated, shipped, backordered| QuantityColumns {
            ordered,
            allocated,
            shipped,
            backordered,
        };

        assert_eq!(cols(24, 0, 12, 12).resolve(), 12);
        assert_eq!(cols(24, 0, 0, 24).resolve(), 24);
        assert_eq!(cols(24, 6, 0, 0).resolve(), 6);
        assert_eq!(cols(24, 0, 0, 0).resolve(), 0);
        assert_eq!(cols(0, 0, 0, 0).resolve(), 0);
        assert_eq!(cols(0, 0, -4, 0).resolve(), -4);
        assert_eq!(cols(24, 0, 12, -2).resolve(), -2);
    }

    #[test]
    fn test_from_count() {
        assert_eq!(
            QuantityColumns::from_count(&[24, 0, 12]),
            QuantityColumns {
                ordered: 24,
                allocated: 0,
                shipped: 0,
                backordered: 12
            }
        );
        assert_eq!(QuantityColumns::from_count(&[7]).shipped, 7);
        assert_eq!(QuantityColumns::from_count(&[12, 6]).shipped, 6);
        assert_eq!(QuantityColumns::from_count(&[]), QuantityColumns::default());
    }

    #[test]
    fn test_tabular_quantity_stops_cascade() {
        let observer = Arc::new(RecordingObserver::new());
        let text = "XS4410 | Mercury Glass Tree | 24 | 0 | 12 | 12 | each | 9.00 | 7.20 | 86.40";
        let ctx = CodeContext::new(text, "XS4410", None);

        let found = cascade(observer.clone()).run(&ctx, &any).unwrap();
        assert_eq!(found.value, 12);
        assert_eq!(found.tier, SourceTier::Tabular);
        assert_eq!(observer.tiers_invoked("XS4410", Field::Quantity), vec![SourceTier::Tabular]);
    }

    #[test]
    fn test_pattern_quantity() {
        let observer = Arc::new(RecordingObserver::new());
        let text = "Item DF6802 Stoneware Vase\nQty Shipped: 18";
        let ctx = CodeContext::new(text, "DF6802", None);

        let found = cascade(observer.clone()).run(&ctx, &any).unwrap();
        assert_eq!(found.value, 18);
        assert_eq!(found.tier, SourceTier::Pattern);
        assert_eq!(
            observer.tiers_invoked("DF6802", Field::Quantity),
            vec![SourceTier::Tabular, SourceTier::Pattern]
        );
    }

    #[test]
    fn test_contextual_quantity_prefers_after_code() {
        let observer = Arc::new(RecordingObserver::new());
        let text = "6 pcs carried over\nDF6802 Stoneware Vase, packed 36 pcs per case";
        let ctx = CodeContext::new(text, "DF6802", None);

        let found = cascade(observer).run(&ctx, &any).unwrap();
        assert_eq!(found.value, 36);
        assert_eq!(found.tier, SourceTier::Contextual);
    }

    #[test]
    fn test_contextual_before_code_takes_nearest() {
        let observer = Arc::new(RecordingObserver::new());
        let text = "2 each sample\n12 each\nDF6802 Stoneware Vase";
        let ctx = CodeContext::new(text, "DF6802", None);

        let found = cascade(observer).run(&ctx, &any).unwrap();
        assert_eq!(found.value, 12);
    }

    #[test]
    fn test_accept_predicate_skips_values() {
        let observer = Arc::new(RecordingObserver::new());
        let text = "DF6802 Stoneware Vase Qty: 24\n";
        let ctx = CodeContext::new(text, "DF6802", None);

        let found = cascade(observer).run(&ctx, &|q: &i64| *q != 24);
        assert!(found.is_none());
    }
}
