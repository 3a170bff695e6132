//! Invoice header fields: invoice number and order date.

use chrono::NaiveDate;

use super::patterns::{DATE_LONG, DATE_MDY, DATE_YMD, INVOICE_DATE, INVOICE_NUMBER, INVOICE_NUMBER_NEXT_LINE, ORDER_DATE};
use super::{ExtractionMatch, FieldExtractor};
use crate::models::line_item::{SheetHeader, SourceTier};

/// Date extractor for US, ISO and long-form dates.
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DateExtractor {
    type Output = ExtractionMatch<NaiveDate>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    /// Dates in text order, each date once.
    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<Self::Output> = Vec::new();

        // MM/DD/YYYY or MM/DD/YY
        for caps in DATE_MDY.captures_iter(text) {
            let month: u32 = caps[1].parse().unwrap_or(0);
            let day: u32 = caps[2].parse().unwrap_or(0);
            let year = parse_year(&caps[3]);
            push_date(&mut results, NaiveDate::from_ymd_opt(year, month, day), caps.get(0));
        }

        // YYYY-MM-DD
        for caps in DATE_YMD.captures_iter(text) {
            let year: i32 = caps[1].parse().unwrap_or(0);
            let month: u32 = caps[2].parse().unwrap_or(0);
            let day: u32 = caps[3].parse().unwrap_or(0);
            push_date(&mut results, NaiveDate::from_ymd_opt(year, month, day), caps.get(0));
        }

        // "March 7, 2024"
        for caps in DATE_LONG.captures_iter(text) {
            let month = month_number(&caps[1]);
            let day: u32 = caps[2].parse().unwrap_or(0);
            let year: i32 = caps[3].parse().unwrap_or(0);
            push_date(&mut results, NaiveDate::from_ymd_opt(year, month, day), caps.get(0));
        }

        results.sort_by_key(|r| r.position.map(|(start, _)| start));
        results
    }
}

fn push_date(results: &mut Vec<ExtractionMatch<NaiveDate>>, date: Option<NaiveDate>, full: Option<regex::Match<'_>>) {
    let (Some(date), Some(full)) = (date, full) else {
        return;
    };
    if results.iter().any(|r| r.value == date) {
        return;
    }
    results.push(
        ExtractionMatch::new(date, SourceTier::Pattern, full.as_str()).with_position(full.start(), full.end()),
    );
}

/// Order date: the labeled order/PO date, then the invoice or ship date, then
/// the first date anywhere.
pub fn extract_order_date(text: &str) -> Option<NaiveDate> {
    let dates = DateExtractor::new();

    [&*ORDER_DATE, &*INVOICE_DATE]
        .iter()
        .filter_map(|label| label.captures(text))
        .find_map(|caps| dates.extract(&caps[1]))
        .or_else(|| dates.extract(text))
        .map(|m| m.value)
}

/// Invoice number from an "Invoice #" label, on the same or the next line.
pub fn extract_invoice_number(text: &str) -> Option<String> {
    INVOICE_NUMBER
        .captures(text)
        .or_else(|| INVOICE_NUMBER_NEXT_LINE.captures(text))
        .map(|caps| caps[1].to_string())
}

impl SheetHeader {
    /// Header fields read from document text, with the vendor supplied by the caller.
    pub fn from_text(text: &str, vendor_name: impl Into<String>) -> Self {
        Self {
            order_date: extract_order_date(text),
            vendor_name: vendor_name.into(),
            invoice_number: extract_invoice_number(text).unwrap_or_default(),
        }
    }
}

fn parse_year(s: &str) -> i32 {
    let year: i32 = s.parse().unwrap_or(0);
    if year < 100 { 2000 + year } else { year }
}

fn month_number(name: &str) -> u32 {
    match name.to_lowercase().get(..3) {
        Some("jan") => 1,
        Some("feb") => 2,
        Some("mar") => 3,
        Some("apr") => 4,
        Some("may") => 5,
        Some("jun") => 6,
        Some("jul") => 7,
        Some("aug") => 8,
        Some("sep") => 9,
        Some("oct") => 10,
        Some("nov") => 11,
        Some("dec") => 12,
        _ => 0,
    }
}
