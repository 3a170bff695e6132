//! Line item data models and spreadsheet row rendering.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::invoice::rules::amounts::format_currency;

/// Extraction strategy that produced a value, in cascade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    /// Column position in a table row.
    Tabular,
    /// Explicit textual pattern near the code.
    Pattern,
    /// First plausible value in a wide window around the code.
    Contextual,
}

impl SourceTier {
    pub fn name(&self) -> &'static str {
        match self {
            SourceTier::Tabular => "tabular",
            SourceTier::Pattern => "pattern",
            SourceTier::Contextual => "contextual",
        }
    }

    /// The next, more permissive tier.
    pub fn next(&self) -> Option<SourceTier> {
        match self {
            SourceTier::Tabular => Some(SourceTier::Pattern),
            SourceTier::Pattern => Some(SourceTier::Contextual),
            SourceTier::Contextual => None,
        }
    }
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Non-fatal observation attached to an accepted line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationFlag {
    /// Quantity exceeds the family ceiling.
    AboveFamilyCeiling { ceiling: u32 },
    /// Quantity is not a multiple of the family case pack.
    NotCasePackMultiple { case_pack: u32 },
    /// Quantity exceeds the usual range for the family.
    AboveTypicalRange { typical_max: u32 },
    /// Placeholder-valued price accepted because of discount context.
    DiscountedPlaceholderPrice,
}

/// One validated invoice row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Vendor product code; unique within a document.
    pub product_code: String,

    /// 12-digit UPC when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upc: Option<String>,

    /// `"<code> - UPC: <upc> - <text>"`, always containing the code.
    pub description: String,

    /// Wholesale unit price, two fractional digits.
    pub unit_price: Decimal,

    /// Resolved real-world quantity.
    pub quantity: u32,

    /// Weakest tier that contributed the price or the quantity.
    pub source_tier: SourceTier,

    /// Diagnostics only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<ValidationFlag>,
}

impl LineItem {
    /// The (price, quantity) pair used by placeholder detection.
    pub fn pair(&self) -> (Decimal, u32) {
        (self.unit_price.normalize(), self.quantity)
    }

    /// Render the spreadsheet row for this item.
    pub fn to_row(&self, header: &SheetHeader) -> SheetRow {
        SheetRow {
            order_date: header
                .order_date
                .map(|d| d.format("%m/%d/%Y").to_string())
                .unwrap_or_default(),
            vendor_name: header.vendor_name.clone(),
            invoice_number: header.invoice_number.clone(),
            description: self.description.clone(),
            unit_price: format_currency(self.unit_price),
            quantity: self.quantity.to_string(),
        }
    }
}

/// Document-level fields supplied alongside the line items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetHeader {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_date: Option<NaiveDate>,
    pub vendor_name: String,
    pub invoice_number: String,
}

/// Six-field row consumed by the spreadsheet writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetRow {
    pub order_date: String,
    pub vendor_name: String,
    pub invoice_number: String,
    pub description: String,
    pub unit_price: String,
    pub quantity: String,
}

impl SheetRow {
    /// Column titles in field order.
    pub const HEADERS: [&'static str; 6] = [
        "Order Date",
        "Vendor",
        "Invoice Number",
        "Description",
        "Unit Price",
        "Quantity",
    ];

    pub fn fields(&self) -> [&str; 6] {
        [
            self.order_date.as_str(),
            self.vendor_name.as_str(),
            self.invoice_number.as_str(),
            self.description.as_str(),
            self.unit_price.as_str(),
            self.quantity.as_str(),
        ]
    }
}

/// Rows for every item, in order.
pub fn sheet_rows(items: &[LineItem], header: &SheetHeader) -> Vec<SheetRow> {
    items.iter().map(|item| item.to_row(header)).collect()
}
