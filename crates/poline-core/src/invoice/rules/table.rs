//! Line-item table rows: header layouts and row parsing.
//!
//! Two row layouts are handled:
//! - **Delimited**: cells separated by `|` or tabs. When a delimited header
//!   with the same cell count is present, cells are mapped by column position.
//! - **Column-count heuristic**: cells (or whitespace tokens) are read from the
//!   right: trailing currency values are prices, an optional unit of measure,
//!   then up to four quantity columns; what remains after the code and UPC is
//!   the description.

use rust_decimal::Decimal;

use super::amounts::parse_currency;
use super::patterns::{PatternSet, PRICE_TOKEN, UPC_CODE};
use super::quantity::QuantityColumns;
use super::clean_cell;

/// Semantic role of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Code,
    Upc,
    Description,
    Ordered,
    Allocated,
    Shipped,
    Backordered,
    Unit,
    ListPrice,
    YourPrice,
    Extended,
    Other,
}

impl ColumnKind {
    /// Classify a header cell.
    pub fn classify(cell: &str) -> Self {
        let c = cell.trim().to_lowercase();
        let has = |s: &str| c.contains(s);

        if c.is_empty() {
            ColumnKind::Other
        } else if has("upc") || has("barcode") {
            ColumnKind::Upc
        } else if has("desc") {
            ColumnKind::Description
        } else if has("ext") || has("amount") || has("total") {
            ColumnKind::Extended
        } else if has("list") {
            ColumnKind::ListPrice
        } else if has("price") || has("cost") {
            ColumnKind::YourPrice
        } else if has("back") || has("bkord") || has("b/o") || c == "bo" {
            ColumnKind::Backordered
        } else if has("alloc") {
            ColumnKind::Allocated
        } else if has("ord") {
            ColumnKind::Ordered
        } else if has("ship") || has("qty") || has("quantity") {
            ColumnKind::Shipped
        } else if has("u/m") || has("uom") || c == "unit" || c == "um" {
            ColumnKind::Unit
        } else if has("item") || has("sku") || has("code") || has("product") || has("style") {
            ColumnKind::Code
        } else {
            ColumnKind::Other
        }
    }

    fn is_quantity(&self) -> bool {
        matches!(
            self,
            ColumnKind::Ordered | ColumnKind::Allocated | ColumnKind::Shipped | ColumnKind::Backordered
        )
    }
}

/// Column positions taken from a delimited header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    columns: Vec<ColumnKind>,
}

impl ColumnLayout {
    pub fn new(columns: Vec<ColumnKind>) -> Self {
        Self { columns }
    }

    /// Find the first delimited header line in `text` naming a price column.
    pub fn detect(text: &str, patterns: &PatternSet) -> Option<Self> {
        text.lines()
            .filter(|line| patterns.is_header_line(line))
            .filter_map(|line| split_delimited(line))
            .map(|cells| Self::new(cells.iter().map(|c| ColumnKind::classify(c)).collect()))
            .find(|layout| layout.position(ColumnKind::YourPrice).is_some() && layout.has_quantity())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[ColumnKind] {
        &self.columns
    }

    /// Index of the first column of `kind`.
    pub fn position(&self, kind: ColumnKind) -> Option<usize> {
        self.columns.iter().position(|c| *c == kind)
    }

    fn has_quantity(&self) -> bool {
        self.columns.iter().any(|c| c.is_quantity())
    }
}

/// A parsed line-item row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableRow {
    pub code: String,
    pub upc: Option<String>,
    pub description: Option<String>,
    pub quantities: QuantityColumns,
    /// Number of quantity columns present in the row.
    pub quantity_columns: usize,
    pub unit: Option<String>,
    pub list_price: Option<Decimal>,
    pub your_price: Option<Decimal>,
    pub extended: Option<Decimal>,
}

impl TableRow {
    /// Parse `line` as the row for `code`.
    ///
    /// Returns `None` when the line does not contain the code as a cell or token,
    /// or when neither a price nor a quantity column can be found.
    pub fn parse(line: &str, code: &str, layout: Option<&ColumnLayout>, patterns: &PatternSet) -> Option<Self> {
        let (cells, delimited) = match split_delimited(line) {
            Some(cells) => (cells, true),
            None => (line.split_whitespace().map(str::to_string).collect(), false),
        };

        if let (true, Some(layout)) = (delimited, layout) {
            if cells.len() == layout.len() {
                if let Some(row) = Self::parse_with_layout(&cells, code, layout) {
                    return Some(row);
                }
            }
        }

        let tokens = expand_code_cell(cells, code)?;
        Self::parse_by_count(&tokens, code, patterns)
    }

    fn parse_with_layout(cells: &[String], code: &str, layout: &ColumnLayout) -> Option<Self> {
        let code_index = layout.position(ColumnKind::Code)?;
        if cells.get(code_index)?.trim() != code {
            return None;
        }

        let mut row = TableRow {
            code: code.to_string(),
            ..Default::default()
        };

        for (kind, cell) in layout.columns().iter().zip(cells) {
            let cell = cell.trim();
            match kind {
                ColumnKind::Upc => row.upc = UPC_CODE.captures(cell).map(|c| c[1].to_string()),
                ColumnKind::Description => {
                    let text = clean_cell(cell);
                    row.description = (!text.is_empty()).then_some(text);
                }
                ColumnKind::Ordered => row.quantities.ordered = parse_quantity_token(cell),
                ColumnKind::Allocated => row.quantities.allocated = parse_quantity_token(cell),
                ColumnKind::Shipped => row.quantities.shipped = parse_quantity_token(cell),
                ColumnKind::Backordered => row.quantities.backordered = parse_quantity_token(cell),
                ColumnKind::Unit => row.unit = (!cell.is_empty()).then(|| cell.to_string()),
                ColumnKind::ListPrice => row.list_price = parse_currency(cell),
                ColumnKind::YourPrice => row.your_price = parse_currency(cell),
                ColumnKind::Extended => row.extended = parse_currency(cell),
                ColumnKind::Code | ColumnKind::Other => {}
            }
        }

        row.quantity_columns = layout.columns().iter().filter(|c| c.is_quantity()).count();
        Some(row)
    }

    fn parse_by_count(tokens: &[String], code: &str, patterns: &PatternSet) -> Option<Self> {
        let code_index = tokens.iter().position(|t| t == code)?;
        let mut rest: Vec<&str> = tokens[code_index + 1..]
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();

        let mut prices = Vec::new();
        while prices.len() < 3 {
            match rest.last() {
                Some(t) if PRICE_TOKEN.is_match(t) => {
                    prices.push(parse_currency(t)?);
                    rest.pop();
                }
                _ => break,
            }
        }
        prices.reverse();

        let unit = match rest.last() {
            Some(t) if patterns.is_unit(t) => {
                let unit = t.to_string();
                rest.pop();
                Some(unit)
            }
            _ => None,
        };

        let mut quantities = Vec::new();
        while quantities.len() < 4 {
            match rest.last() {
                Some(t) if is_quantity_token(t) => {
                    quantities.push(parse_quantity_token(t));
                    rest.pop();
                }
                _ => break,
            }
        }
        quantities.reverse();

        if prices.is_empty() && quantities.is_empty() {
            return None;
        }

        let upc = match rest.first() {
            Some(t) if UPC_CODE.is_match(t) && t.len() == 12 => {
                let upc = t.to_string();
                rest.remove(0);
                Some(upc)
            }
            _ => None,
        };

        let description = clean_cell(&rest.join(" "));
        let quantities_resolved = QuantityColumns::from_count(&quantities);

        let mut row = TableRow {
            code: code.to_string(),
            upc,
            description: (!description.is_empty()).then_some(description),
            quantities: quantities_resolved,
            quantity_columns: quantities.len(),
            unit,
            ..Default::default()
        };
        row.assign_prices(&prices);
        Some(row)
    }

    fn assign_prices(&mut self, prices: &[Decimal]) {
        match *prices {
            [list, your, extended] => {
                self.list_price = Some(list);
                self.your_price = Some(your);
                self.extended = Some(extended);
            }
            [first, second] => {
                let quantity = Decimal::from(self.quantities.resolve().max(0));
                let tolerance = Decimal::new(2, 2);
                if !quantity.is_zero() && (first * quantity - second).abs() <= tolerance {
                    self.your_price = Some(first);
                    self.extended = Some(second);
                } else if second < first {
                    self.list_price = Some(first);
                    self.your_price = Some(second);
                } else {
                    self.your_price = Some(first);
                    self.extended = Some(second);
                }
            }
            [only] => self.your_price = Some(only),
            _ => {}
        }
    }
}

/// Split a `|`/tab delimited line into cells, or `None` when it has no delimiters.
fn split_delimited(line: &str) -> Option<Vec<String>> {
    if !line.contains('|') && !line.contains('\t') {
        return None;
    }

    let mut cells: Vec<String> = line
        .split(['|', '\t'])
        .map(|c| c.trim().to_string())
        .collect();

    // "| a | b |" leaves empty edge cells
    if cells.first().is_some_and(|c| c.is_empty()) {
        cells.remove(0);
    }
    if cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }

    // Runs of delimiters used for alignment
    cells.retain(|c| !c.is_empty());
    Some(cells)
}

/// Make sure the code is a cell of its own, splitting the cell that holds it.
fn expand_code_cell(cells: Vec<String>, code: &str) -> Option<Vec<String>> {
    if cells.iter().any(|c| c == code) {
        return Some(cells);
    }

    let index = cells
        .iter()
        .position(|c| c.split_whitespace().any(|t| t == code))?;

    let mut out = Vec::with_capacity(cells.len() + 4);
    out.extend(cells[..index].iter().cloned());
    let mut tokens = cells[index].split_whitespace();
    for token in tokens.by_ref() {
        out.push(token.to_string());
        if token == code {
            break;
        }
    }
    let remainder = tokens.collect::<Vec<_>>().join(" ");
    if !remainder.is_empty() {
        out.push(remainder);
    }
    out.extend(cells[index + 1..].iter().cloned());
    Some(out)
}

/// Whether a token can sit in a quantity column, including OCR-damaged values.
pub fn is_quantity_token(token: &str) -> bool {
    let token = token.trim();
    if token.len() <= 7 && token.parse::<i64>().is_ok() {
        return true;
    }
    if matches!(token, "-" | "--" | "—" | "O" | "o") {
        return true;
    }
    token.len() <= 6
        && token.chars().any(|c| c.is_ascii_digit())
        && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Parse a quantity cell; anything malformed counts as zero.
pub fn parse_quantity_token(token: &str) -> i64 {
    token.trim().replace(',', "").parse::<i64>().unwrap_or(0)
}
