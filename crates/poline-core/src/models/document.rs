//! Upstream OCR document structure: full text, page spans and entity hints.

use std::borrow::Cow;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ChunkError, Result};

/// Page break used by plain-text exports.
pub const FORM_FEED: char = '\u{000c}';

/// Byte range into [`Document::text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// One page of the document, described by its spans into the full text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number as reported upstream.
    #[serde(default)]
    pub page_number: usize,

    /// Text segments belonging to this page, in reading order.
    #[serde(default)]
    pub spans: Vec<TextSpan>,
}

/// Entity hint reported by the upstream service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: String,

    #[serde(default)]
    pub mention_text: String,
}

impl Entity {
    /// Whether the upstream service classified this entity as a line item.
    pub fn is_line_item(&self) -> bool {
        let kind = self.entity_type.to_ascii_lowercase();
        kind.contains("line_item") || kind.contains("lineitem")
    }
}

/// A document as produced by the OCR/entity-extraction service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Full machine-readable text.
    pub text: String,

    /// Ordered pages. Empty means the whole text is a single page.
    #[serde(default)]
    pub pages: Vec<Page>,

    /// Optional hints; never required for correctness.
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl Document {
    /// Single-page document.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let pages = vec![Page {
            page_number: 1,
            spans: vec![TextSpan::new(0, text.len())],
        }];
        Self {
            text,
            pages,
            entities: Vec::new(),
        }
    }

    /// Build a document from per-page text, joining pages with a newline.
    pub fn from_pages<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        let mut out = Vec::new();

        for (index, page) in pages.into_iter().enumerate() {
            if index > 0 {
                text.push('\n');
            }
            let start = text.len();
            text.push_str(page.as_ref());
            out.push(Page {
                page_number: index + 1,
                spans: vec![TextSpan::new(start, text.len())],
            });
        }

        Self {
            text,
            pages: out,
            entities: Vec::new(),
        }
    }

    /// Split plain text on form feeds into pages.
    pub fn from_form_feed(text: &str) -> Self {
        Self::from_pages(text.split(FORM_FEED))
    }

    /// Load a JSON document exported by the upstream service.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a document from disk: `.json` as the upstream format, anything else
    /// as plain text with form-feed page breaks.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&content)
        } else {
            Ok(Self::from_form_feed(&content))
        }
    }

    pub fn with_entities(mut self, entities: Vec<Entity>) -> Self {
        self.entities = entities;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Number of pages, counting a page-less document with text as one page.
    pub fn page_count(&self) -> usize {
        if self.pages.is_empty() {
            usize::from(!self.text.is_empty())
        } else {
            self.pages.len()
        }
    }

    /// Text of the page at `index` (0-based).
    pub fn page_text(&self, index: usize) -> std::result::Result<Cow<'_, str>, ChunkError> {
        if self.pages.is_empty() {
            return if index == 0 {
                Ok(Cow::Borrowed(self.text.as_str()))
            } else {
                Err(ChunkError::MissingPage(index))
            };
        }

        let page = self.pages.get(index).ok_or(ChunkError::MissingPage(index))?;
        let mut segments = Vec::with_capacity(page.spans.len());

        for span in &page.spans {
            let segment = self
                .text
                .get(span.start..span.end)
                .ok_or(ChunkError::InvalidSpan {
                    page: index,
                    start: span.start,
                    end: span.end,
                    len: self.text.len(),
                })?;
            segments.push(segment);
        }

        Ok(match segments.as_slice() {
            [] => Cow::Borrowed(""),
            [single] => Cow::Borrowed(*single),
            _ => Cow::Owned(segments.concat()),
        })
    }

    /// Mention texts of line-item entities.
    pub fn line_item_mentions(&self) -> impl Iterator<Item = &str> {
        self.entities
            .iter()
            .filter(|e| e.is_line_item())
            .map(|e| e.mention_text.as_str())
    }
}
