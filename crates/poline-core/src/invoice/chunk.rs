//! Page chunks: bounded slices of a document processed one at a time.

use std::ops::Range;

use crate::error::ChunkError;
use crate::invoice::rules::slice_window;
use crate::models::config::ProcessingConfig;
use crate::models::document::Document;

/// Split `page_count` pages into consecutive chunk ranges.
pub fn plan_chunks(page_count: usize, config: &ProcessingConfig) -> Vec<Range<usize>> {
    if page_count == 0 {
        return Vec::new();
    }

    let size = config.chunk_size(page_count).max(1);
    (0..page_count)
        .step_by(size)
        .map(|start| start..(start + size).min(page_count))
        .collect()
}

/// Text of a run of pages, plus the leading lines of the page after it.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub index: usize,
    pub pages: Range<usize>,
    text: String,
    /// Pages of this chunk that could not be read.
    pub failed_pages: Vec<ChunkError>,
}

impl DocumentChunk {
    /// Assemble the chunk text for `pages` of `document`.
    ///
    /// Unreadable pages are skipped and recorded; the chunk itself fails only
    /// when none of its pages can be read.
    pub fn load(document: &Document, index: usize, pages: Range<usize>, overlap: usize) -> Result<Self, ChunkError> {
        let mut text = String::new();
        let mut failed_pages = Vec::new();
        let mut readable = 0;

        for page in pages.clone() {
            match document.page_text(page) {
                Ok(page_text) => {
                    if readable > 0 {
                        text.push('\n');
                    }
                    text.push_str(&page_text);
                    readable += 1;
                }
                Err(error) => failed_pages.push(error),
            }
        }

        if readable == 0 {
            return Err(ChunkError::NoReadablePages { chunk: index });
        }

        if overlap > 0 && pages.end < document.page_count() {
            if let Ok(next) = document.page_text(pages.end) {
                let lead = leading_lines(&next, overlap);
                if !lead.is_empty() {
                    text.push('\n');
                    text.push_str(lead);
                }
            }
        }

        Ok(Self {
            index,
            pages,
            text,
            failed_pages,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Drop the text buffer once the chunk's candidates are extracted.
    pub fn release(&mut self) {
        self.text.clear();
        self.text.shrink_to_fit();
    }

    pub fn is_released(&self) -> bool {
        self.text.is_empty()
    }
}

/// Whole lines within the first `limit` bytes of `text`; a single longer first
/// line is cut at `limit`.
fn leading_lines(text: &str, limit: usize) -> &str {
    let head = slice_window(text, 0, limit);
    if head.len() == text.len() {
        return head;
    }
    match head.rfind('\n') {
        Some(end) => &head[..end],
        None => head,
    }
}
