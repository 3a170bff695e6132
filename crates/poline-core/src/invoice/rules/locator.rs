//! Product code location.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use super::patterns::PatternSet;
use super::FieldExtractor;

/// A located product code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeMatch {
    pub code: String,
    /// Name of the family whose pattern matched.
    pub family: String,
    pub start: usize,
    pub end: usize,
}

/// Finds product codes of every configured family.
pub struct ProductCodeLocator {
    patterns: Arc<PatternSet>,
}

impl ProductCodeLocator {
    pub fn new(patterns: Arc<PatternSet>) -> Self {
        Self { patterns }
    }

    /// Every family match in `text` in text order, with overlaps resolved in
    /// favour of the earlier configured family. Repeated codes are kept.
    pub fn locate_all(&self, text: &str) -> Vec<CodeMatch> {
        let mut matches: Vec<CodeMatch> = Vec::new();

        for family in &self.patterns.families {
            for m in family.regex.find_iter(text) {
                let overlaps = matches.iter().any(|existing| m.start() < existing.end && existing.start < m.end());
                if overlaps || m.as_str().is_empty() {
                    continue;
                }
                matches.push(CodeMatch {
                    code: m.as_str().to_string(),
                    family: family.name.clone(),
                    start: m.start(),
                    end: m.end(),
                });
            }
        }

        matches.sort_by_key(|m| m.start);
        matches
    }

    /// Codes from `mentions` that the locator recognizes.
    ///
    /// Mentions come from the upstream entity extractor and are used only as
    /// hints: a code is confirmed when a mention contains it.
    pub fn confirmed_codes<'a, I>(&self, mentions: I) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        mentions
            .into_iter()
            .flat_map(|mention| self.extract_all(mention))
            .map(|m| m.code)
            .collect()
    }
}

impl FieldExtractor for ProductCodeLocator {
    type Output = CodeMatch;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.locate_all(text).into_iter().next()
    }

    /// Unique codes in order of first occurrence.
    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut seen = HashSet::new();
        self.locate_all(text)
            .into_iter()
            .filter(|m| seen.insert(m.code.clone()))
            .collect()
    }
}
