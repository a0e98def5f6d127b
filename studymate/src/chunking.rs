//! Splitting extracted text into passages.
//!
//! This module provides the [`Chunker`] trait and [`ParagraphChunker`], which
//! splits at blank lines, normalizes whitespace and drops short fragments.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::document::Passage;

/// A blank line: a newline, optional whitespace, another newline.
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph regex"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// A strategy for splitting document text into passages.
pub trait Chunker: Send + Sync {
    /// Split text into passages in document order.
    ///
    /// Returns an empty `Vec` if the text is blank.
    fn chunk(&self, text: &str) -> Vec<Passage>;
}

/// Splits text into paragraphs at blank-line boundaries.
///
/// Each paragraph has every whitespace run collapsed to a single space and is
/// trimmed. Paragraphs shorter than `min_length` characters are discarded. If
/// that discards everything, the untouched input is returned as the only
/// passage so that a document with any text at all stays answerable.
///
/// # Example
///
/// ```rust,ignore
/// use studymate::ParagraphChunker;
///
/// let chunker = ParagraphChunker::new(50);
/// let passages = chunker.chunk(&full_text);
/// ```
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    min_length: usize,
}

impl ParagraphChunker {
    /// Create a new `ParagraphChunker`.
    ///
    /// # Arguments
    ///
    /// * `min_length`: minimum number of characters a paragraph needs to be kept
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    /// The minimum paragraph length in characters.
    pub fn min_length(&self) -> usize {
        self.min_length
    }
}

impl Default for ParagraphChunker {
    fn default() -> Self {
        Self::new(50)
    }
}

/// Collapse whitespace runs to single spaces and trim both ends.
fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, text: &str) -> Vec<Passage> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let passages: Vec<Passage> = PARAGRAPH_BREAK
            .split(text)
            .map(normalize_whitespace)
            .filter(|p| p.chars().count() >= self.min_length)
            .map(Passage::from)
            .collect();

        if passages.is_empty() {
            debug!(
                min_length = self.min_length,
                text_len = text.len(),
                "no paragraph met the minimum length, keeping full text"
            );
            return vec![Passage::new(text)];
        }

        debug!(passage_count = passages.len(), "split text into passages");
        passages
    }
}
