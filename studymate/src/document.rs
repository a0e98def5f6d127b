//! Data types for passages, search results, and answers.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// A cleaned unit of document text, the atomic retrieval item.
///
/// Passages produced by the extractor have their whitespace collapsed and
/// meet the configured minimum length; the single fallback passage returned
/// for documents without a qualifying paragraph keeps the raw text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Passage(String);

impl Passage {
    /// Wrap a piece of text as a passage.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The passage text.
    pub fn text(&self) -> &str {
        &self.0
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    /// Consume the passage, returning its text.
    pub fn into_text(self) -> String {
        self.0
    }
}

impl Deref for Passage {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Passage {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Passage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Passage {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Passage {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// A retrieved [`Passage`] paired with its position and relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// Index of the passage in document order.
    pub position: usize,
    /// The retrieved passage.
    pub passage: Passage,
    /// Cosine similarity to the question (higher is more relevant).
    pub score: f32,
}

/// A generated answer and the passages it was conditioned on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    /// Answer text shown to the user.
    pub text: String,
    /// Passages used as context, in ranked order. Empty when nothing was retrieved.
    pub sources: Vec<SearchResult>,
}

impl Answer {
    /// An answer that was not backed by any retrieved passage.
    pub fn without_sources(text: impl Into<String>) -> Self {
        Self { text: text.into(), sources: Vec::new() }
    }

    /// Iterate over the source passages in ranked order.
    pub fn source_passages(&self) -> impl Iterator<Item = &Passage> {
        self.sources.iter().map(|r| &r.passage)
    }
}
