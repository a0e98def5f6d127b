//! Per-document semantic index.
//!
//! A [`DocumentIndex`] is built once from the full passage sequence of a
//! document and is read-only afterwards. It keeps the passages and the
//! embedding provider it was built with, so queries always embed with the
//! same model and resolve positions against the same passages.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::document::{Passage, SearchResult};
use crate::embedding::{EmbeddingProvider, normalize_l2};
use crate::error::{Result, StudyMateError};
use crate::inmemory::FlatIndex;

/// Default number of passages returned by a query.
pub const DEFAULT_TOP_K: usize = 5;

/// Embedded passages of one document, searchable by cosine similarity.
#[derive(Clone)]
pub struct DocumentIndex {
    passages: Arc<[Passage]>,
    vectors: FlatIndex,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl fmt::Debug for DocumentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentIndex")
            .field("passages", &self.passages.len())
            .field("dimensions", &self.vectors.dimensions())
            .field("embedder", &self.embedder.name())
            .finish()
    }
}

impl DocumentIndex {
    /// Embed every passage and build the index.
    ///
    /// Returns `Ok(None)` when there are no passages.
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::Index`] if embedding fails or the provider
    /// returns vectors of the wrong shape.
    pub fn build(
        embedder: Arc<dyn EmbeddingProvider>,
        passages: impl Into<Arc<[Passage]>>,
    ) -> Result<Option<Self>> {
        let passages: Arc<[Passage]> = passages.into();
        if passages.is_empty() {
            debug!("no passages, skipping index build");
            return Ok(None);
        }

        let texts: Vec<&str> = passages.iter().map(Passage::text).collect();
        let embeddings = embedder.embed_batch(&texts).map_err(|e| {
            error!(provider = embedder.name(), error = %e, "embedding failed during index build");
            StudyMateError::Index(format!("failed to embed passages: {e}"))
        })?;

        if embeddings.len() != passages.len() {
            return Err(StudyMateError::Index(format!(
                "embedding provider returned {} vectors for {} passages",
                embeddings.len(),
                passages.len()
            )));
        }

        let mut vectors = FlatIndex::new(embedder.dimensions());
        for mut embedding in embeddings {
            normalize_l2(&mut embedding);
            vectors.add(&embedding)?;
        }

        info!(
            passage_count = passages.len(),
            dimensions = vectors.dimensions(),
            provider = embedder.name(),
            "built document index"
        );

        Ok(Some(Self { passages, vectors, embedder }))
    }

    /// Retrieve the `top_k` passages most similar to `question`, best first.
    ///
    /// Returns every passage when `top_k` exceeds their number.
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::Index`] if the question cannot be embedded.
    pub fn query(&self, question: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let mut embedding = self.embedder.embed(question).map_err(|e| {
            error!(provider = self.embedder.name(), error = %e, "embedding failed during query");
            StudyMateError::Index(format!("failed to embed question: {e}"))
        })?;
        normalize_l2(&mut embedding);

        let results: Vec<SearchResult> = self
            .vectors
            .search(&embedding, top_k)?
            .into_iter()
            .map(|(position, score)| SearchResult {
                position,
                passage: self.passages[position].clone(),
                score,
            })
            .collect();

        debug!(top_k, result_count = results.len(), "index query completed");
        Ok(results)
    }

    /// The passages this index was built from, in document order.
    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    /// Shared handle to the indexed passages.
    pub fn shared_passages(&self) -> Arc<[Passage]> {
        Arc::clone(&self.passages)
    }

    /// Number of indexed passages.
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// Always `false`: empty documents never produce an index.
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Whether this index was built from exactly `passages`.
    pub fn covers(&self, passages: &[Passage]) -> bool {
        (std::ptr::eq(self.passages.as_ptr(), passages.as_ptr())
            && self.passages.len() == passages.len())
            || *self.passages == *passages
    }
}

/// Query an index that may be absent; an absent index yields no results.
pub fn query_optional(
    index: Option<&DocumentIndex>,
    question: &str,
    top_k: usize,
) -> Result<Vec<SearchResult>> {
    match index {
        Some(index) => index.query(question, top_k),
        None => Ok(Vec::new()),
    }
}
