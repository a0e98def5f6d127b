//! Embedding provider trait for generating vector embeddings from text.

use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap a specific sentence-embedding model. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) for each input; backends that support
/// native batching should override it.
///
/// Vectors do not have to be normalized; the index normalizes them.
///
/// # Example
///
/// ```rust,ignore
/// use studymate::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world")?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A short name used in logs and error messages.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Scale a vector to unit L2 norm in place.
///
/// Zero vectors are left unchanged.
pub fn normalize_l2(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}
