//! In-memory exact inner-product vector store.
//!
//! This module provides [`FlatIndex`], a brute-force index over a contiguous
//! row-major buffer. With unit-normalized rows and queries the inner product
//! is the cosine similarity.

use crate::error::{Result, StudyMateError};

/// An in-memory vector store with exact inner-product search.
///
/// Rows are identified by their insertion position. Search is deterministic:
/// equal scores are ordered by ascending position.
///
/// # Example
///
/// ```rust,ignore
/// use studymate::FlatIndex;
///
/// let mut index = FlatIndex::new(384);
/// index.add(&embedding)?;
/// let hits = index.search(&query, 5)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimensions: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create a new empty index for vectors of the given dimension.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, data: Vec::new() }
    }

    /// Vector dimension.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dimensions == 0 { 0 } else { self.data.len() / self.dimensions }
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector; its position is the previous [`len`](FlatIndex::len).
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::Index`] if the dimension does not match.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize> {
        self.check_dimensions(vector)?;
        let position = self.len();
        self.data.extend_from_slice(vector);
        Ok(position)
    }

    /// Return up to `top_k` `(position, score)` pairs by descending inner product.
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::Index`] if the query dimension does not match.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(usize, f32)>> {
        self.check_dimensions(query)?;
        if top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimensions)
            .map(|row| inner_product(row, query))
            .enumerate()
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);
        Ok(scored)
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(StudyMateError::Index(format!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(())
    }
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_by_descending_score() {
        let mut index = FlatIndex::new(2);
        index.add(&[1.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0]).unwrap();
        index.add(&[0.6, 0.8]).unwrap();

        let hits = index.search(&[0.0, 1.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, vec![1, 2, 0]);
    }

    #[test]
    fn ties_break_by_position() {
        let mut index = FlatIndex::new(2);
        for _ in 0..3 {
            index.add(&[0.6, 0.8]).unwrap();
        }
        let hits = index.search(&[0.6, 0.8], 2).unwrap();
        assert_eq!(hits.iter().map(|(p, _)| *p).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn top_k_larger_than_index_returns_all() {
        let mut index = FlatIndex::new(1);
        index.add(&[1.0]).unwrap();
        assert_eq!(index.search(&[1.0], 10).unwrap().len(), 1);
        assert!(index.search(&[1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let mut index = FlatIndex::new(3);
        assert!(matches!(index.add(&[1.0]), Err(StudyMateError::Index(_))));
        assert!(index.search(&[1.0, 2.0], 1).is_err());
    }
}
