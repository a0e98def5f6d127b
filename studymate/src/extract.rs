//! PDF content extractor.
//!
//! Uses pdf-extract to lay out the text of every page, then hands the
//! concatenated text to a [`ParagraphChunker`]. Layout gaps between text
//! blocks come back as blank lines, which is where paragraphs are split.

use std::panic;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::chunking::{Chunker, ParagraphChunker};
use crate::document::Passage;
use crate::error::{Result, StudyMateError};

/// Separator appended after the text of every page.
const PAGE_SEPARATOR: char = '\n';

/// Extracts passages from PDF documents.
///
/// The infallible [`extract_path`](PdfExtractor::extract_path) and
/// [`extract_bytes`](PdfExtractor::extract_bytes) turn unreadable input into an
/// empty passage list, which callers report as "no content extracted". The
/// `try_` variants return the underlying [`StudyMateError::Extraction`].
///
/// # Example
///
/// ```rust,ignore
/// use studymate::PdfExtractor;
///
/// let extractor = PdfExtractor::new(50);
/// let passages = extractor.extract_path("lecture-notes.pdf");
/// ```
#[derive(Debug, Clone, Default)]
pub struct PdfExtractor {
    chunker: ParagraphChunker,
}

impl PdfExtractor {
    /// Create an extractor that keeps paragraphs of at least `min_length` characters.
    pub fn new(min_length: usize) -> Self {
        Self { chunker: ParagraphChunker::new(min_length) }
    }

    /// The minimum passage length in characters.
    pub fn min_length(&self) -> usize {
        self.chunker.min_length()
    }

    /// Extract passages from a PDF file, returning an empty list on failure.
    pub fn extract_path(&self, path: impl AsRef<Path>) -> Vec<Passage> {
        let path = path.as_ref();
        self.try_extract_path(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "failed to extract PDF");
            Vec::new()
        })
    }

    /// Extract passages from an in-memory PDF, returning an empty list on failure.
    pub fn extract_bytes(&self, bytes: &[u8]) -> Vec<Passage> {
        self.try_extract_bytes(bytes).unwrap_or_else(|e| {
            warn!(byte_len = bytes.len(), error = %e, "failed to extract PDF");
            Vec::new()
        })
    }

    /// Extract passages from a PDF file.
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::Extraction`] if the file cannot be opened or parsed.
    pub fn try_extract_path(&self, path: impl AsRef<Path>) -> Result<Vec<Passage>> {
        let path = path.as_ref();
        debug!(path = %path.display(), "extracting PDF");
        let bytes = std::fs::read(path).map_err(|e| {
            StudyMateError::Extraction(format!("cannot open {}: {e}", path.display()))
        })?;
        self.try_extract_bytes(&bytes)
    }

    /// Extract passages from an in-memory PDF.
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::Extraction`] if the bytes are not a readable PDF.
    pub fn try_extract_bytes(&self, bytes: &[u8]) -> Result<Vec<Passage>> {
        debug!(byte_len = bytes.len(), "extracting PDF from memory");
        let text = document_text(bytes)?;
        let passages = self.chunker.chunk(&text);
        info!(passage_count = passages.len(), text_len = text.len(), "extracted passages");
        Ok(passages)
    }
}

/// Lay out the text of every page in page order, one separator after each page.
///
/// # Errors
///
/// Returns [`StudyMateError::Extraction`] if the bytes cannot be parsed. A
/// parser panic on malformed content is reported the same way.
pub fn document_text(bytes: &[u8]) -> Result<String> {
    let pages = panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| StudyMateError::Extraction("PDF parser aborted on malformed input".into()))?
        .map_err(|e| StudyMateError::Extraction(format!("cannot parse PDF: {e}")))?;

    let mut text = String::new();
    for page_text in &pages {
        text.push_str(page_text);
        text.push(PAGE_SEPARATOR);
    }

    debug!(page_count = pages.len(), text_len = text.len(), "collected page text");
    Ok(text)
}
