//! Error types for the `studymate` crate.

use thiserror::Error;

/// Errors that can occur while extracting, indexing or answering.
#[derive(Debug, Error)]
pub enum StudyMateError {
    /// The document could not be opened or parsed.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The document index could not be built or queried.
    #[error("Index error: {0}")]
    Index(String),

    /// The index was built from a different passage sequence than the one supplied.
    #[error("Stale index: built from {indexed} passages, queried with {supplied}")]
    StaleIndex {
        /// Number of passages the index was built from.
        indexed: usize,
        /// Number of passages supplied with the query.
        supplied: usize,
    },

    /// The language model or its tokenizer could not be loaded.
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    /// An error occurred while generating an answer.
    #[error("Generation error: {0}")]
    Generation(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error while staging an upload.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A convenience result type for StudyMate operations.
pub type Result<T> = std::result::Result<T, StudyMateError>;
