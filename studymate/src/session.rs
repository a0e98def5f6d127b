//! Per-user document session.
//!
//! A [`Session`] keeps the passages and index of the currently loaded
//! document and turns pipeline results into user-facing outcomes.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::document::{Answer, Passage};
use crate::error::Result;
use crate::index::DocumentIndex;
use crate::pipeline::QaPipeline;

/// Status shown once a document is ready for questions.
pub const READY_MESSAGE: &str = "Document processed! You can now ask questions.";

/// Status shown when a document yielded no passages.
pub const NO_CONTENT_MESSAGE: &str =
    "Could not extract any content from the PDF. Please check the file.";

/// Warning shown for a blank question.
pub const BLANK_QUESTION_MESSAGE: &str = "Please enter a question to get an answer.";

/// Result of [`Session::upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The document was indexed and questions can be asked.
    Ready {
        /// Number of passages extracted.
        passage_count: usize,
    },
    /// The same document is already loaded; nothing was done.
    Unchanged,
    /// No passages could be extracted.
    NoContent,
    /// Processing failed with the given error message.
    Failed(String),
}

impl UploadOutcome {
    /// Status line for the user.
    pub fn message(&self) -> String {
        match self {
            Self::Ready { .. } | Self::Unchanged => READY_MESSAGE.to_string(),
            Self::NoContent => NO_CONTENT_MESSAGE.to_string(),
            Self::Failed(error) => format!("An error occurred during processing: {error}"),
        }
    }

    /// Whether the session can answer questions after this upload.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. } | Self::Unchanged)
    }
}

/// Result of [`Session::ask`].
#[derive(Debug, Clone, PartialEq)]
pub enum AskOutcome {
    /// The question was rejected before reaching the pipeline.
    Warning(String),
    /// An answer with the passages it was based on.
    Answered(Answer),
    /// Retrieval or generation failed with the given error message.
    Failed(String),
}

/// Document state for one user, threaded into every pipeline call.
#[derive(Debug)]
pub struct Session {
    pipeline: QaPipeline,
    /// Shared with `index`, never a separate copy.
    passages: Arc<[Passage]>,
    index: Option<DocumentIndex>,
    loaded_name: Option<String>,
}

impl Session {
    /// Start an empty session.
    pub fn new(pipeline: QaPipeline) -> Self {
        Self { pipeline, passages: Arc::from(Vec::new()), index: None, loaded_name: None }
    }

    /// The pipeline this session runs on.
    pub fn pipeline(&self) -> &QaPipeline {
        &self.pipeline
    }

    /// Passages of the loaded document.
    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    /// Index of the loaded document, if any.
    pub fn index(&self) -> Option<&DocumentIndex> {
        self.index.as_ref()
    }

    /// Name of the loaded document, if any.
    pub fn loaded_name(&self) -> Option<&str> {
        self.loaded_name.as_deref()
    }

    /// Whether a document is loaded and indexed.
    pub fn is_ready(&self) -> bool {
        self.index.is_some()
    }

    /// Process an uploaded PDF.
    ///
    /// The bytes are staged in a temporary file that is removed before this
    /// returns. Uploading the document that is already loaded again is a no-op.
    pub fn upload(&mut self, name: &str, bytes: &[u8]) -> UploadOutcome {
        if self.loaded_name.as_deref() == Some(name) && self.is_ready() {
            debug!(name, "document already loaded");
            return UploadOutcome::Unchanged;
        }

        let outcome = match stage(bytes) {
            Ok(staged) => self.load(staged.path()),
            Err(e) => Err(e),
        };
        self.finish_upload(name, outcome)
    }

    /// Process a PDF already on disk, identified by its path.
    pub fn upload_path(&mut self, path: impl AsRef<Path>) -> UploadOutcome {
        let path = path.as_ref();
        let name = path.display().to_string();
        if self.loaded_name.as_deref() == Some(name.as_str()) && self.is_ready() {
            debug!(name, "document already loaded");
            return UploadOutcome::Unchanged;
        }

        let outcome = self.load(path);
        self.finish_upload(&name, outcome)
    }

    /// Answer a question about the loaded document.
    pub fn ask(&self, question: &str) -> AskOutcome {
        let question = question.trim();
        if question.is_empty() {
            return AskOutcome::Warning(BLANK_QUESTION_MESSAGE.to_string());
        }

        match self.pipeline.ask(question, &self.passages, self.index.as_ref()) {
            Ok(answer) => AskOutcome::Answered(answer),
            Err(e) => {
                warn!(error = %e, "failed to answer question");
                AskOutcome::Failed(e.to_string())
            }
        }
    }

    /// Forget the loaded document.
    pub fn reset(&mut self) {
        self.passages = Arc::from(Vec::new());
        self.index = None;
        self.loaded_name = None;
    }

    fn load(&self, path: &Path) -> Result<Option<DocumentIndex>> {
        let passages = self.pipeline.extract_path(path);
        self.pipeline.build_index(passages)
    }

    fn finish_upload(
        &mut self,
        name: &str,
        outcome: Result<Option<DocumentIndex>>,
    ) -> UploadOutcome {
        match outcome {
            Ok(Some(index)) => {
                let passage_count = index.len();
                self.passages = index.shared_passages();
                self.index = Some(index);
                self.loaded_name = Some(name.to_string());
                info!(name, passage_count, "document ready");
                UploadOutcome::Ready { passage_count }
            }
            Ok(None) => {
                self.reset();
                warn!(name, "no content extracted");
                UploadOutcome::NoContent
            }
            Err(e) => {
                self.reset();
                warn!(name, error = %e, "document processing failed");
                UploadOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Write `bytes` to a temporary PDF deleted when the handle drops.
fn stage(bytes: &[u8]) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().prefix("studymate-").suffix(".pdf").tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}
