//! Question-answering pipeline orchestrator.
//!
//! The [`QaPipeline`] coordinates the extract → index → retrieve → generate
//! workflow by composing a [`PdfExtractor`], an [`EmbeddingProvider`] and an
//! [`AnswerGenerator`]. It holds no per-document state: passages and the
//! index are passed in on every call.
//!
//! # Example
//!
//! ```rust,ignore
//! use studymate::{QaPipeline, StudyMateConfig};
//!
//! let pipeline = QaPipeline::builder()
//!     .config(StudyMateConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .generator(Arc::new(my_generator))
//!     .build()?;
//!
//! let passages = pipeline.extract_path("notes.pdf");
//! let index = pipeline.build_index(passages.clone())?;
//! let answer = pipeline.ask("What is covered?", &passages, index.as_ref())?;
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::config::StudyMateConfig;
use crate::document::{Answer, Passage};
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, StudyMateError};
use crate::extract::PdfExtractor;
use crate::generator::AnswerGenerator;
use crate::index::DocumentIndex;

/// Returned when a question arrives before any document has been processed.
pub const NOT_PROCESSED: &str = "The document has not been processed yet. Please upload a PDF.";

/// The question-answering pipeline.
///
/// Construct one via [`QaPipeline::builder()`]. Cheap to share: all
/// components sit behind `Arc`.
#[derive(Clone)]
pub struct QaPipeline {
    config: StudyMateConfig,
    extractor: PdfExtractor,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    generator: Arc<AnswerGenerator>,
}

impl fmt::Debug for QaPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QaPipeline")
            .field("config", &self.config)
            .field("embedding_provider", &self.embedding_provider.name())
            .field("generator", &self.generator)
            .finish()
    }
}

impl QaPipeline {
    /// Create a new [`QaPipelineBuilder`].
    pub fn builder() -> QaPipelineBuilder {
        QaPipelineBuilder::default()
    }

    /// Build a pipeline with the local candle models named in `config`.
    ///
    /// The embedding model is loaded immediately; the answer model is loaded
    /// on the first question that needs it.
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::Config`] for invalid settings and
    /// [`StudyMateError::ModelLoad`] if the embedding model cannot be loaded.
    #[cfg(feature = "candle")]
    pub fn from_config(config: StudyMateConfig) -> Result<Self> {
        config.validate()?;
        let embedder = crate::candle::CandleEmbeddingProvider::new(
            &config.embedding_model,
            config.generator.device,
        )?;
        let generator = AnswerGenerator::flan_t5(config.generator.clone())?;
        Self::builder()
            .config(config)
            .embedding_provider(Arc::new(embedder))
            .generator(Arc::new(generator))
            .build()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &StudyMateConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the answer generator.
    pub fn generator(&self) -> &Arc<AnswerGenerator> {
        &self.generator
    }

    /// Extract passages from a PDF file; unreadable files yield no passages.
    pub fn extract_path(&self, path: impl AsRef<Path>) -> Vec<Passage> {
        self.extractor.extract_path(path)
    }

    /// Extract passages from an in-memory PDF; unreadable input yields no passages.
    pub fn extract_bytes(&self, bytes: &[u8]) -> Vec<Passage> {
        self.extractor.extract_bytes(bytes)
    }

    /// Embed `passages` into a new index, or `None` if there are none.
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::Index`] if embedding fails.
    pub fn build_index(
        &self,
        passages: impl Into<Arc<[Passage]>>,
    ) -> Result<Option<DocumentIndex>> {
        DocumentIndex::build(Arc::clone(&self.embedding_provider), passages)
    }

    /// Answer `question` with the configured `top_k`.
    ///
    /// # Errors
    ///
    /// See [`answer_question`](QaPipeline::answer_question).
    pub fn ask(
        &self,
        question: &str,
        passages: &[Passage],
        index: Option<&DocumentIndex>,
    ) -> Result<Answer> {
        self.answer_question(question, passages, index, self.config.top_k)
    }

    /// Retrieve the `top_k` passages most relevant to `question` and write an answer.
    ///
    /// Without an index or passages, returns [`NOT_PROCESSED`] and no sources.
    /// The answer carries the retrieved passages even when the model could not
    /// answer from them.
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::StaleIndex`] if `index` was not built from
    /// `passages`, and propagates retrieval and generation errors.
    pub fn answer_question(
        &self,
        question: &str,
        passages: &[Passage],
        index: Option<&DocumentIndex>,
        top_k: usize,
    ) -> Result<Answer> {
        let index = match index {
            Some(index) if !passages.is_empty() => index,
            _ => {
                info!("question received before a document was processed");
                return Ok(Answer::without_sources(NOT_PROCESSED));
            }
        };

        if !index.covers(passages) {
            error!(
                indexed = index.len(),
                supplied = passages.len(),
                "index does not match supplied passages"
            );
            return Err(StudyMateError::StaleIndex {
                indexed: index.len(),
                supplied: passages.len(),
            });
        }

        let sources = index.query(question, top_k)?;
        let retrieved: Vec<&str> = sources.iter().map(|r| r.passage.text()).collect();
        let text = self.generator.generate(question, &retrieved)?;

        info!(top_k, result_count = sources.len(), "question answered");
        Ok(Answer { text, sources })
    }
}

/// Builder for constructing a [`QaPipeline`].
///
/// All fields are required. Call [`build()`](QaPipelineBuilder::build) to
/// validate and produce the pipeline.
#[derive(Default)]
pub struct QaPipelineBuilder {
    config: Option<StudyMateConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<AnswerGenerator>>,
}

impl QaPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: StudyMateConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the answer generator.
    pub fn generator(mut self, generator: Arc<AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the [`QaPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::Config`] if any required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<QaPipeline> {
        let config = self
            .config
            .ok_or_else(|| StudyMateError::Config("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| StudyMateError::Config("embedding_provider is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| StudyMateError::Config("generator is required".to_string()))?;

        Ok(QaPipeline {
            extractor: PdfExtractor::new(config.min_passage_length),
            config,
            embedding_provider,
            generator,
        })
    }
}
