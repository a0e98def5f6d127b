//! Question answering over PDF documents.
//!
//! This crate provides:
//! - PDF text extraction and paragraph chunking into passages
//! - A per-document semantic index with cosine top-k retrieval
//! - Answer generation with a sequence-to-sequence model and beam search
//! - A stateless pipeline and a per-user [`Session`] on top of it
//!
//! With the default `candle` feature, the embedding and answer models run
//! locally through candle, with weights fetched from the HuggingFace Hub.
//!
//! ```rust,ignore
//! use studymate::{QaPipeline, Session, StudyMateConfig};
//!
//! let mut session = Session::new(QaPipeline::from_config(StudyMateConfig::default())?);
//! let outcome = session.upload("notes.pdf", &std::fs::read("notes.pdf")?);
//! println!("{}", outcome.message());
//! ```

#[cfg(feature = "candle")]
pub mod candle;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generator;
pub mod index;
pub mod inmemory;
pub mod pipeline;
pub mod session;
pub mod telemetry;

#[cfg(feature = "candle")]
pub use candle::{CandleEmbeddingProvider, FlanT5Loader, T5Model, select_device};
pub use chunking::{Chunker, ParagraphChunker};
pub use config::{DevicePreference, GeneratorConfig, StudyMateConfig, StudyMateConfigBuilder};
pub use document::{Answer, Passage, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{Result, StudyMateError};
pub use extract::PdfExtractor;
pub use generator::{
    AnswerGenerator, GenerationParams, LanguageModel, ModelLoader, NO_DIRECT_ANSWER,
    NO_RELEVANT_INFORMATION,
};
pub use index::{DEFAULT_TOP_K, DocumentIndex};
pub use inmemory::FlatIndex;
pub use pipeline::{NOT_PROCESSED, QaPipeline, QaPipelineBuilder};
pub use session::{AskOutcome, Session, UploadOutcome};
