//! Answer generation from retrieved passages.
//!
//! [`AnswerGenerator`] owns a lazily loaded sequence-to-sequence model. The
//! model is obtained through a [`ModelLoader`] on the first call that needs it
//! and reused afterwards.

pub mod beam;
pub mod prompt;

use std::fmt;
use std::sync::Mutex;

use tracing::{debug, error, info};

use crate::config::GeneratorConfig;
use crate::error::{Result, StudyMateError};

pub use beam::{DecoderStep, GenerationParams, SpecialTokens, beam_search};
pub use prompt::{CONTEXT_DELIMITER, encode_prompt, join_context};

/// Returned when retrieval found nothing to answer from.
pub const NO_RELEVANT_INFORMATION: &str =
    "I couldn't find any relevant information in the document to answer your question.";

/// Returned when the model produced nothing usable.
pub const NO_DIRECT_ANSWER: &str =
    "I couldn't find a direct answer to your question in the provided document.";

/// Phrase the prompt asks the model to use when the context lacks the answer.
const NOT_FOUND_PHRASE: &str = "cannot find the information";

/// A loaded sequence-to-sequence model with its tokenizer.
pub trait LanguageModel: Send {
    /// Token ids for `text`, without special tokens.
    fn tokenize(&self, text: &str) -> Result<Vec<u32>>;

    /// The end-of-sequence token id appended to every prompt.
    fn eos_token_id(&self) -> u32;

    /// Generate output ids for a complete encoder input.
    fn generate(&mut self, input_ids: &[u32], params: &GenerationParams) -> Result<Vec<u32>>;

    /// Text for `ids` with special tokens skipped.
    fn decode(&self, ids: &[u32]) -> Result<String>;
}

/// Produces a [`LanguageModel`] on demand.
pub trait ModelLoader: Send + Sync {
    /// Load the model and its tokenizer.
    fn load(&self) -> Result<Box<dyn LanguageModel>>;

    /// Identifier of the model this loader produces, for logs.
    fn model_id(&self) -> &str;
}

/// Writes an answer for a question from a ranked list of passages.
///
/// The model is loaded on the first call that has passages to work with and
/// kept for the lifetime of the generator. Concurrent callers are serialized
/// on the model. A failed load is returned as an error and attempted again
/// on the next call.
///
/// # Example
///
/// ```rust,ignore
/// use studymate::{AnswerGenerator, GeneratorConfig};
///
/// let generator = AnswerGenerator::new(Box::new(loader), GeneratorConfig::default())?;
/// let answer = generator.generate("What is the capital?", &passages)?;
/// ```
pub struct AnswerGenerator {
    loader: Box<dyn ModelLoader>,
    config: GeneratorConfig,
    model: Mutex<Option<Box<dyn LanguageModel>>>,
}

impl fmt::Debug for AnswerGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnswerGenerator")
            .field("model_id", &self.loader.model_id())
            .field("config", &self.config)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl AnswerGenerator {
    /// Create a generator. Nothing is loaded until the first answer is needed.
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::Config`] if `config` fails validation.
    pub fn new(loader: Box<dyn ModelLoader>, config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { loader, config, model: Mutex::new(None) })
    }

    /// The generation settings.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Whether the model has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.model.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Answer `question` from `passages`, given best first.
    ///
    /// With no passages the fixed [`NO_RELEVANT_INFORMATION`] message is
    /// returned and the model is not loaded. An empty answer, or one saying
    /// the information cannot be found, becomes [`NO_DIRECT_ANSWER`].
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::ModelLoad`] if the model cannot be loaded and
    /// [`StudyMateError::Generation`] if inference fails.
    pub fn generate<P: AsRef<str>>(&self, question: &str, passages: &[P]) -> Result<String> {
        if passages.is_empty() {
            debug!("no passages retrieved, skipping generation");
            return Ok(NO_RELEVANT_INFORMATION.to_string());
        }

        let context = join_context(passages);
        let mut slot = self
            .model
            .lock()
            .map_err(|_| StudyMateError::Generation("model lock poisoned".to_string()))?;
        let model = match slot.take() {
            Some(model) => model,
            None => self.load_model()?,
        };
        let model = slot.insert(model);

        let input_ids = encode_prompt(
            |text| model.tokenize(text),
            model.eos_token_id(),
            question,
            &context,
            self.config.max_input_tokens,
        )?;
        let params = GenerationParams::from(&self.config);
        let output_ids = model.generate(&input_ids, &params)?;
        let answer = model.decode(&output_ids)?.trim().to_string();

        debug!(
            input_tokens = input_ids.len(),
            output_tokens = output_ids.len(),
            passage_count = passages.len(),
            "generated answer"
        );

        if is_degenerate(&answer) {
            info!("model gave no usable answer, returning fallback");
            return Ok(NO_DIRECT_ANSWER.to_string());
        }
        Ok(answer)
    }

    fn load_model(&self) -> Result<Box<dyn LanguageModel>> {
        let model_id = self.loader.model_id();
        info!(model_id, "loading language model");
        self.loader.load().map_err(|e| {
            error!(model_id, error = %e, "failed to load language model");
            e
        })
    }
}

fn is_degenerate(answer: &str) -> bool {
    answer.is_empty() || answer.to_lowercase().contains(NOT_FOUND_PHRASE)
}
