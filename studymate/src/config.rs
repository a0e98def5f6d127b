//! Configuration for extraction, retrieval and generation.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyMateError};

/// Default sentence-embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Default sequence-to-sequence model used to write answers.
pub const DEFAULT_GENERATOR_MODEL: &str = "google/flan-t5-base";

/// Smallest input budget that still leaves room for a question.
const MIN_INPUT_TOKENS: usize = 16;

/// Where model weights are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Use an accelerator when one was compiled in and is available, else CPU.
    #[default]
    Auto,
    /// Always run on the CPU.
    Cpu,
    /// First CUDA device.
    Cuda,
    /// First Metal device.
    Metal,
}

impl FromStr for DevicePreference {
    type Err = StudyMateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "metal" => Ok(Self::Metal),
            other => Err(StudyMateError::Config(format!(
                "invalid device preference '{other}' (expected auto, cpu, cuda or metal)"
            ))),
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::Metal => write!(f, "metal"),
        }
    }
}

/// Settings for the answer generator and its beam search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// HuggingFace model ID of the seq2seq model.
    pub model_id: String,
    /// Token budget for the assembled prompt, end-of-sequence token included.
    pub max_input_tokens: usize,
    /// Maximum number of tokens generated per answer.
    pub max_new_tokens: usize,
    /// Beam width.
    pub num_beams: usize,
    /// Stop as soon as `num_beams` hypotheses are finished.
    pub early_stopping: bool,
    /// Exponent applied to the hypothesis length when scoring finished beams.
    pub length_penalty: f32,
    /// Device the model runs on.
    pub device: DevicePreference,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_GENERATOR_MODEL.to_string(),
            max_input_tokens: 1024,
            max_new_tokens: 250,
            num_beams: 4,
            early_stopping: true,
            length_penalty: 1.0,
            device: DevicePreference::Auto,
        }
    }
}

impl GeneratorConfig {
    /// Create a config for the given model with default generation settings.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self { model_id: model_id.into(), ..Default::default() }
    }

    /// Set the prompt token budget.
    pub fn with_max_input_tokens(mut self, tokens: usize) -> Self {
        self.max_input_tokens = tokens;
        self
    }

    /// Set the maximum number of generated tokens.
    pub fn with_max_new_tokens(mut self, tokens: usize) -> Self {
        self.max_new_tokens = tokens;
        self
    }

    /// Set the beam width.
    pub fn with_num_beams(mut self, beams: usize) -> Self {
        self.num_beams = beams;
        self
    }

    /// Enable or disable early stopping.
    pub fn with_early_stopping(mut self, enabled: bool) -> Self {
        self.early_stopping = enabled;
        self
    }

    /// Set the device preference.
    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }

    /// Check that the settings can drive a generation run.
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::Config`] if:
    /// - `num_beams == 0`
    /// - `max_new_tokens == 0`
    /// - `max_input_tokens` is too small to hold a question
    /// - `length_penalty` is not finite
    pub fn validate(&self) -> Result<()> {
        if self.num_beams == 0 {
            return Err(StudyMateError::Config("num_beams must be greater than zero".to_string()));
        }
        if self.max_new_tokens == 0 {
            return Err(StudyMateError::Config(
                "max_new_tokens must be greater than zero".to_string(),
            ));
        }
        if self.max_input_tokens < MIN_INPUT_TOKENS {
            return Err(StudyMateError::Config(format!(
                "max_input_tokens ({}) must be at least {MIN_INPUT_TOKENS}",
                self.max_input_tokens
            )));
        }
        if !self.length_penalty.is_finite() {
            return Err(StudyMateError::Config("length_penalty must be finite".to_string()));
        }
        Ok(())
    }
}

/// Configuration parameters for the question-answering pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StudyMateConfig {
    /// Paragraphs shorter than this many characters are discarded.
    pub min_passage_length: usize,
    /// Number of passages retrieved per question.
    pub top_k: usize,
    /// HuggingFace model ID of the sentence-embedding model.
    pub embedding_model: String,
    /// Answer generation settings.
    pub generator: GeneratorConfig,
}

impl Default for StudyMateConfig {
    fn default() -> Self {
        Self {
            min_passage_length: 50,
            top_k: 5,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl StudyMateConfig {
    /// Create a new builder for constructing a [`StudyMateConfig`].
    pub fn builder() -> StudyMateConfigBuilder {
        StudyMateConfigBuilder::default()
    }

    /// Load and validate a JSON configuration file.
    ///
    /// Missing fields take their default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            StudyMateError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::Config`] if `top_k == 0` or the generator
    /// settings are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(StudyMateError::Config("top_k must be greater than zero".to_string()));
        }
        self.generator.validate()
    }
}

/// Builder for constructing a validated [`StudyMateConfig`].
#[derive(Debug, Clone, Default)]
pub struct StudyMateConfigBuilder {
    config: StudyMateConfig,
}

impl StudyMateConfigBuilder {
    /// Set the minimum passage length in characters.
    pub fn min_passage_length(mut self, length: usize) -> Self {
        self.config.min_passage_length = length;
        self
    }

    /// Set the number of passages retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the sentence-embedding model.
    pub fn embedding_model(mut self, model_id: impl Into<String>) -> Self {
        self.config.embedding_model = model_id.into();
        self
    }

    /// Set the answer generation settings.
    pub fn generator(mut self, generator: GeneratorConfig) -> Self {
        self.config.generator = generator;
        self
    }

    /// Build the [`StudyMateConfig`], validating that parameters are consistent.
    pub fn build(self) -> Result<StudyMateConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
