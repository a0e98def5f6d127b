//! FLAN-T5 answer model.

use candle_core::{D, DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::t5::{Config, T5ForConditionalGeneration};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::{fetch_model_files, read_config, select_device};
use crate::config::{DevicePreference, GeneratorConfig};
use crate::error::{Result, StudyMateError};
use crate::generator::{
    AnswerGenerator, DecoderStep, GenerationParams, LanguageModel, ModelLoader, SpecialTokens,
    beam_search,
};

/// Loads a T5 checkpoint and its tokenizer when the generator first needs them.
#[derive(Debug, Clone)]
pub struct FlanT5Loader {
    model_id: String,
    device: DevicePreference,
}

impl FlanT5Loader {
    /// Loader for the model and device named in `config`.
    pub fn new(config: &GeneratorConfig) -> Self {
        Self { model_id: config.model_id.clone(), device: config.device }
    }
}

impl ModelLoader for FlanT5Loader {
    fn load(&self) -> Result<Box<dyn LanguageModel>> {
        Ok(Box::new(T5Model::load(&self.model_id, self.device)?))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

impl AnswerGenerator {
    /// A generator backed by the T5 checkpoint named in `config`, loaded lazily.
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::Config`] if `config` fails validation.
    pub fn flan_t5(config: GeneratorConfig) -> Result<Self> {
        Self::new(Box::new(FlanT5Loader::new(&config)), config)
    }
}

/// A T5 encoder-decoder with its tokenizer, decoded with beam search.
pub struct T5Model {
    model: T5ForConditionalGeneration,
    tokenizer: Tokenizer,
    device: Device,
    special: SpecialTokens,
}

impl T5Model {
    /// Load `model_id` from the Hub or a local directory.
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::ModelLoad`] if any model file is missing or invalid.
    pub fn load(model_id: &str, device: DevicePreference) -> Result<Self> {
        let device = select_device(device);
        let files = fetch_model_files(model_id)?;

        let mut config: Config =
            serde_json::from_str(&read_config(&files.config)?).map_err(load_error)?;
        // Every beam step re-feeds its full prefix.
        config.use_cache = false;
        let special = SpecialTokens {
            decoder_start: config.decoder_start_token_id.unwrap_or(config.pad_token_id) as u32,
            eos: config.eos_token_id as u32,
        };

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(load_error)?;
        tokenizer.with_truncation(None).map_err(load_error)?;
        tokenizer.with_padding(None);

        // SAFETY: the weights file is only read while the mapping is alive.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, &device)
                .map_err(load_error)?
        };
        let model = T5ForConditionalGeneration::load(vb, &config).map_err(load_error)?;

        info!(model_id, device = ?device, "loaded language model");
        Ok(Self { model, tokenizer, device, special })
    }
}

impl LanguageModel for T5Model {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self.tokenizer.encode(text, false).map_err(generation_error)?;
        Ok(encoding.get_ids().to_vec())
    }

    fn eos_token_id(&self) -> u32 {
        self.special.eos
    }

    fn generate(&mut self, input_ids: &[u32], params: &GenerationParams) -> Result<Vec<u32>> {
        self.model.clear_kv_cache();
        let input = Tensor::new(input_ids, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(generation_error)?;
        let encoder_output = self.model.encode(&input).map_err(generation_error)?;

        let mut step = T5Step {
            model: &mut self.model,
            encoder_output: &encoder_output,
            device: &self.device,
        };
        let output = beam_search(&mut step, params, self.special)?;
        debug!(input_tokens = input_ids.len(), output_tokens = output.len(), "decoded answer");
        Ok(output)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer.decode(ids, true).map_err(generation_error)
    }
}

/// One decoder pass over a prefix, against a fixed encoder output.
struct T5Step<'a> {
    model: &'a mut T5ForConditionalGeneration,
    encoder_output: &'a Tensor,
    device: &'a Device,
}

impl DecoderStep for T5Step<'_> {
    fn next_log_probs(&mut self, prefix: &[u32]) -> Result<Vec<f32>> {
        let decoder_input = Tensor::new(prefix, self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(generation_error)?;
        let logits = self
            .model
            .decode(&decoder_input, self.encoder_output)
            .and_then(|logits| logits.squeeze(0))
            .and_then(|logits| candle_nn::ops::log_softmax(&logits, D::Minus1))
            .and_then(|log_probs| log_probs.to_dtype(DType::F32))
            .and_then(|log_probs| log_probs.to_vec1::<f32>())
            .map_err(generation_error)?;
        Ok(logits)
    }
}

fn load_error(e: impl std::fmt::Display) -> StudyMateError {
    StudyMateError::ModelLoad(e.to_string())
}

fn generation_error(e: impl std::fmt::Display) -> StudyMateError {
    StudyMateError::Generation(e.to_string())
}
