//! Sentence embeddings with a BERT encoder and masked mean pooling.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

use super::{fetch_model_files, read_config, select_device};
use crate::config::DevicePreference;
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, StudyMateError};

/// Longest input, in tokens; longer passages are truncated.
const MAX_SEQUENCE_LENGTH: usize = 256;

/// Passages encoded per forward pass.
const BATCH_SIZE: usize = 32;

/// A BERT sentence-embedding model run locally with candle.
///
/// Loads eagerly: construction downloads (or reads) the weights and tokenizer.
/// Embeddings are the attention-masked mean of the last hidden state.
///
/// # Example
///
/// ```rust,ignore
/// use studymate::{CandleEmbeddingProvider, DevicePreference};
///
/// let provider = CandleEmbeddingProvider::new(
///     "sentence-transformers/all-MiniLM-L6-v2",
///     DevicePreference::Auto,
/// )?;
/// assert_eq!(provider.dimensions(), 384);
/// ```
pub struct CandleEmbeddingProvider {
    model_id: String,
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimensions: usize,
}

impl CandleEmbeddingProvider {
    /// Load `model_id` from the Hub or a local directory.
    ///
    /// # Errors
    ///
    /// Returns [`StudyMateError::ModelLoad`] if any model file is missing or invalid.
    pub fn new(model_id: &str, device: DevicePreference) -> Result<Self> {
        let device = select_device(device);
        let files = fetch_model_files(model_id)?;

        let config_json = read_config(&files.config)?;
        let config: Config = serde_json::from_str(&config_json).map_err(load_error)?;
        let dimensions = serde_json::from_str::<serde_json::Value>(&config_json)
            .map_err(load_error)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| StudyMateError::ModelLoad("config has no hidden_size".to_string()))?
            as usize;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(load_error)?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(load_error)?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        // SAFETY: the weights file is only read while the mapping is alive.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, &device)
                .map_err(load_error)?
        };
        let model = BertModel::load(vb, &config).map_err(load_error)?;

        info!(model_id, dimensions, device = ?device, "loaded embedding model");
        Ok(Self { model_id: model_id.to_string(), model, tokenizer, device, dimensions })
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let encodings =
            self.tokenizer.encode_batch(texts.to_vec(), true).map_err(|e| self.error(e))?;

        let rows = encodings.len();
        let cols = encodings.first().map_or(0, |e| e.get_ids().len());
        let mut ids = Vec::with_capacity(rows * cols);
        let mut type_ids = Vec::with_capacity(rows * cols);
        let mut mask = Vec::with_capacity(rows * cols);
        for encoding in &encodings {
            ids.extend_from_slice(encoding.get_ids());
            type_ids.extend_from_slice(encoding.get_type_ids());
            mask.extend_from_slice(encoding.get_attention_mask());
        }

        let tensor = |data: Vec<u32>| {
            Tensor::from_vec(data, (rows, cols), &self.device).map_err(|e| self.error(e))
        };
        let ids = tensor(ids)?;
        let type_ids = tensor(type_ids)?;
        let mask = tensor(mask)?;

        let hidden = self.model.forward(&ids, &type_ids, Some(&mask)).map_err(|e| self.error(e))?;
        mean_pool(&hidden, &mask)
            .and_then(|pooled| pooled.to_vec2::<f32>())
            .map_err(|e| self.error(e))
    }

    fn error(&self, e: impl std::fmt::Display) -> StudyMateError {
        StudyMateError::Embedding { provider: self.model_id.clone(), message: e.to_string() }
    }
}

impl EmbeddingProvider for CandleEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.encode_batch(&[text])?
            .pop()
            .ok_or_else(|| self.error("empty embedding result"))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            embeddings.extend(self.encode_batch(batch)?);
        }
        debug!(text_count = texts.len(), "embedded batch");
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.model_id
    }
}

/// Average of the token vectors, ignoring padding.
fn mean_pool(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = mask.to_dtype(DType::F32)?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    summed.broadcast_div(&counts)
}

fn load_error(e: impl std::fmt::Display) -> StudyMateError {
    StudyMateError::ModelLoad(e.to_string())
}
