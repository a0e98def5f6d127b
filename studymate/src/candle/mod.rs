//! Local model backends built on candle.
//!
//! Weights, configs and tokenizers are fetched from the HuggingFace Hub with
//! `hf-hub` (or read from a local directory) and run on the device picked by
//! [`select_device`].

mod embedding;
mod t5;

use std::path::{Path, PathBuf};

use candle_core::Device;
use hf_hub::api::sync::Api;
use tracing::{debug, info, warn};

use crate::config::DevicePreference;
use crate::error::{Result, StudyMateError};

pub use embedding::CandleEmbeddingProvider;
pub use t5::{FlanT5Loader, T5Model};

/// Pick a candle device for `preference`, falling back to the CPU.
pub fn select_device(preference: DevicePreference) -> Device {
    match preference {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => cuda_device().unwrap_or_else(|| {
            warn!("CUDA requested but unavailable, falling back to CPU");
            Device::Cpu
        }),
        DevicePreference::Metal => metal_device().unwrap_or_else(|| {
            warn!("Metal requested but unavailable, falling back to CPU");
            Device::Cpu
        }),
        DevicePreference::Auto => {
            let device = cuda_device().or_else(metal_device).unwrap_or(Device::Cpu);
            info!(device = ?device, "auto-selected device");
            device
        }
    }
}

#[cfg(feature = "cuda")]
fn cuda_device() -> Option<Device> {
    match Device::new_cuda(0) {
        Ok(device) => Some(device),
        Err(e) => {
            debug!(error = %e, "CUDA init failed");
            None
        }
    }
}

#[cfg(not(feature = "cuda"))]
fn cuda_device() -> Option<Device> {
    None
}

#[cfg(feature = "metal")]
fn metal_device() -> Option<Device> {
    match Device::new_metal(0) {
        Ok(device) => Some(device),
        Err(e) => {
            debug!(error = %e, "Metal init failed");
            None
        }
    }
}

#[cfg(not(feature = "metal"))]
fn metal_device() -> Option<Device> {
    None
}

/// Paths of the files a pretrained model needs.
#[derive(Debug, Clone)]
pub(crate) struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

/// Resolve `model_id` to local files.
///
/// An existing directory is used as is; anything else is treated as a Hub
/// repository and downloaded into the local cache.
pub(crate) fn fetch_model_files(model_id: &str) -> Result<ModelFiles> {
    let local = Path::new(model_id);
    if local.is_dir() {
        debug!(path = %local.display(), "using local model directory");
        let files = ModelFiles {
            config: local.join("config.json"),
            tokenizer: local.join("tokenizer.json"),
            weights: local.join("model.safetensors"),
        };
        for path in [&files.config, &files.tokenizer, &files.weights] {
            if !path.is_file() {
                return Err(StudyMateError::ModelLoad(format!("missing {}", path.display())));
            }
        }
        return Ok(files);
    }

    info!(model_id, "fetching model files from HuggingFace Hub");
    let api = Api::new()
        .map_err(|e| StudyMateError::ModelLoad(format!("failed to initialize Hub API: {e}")))?;
    let repo = api.model(model_id.to_string());
    let get = |file: &str| {
        repo.get(file).map_err(|e| {
            StudyMateError::ModelLoad(format!("failed to download {file} for {model_id}: {e}"))
        })
    };

    Ok(ModelFiles {
        config: get("config.json")?,
        tokenizer: get("tokenizer.json")?,
        weights: get("model.safetensors")?,
    })
}

pub(crate) fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        StudyMateError::ModelLoad(format!("failed to read {}: {e}", path.display()))
    })
}
