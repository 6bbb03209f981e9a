use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Language code to pretrained model identifier. Fixed at build time.
pub const LANGUAGE_MODELS: &[(&str, &str)] = &[
    ("kn", "facebook/mms-tts-kan"),
    ("ta", "facebook/mms-tts-tam"),
    ("te", "facebook/mms-tts-tel"),
    ("hi", "facebook/mms-tts-hin"),
];

pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Subset of the model's `config.json` the worker cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: u32,
}

fn default_sampling_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            sampling_rate: default_sampling_rate(),
        }
    }
}

/// On-disk layout of one pretrained model: `<models_dir>/<model_id>/`.
#[derive(Debug)]
pub struct ModelFiles {
    pub model_id: String,
    pub dir: PathBuf,
    pub onnx_path: PathBuf,
    pub config: ModelConfig,
}

impl ModelFiles {
    pub fn locate(models_dir: &Path, model_id: &str) -> Result<Self, AppError> {
        let dir = models_dir.join(model_id);
        if !dir.is_dir() {
            return Err(AppError::ModelLoad {
                model: model_id.to_string(),
                reason: format!("directory {} not found", dir.display()),
            });
        }

        let onnx_path = ["model.onnx", "onnx/model.onnx"]
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.exists())
            .ok_or_else(|| AppError::ModelLoad {
                model: model_id.to_string(),
                reason: "missing model.onnx".to_string(),
            })?;

        let config_path = dir.join("config.json");
        let config = if config_path.exists() {
            serde_json::from_reader(File::open(&config_path)?)?
        } else {
            tracing::warn!(
                "{} has no config.json, assuming {} Hz",
                model_id,
                DEFAULT_SAMPLE_RATE
            );
            ModelConfig::default()
        };

        Ok(Self {
            model_id: model_id.to_string(),
            dir,
            onnx_path,
            config,
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LanguageInfo {
    pub code: String,
    pub model_id: String,
    pub sample_rate: u32,
}
