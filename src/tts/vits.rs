use std::sync::Mutex;

use ndarray::ArrayView2;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Value;

use crate::config::Device;
use crate::error::AppError;
use crate::tts::tokenizer::{Encoding, VitsTokenizer};
use crate::tts::voice::ModelFiles;
use crate::tts::{Synthesizer, Waveform};

/// MMS VITS exported to ONNX: `input_ids` (+ optional `attention_mask`) in,
/// `waveform` of shape [batch, samples] out.
pub struct VitsEngine {
    model_id: String,
    session: Mutex<Session>,
    tokenizer: VitsTokenizer,
    sample_rate: u32,
    wants_mask: bool,
    output_name: String,
}

impl VitsEngine {
    pub fn load(files: &ModelFiles, device: Device, intra_threads: usize) -> Result<Self, AppError> {
        let load_err = |reason: String| AppError::ModelLoad {
            model: files.model_id.clone(),
            reason,
        };

        let tokenizer = VitsTokenizer::from_dir(&files.dir)
            .map_err(|e| load_err(format!("tokenizer: {}", e)))?;

        let builder = Session::builder()
            .map_err(|e| load_err(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_err(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(intra_threads)
            .map_err(|e| load_err(format!("Failed to set threads: {}", e)))?;

        let session = with_device(builder, device)
            .map_err(|e| load_err(format!("Failed to register execution provider: {}", e)))?
            .commit_from_file(&files.onnx_path)
            .map_err(|e| load_err(format!("Failed to load model: {}", e)))?;

        let wants_mask = session.inputs().iter().any(|i| i.name() == "attention_mask");
        let output_names: Vec<&str> = session.outputs().iter().map(|o| o.name()).collect();
        let output_name = waveform_output(&output_names)
            .ok_or_else(|| load_err("model declares no outputs".to_string()))?
            .to_string();

        tracing::debug!(
            "{}: vocab size {}, sample rate {}, attention mask {}, output {}",
            files.model_id,
            tokenizer.vocab_size(),
            files.config.sampling_rate,
            wants_mask,
            output_name
        );

        Ok(Self {
            model_id: files.model_id.clone(),
            session: Mutex::new(session),
            tokenizer,
            sample_rate: files.config.sampling_rate,
            wants_mask,
            output_name,
        })
    }

    fn run(&self, input_ids: Vec<i64>, attention_mask: Vec<i64>) -> Result<Vec<f32>, AppError> {
        let input_len = input_ids.len();

        // input_ids: [batch, sequence] = [1, token_count]
        let ids_value = Value::from_array((vec![1, input_len], input_ids))
            .map_err(|e| AppError::TtsError(format!("Failed to create input tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AppError::TtsError(format!("{} session poisoned", self.model_id)))?;

        let outputs = if self.wants_mask {
            let mask_value = Value::from_array((vec![1, input_len], attention_mask))
                .map_err(|e| AppError::TtsError(format!("Failed to create mask tensor: {}", e)))?;
            session.run(ort::inputs![
                "input_ids" => ids_value,
                "attention_mask" => mask_value
            ])
        } else {
            session.run(ort::inputs!["input_ids" => ids_value])
        }
        .map_err(|e| AppError::TtsError(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| AppError::TtsError(format!("Missing {} tensor", self.output_name)))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::TtsError(format!("Failed to extract output tensor: {}", e)))?;

        first_row(&shape.iter().map(|&d| d as usize).collect::<Vec<_>>(), data)
    }
}

impl Synthesizer for VitsEngine {
    fn synthesize(&self, text: &str) -> Result<Waveform, AppError> {
        let encoding = non_empty(self.tokenizer.encode(text), &self.model_id)?;
        let samples = self.run(encoding.input_ids, encoding.attention_mask)?;
        Ok(Waveform {
            samples,
            sample_rate: self.sample_rate,
        })
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// The `waveform` output when the graph has one, otherwise its first output.
fn waveform_output<'a>(names: &[&'a str]) -> Option<&'a str> {
    names
        .iter()
        .find(|&&n| n == "waveform")
        .or_else(|| names.first())
        .copied()
}

fn non_empty(encoding: Encoding, model_id: &str) -> Result<Encoding, AppError> {
    if encoding.is_empty() {
        return Err(AppError::TtsError(format!(
            "sentence has no characters known to {}",
            model_id
        )));
    }
    Ok(encoding)
}

/// Picks the first waveform out of a [batch, samples] (or flat) output.
fn first_row(shape: &[usize], data: &[f32]) -> Result<Vec<f32>, AppError> {
    match shape {
        [] | [_] => Ok(data.to_vec()),
        [.., samples] => {
            let rows = data.len() / (*samples).max(1);
            let view = ArrayView2::from_shape((rows, *samples), data)
                .map_err(|e| AppError::TtsError(format!("Unexpected waveform shape: {}", e)))?;
            if rows == 0 {
                return Ok(Vec::new());
            }
            Ok(view.row(0).to_vec())
        }
    }
}

#[cfg(feature = "cuda")]
fn with_device(builder: SessionBuilder, device: Device) -> ort::Result<SessionBuilder> {
    use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};

    match device {
        Device::Cpu => Ok(builder),
        Device::Auto => builder.with_execution_providers([
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ]),
        Device::Cuda => builder.with_execution_providers([CUDAExecutionProvider::default()
            .build()
            .error_on_failure()]),
    }
}

#[cfg(not(feature = "cuda"))]
fn with_device(builder: SessionBuilder, device: Device) -> ort::Result<SessionBuilder> {
    if device == Device::Cuda {
        tracing::warn!("Built without the `cuda` feature, running on CPU");
    }
    Ok(builder)
}
