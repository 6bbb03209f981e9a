pub mod tokenizer;
pub mod vits;
pub mod voice;
pub mod wav;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::Device;
use crate::error::{AppError, InputError};

pub use vits::VitsEngine;
pub use voice::{LanguageInfo, ModelFiles, LANGUAGE_MODELS};

/// Raw model output for one sentence.
#[derive(Debug, Clone)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// One loaded text-to-speech model.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str) -> Result<Waveform, AppError>;

    fn sample_rate(&self) -> u32;
}

pub struct Voice {
    pub code: String,
    pub model_id: String,
    engine: Box<dyn Synthesizer>,
}

impl Voice {
    pub fn new(code: &str, model_id: &str, engine: Box<dyn Synthesizer>) -> Self {
        Self {
            code: code.to_string(),
            model_id: model_id.to_string(),
            engine,
        }
    }

    pub fn speak(&self, text: &str) -> Result<Vec<u8>, AppError> {
        let waveform = self.engine.synthesize(text)?;
        tracing::debug!(
            "{}: synthesized {} samples at {} Hz",
            self.code,
            waveform.samples.len(),
            waveform.sample_rate
        );
        wav::samples_to_wav(&waveform.samples, waveform.sample_rate)
    }
}

/// Every supported language with its model, loaded once at startup and
/// read-only afterwards.
pub struct TtsService {
    voices: BTreeMap<String, Arc<Voice>>,
    max_sentence_chars: usize,
}

impl TtsService {
    pub fn new(voices: Vec<Voice>, max_sentence_chars: usize) -> Self {
        Self {
            voices: voices
                .into_iter()
                .map(|v| (v.code.clone(), Arc::new(v)))
                .collect(),
            max_sentence_chars,
        }
    }

    /// Loads the model and tokenizer of every entry in [`LANGUAGE_MODELS`].
    pub fn load(
        models_dir: &Path,
        device: Device,
        intra_threads: usize,
        max_sentence_chars: usize,
    ) -> Result<Self, AppError> {
        let mut voices = Vec::with_capacity(LANGUAGE_MODELS.len());

        for (code, model_id) in LANGUAGE_MODELS {
            let files = ModelFiles::locate(models_dir, model_id)?;
            let engine = VitsEngine::load(&files, device, intra_threads)?;
            tracing::info!("Model and tokenizer loaded for {} ({})", code, model_id);
            voices.push(Voice::new(code, model_id, Box::new(engine)));
        }

        Ok(Self::new(voices, max_sentence_chars))
    }

    /// Checks a request's fields and picks the voice for it.
    pub fn resolve(
        &self,
        sentence: Option<&str>,
        language: Option<&str>,
    ) -> Result<Arc<Voice>, InputError> {
        let sentence = sentence.unwrap_or_default();
        if sentence.is_empty() {
            return Err(InputError::MissingSentence);
        }

        let language = language.unwrap_or_default();
        if language.is_empty() {
            return Err(InputError::MissingLanguage);
        }

        let voice = self
            .voices
            .get(language)
            .ok_or(InputError::UnsupportedLanguage)?;

        if sentence.chars().count() > self.max_sentence_chars {
            return Err(InputError::SentenceTooLong(self.max_sentence_chars));
        }

        Ok(Arc::clone(voice))
    }

    /// Validates the request, then runs inference on the blocking pool and
    /// returns the WAV bytes.
    pub async fn speak(
        &self,
        sentence: Option<String>,
        language: Option<String>,
    ) -> Result<Vec<u8>, AppError> {
        let voice = self.resolve(sentence.as_deref(), language.as_deref())?;
        let text = sentence.unwrap_or_default();

        tokio::task::spawn_blocking(move || voice.speak(&text))
            .await
            .map_err(|e| AppError::TtsError(format!("Synthesis task failed: {}", e)))?
    }

    pub fn languages(&self) -> Vec<LanguageInfo> {
        self.voices
            .values()
            .map(|v| LanguageInfo {
                code: v.code.clone(),
                model_id: v.model_id.clone(),
                sample_rate: v.engine.sample_rate(),
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Emits a short sine burst whose length follows the text length.
    pub struct ToneSynthesizer {
        pub sample_rate: u32,
    }

    impl Synthesizer for ToneSynthesizer {
        fn synthesize(&self, text: &str) -> Result<Waveform, AppError> {
            let len = text.chars().count() * 160;
            let samples = (0..len)
                .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / self.sample_rate as f32).sin() * 0.5)
                .collect();
            Ok(Waveform {
                samples,
                sample_rate: self.sample_rate,
            })
        }

        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }
    }

    pub struct FailingSynthesizer;

    impl Synthesizer for FailingSynthesizer {
        fn synthesize(&self, _text: &str) -> Result<Waveform, AppError> {
            Err(AppError::TtsError("Inference failed: test".to_string()))
        }

        fn sample_rate(&self) -> u32 {
            16_000
        }
    }

    pub fn service() -> TtsService {
        let voices = LANGUAGE_MODELS
            .iter()
            .map(|(code, model_id)| {
                Voice::new(code, model_id, Box::new(ToneSynthesizer { sample_rate: 16_000 }))
            })
            .collect();
        TtsService::new(voices, 100)
    }
}
