pub mod handlers;
pub mod routes;

use serde::{Deserialize, Serialize};

use crate::tts::LanguageInfo;

/// Job envelope: `{"id": ..., "input": {"sentence": ..., "language": ...}}`.
#[derive(Debug, Default, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub input: Option<JobInput>,
}

impl JobRequest {
    /// Splits the envelope; a missing or null `input` counts as empty.
    pub fn into_parts(self) -> (Option<String>, JobInput) {
        (self.id, self.input.unwrap_or_default())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct JobInput {
    #[serde(default)]
    pub sentence: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Completed,
    Failed,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum JobOutput {
    Audio { audio: String },
    Url { audio_url: String },
    Error { error: String },
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub status: JobStatus,
    pub output: JobOutput,
}

#[derive(Debug, Serialize)]
pub struct LanguagesResponse {
    pub languages: Vec<LanguageInfo>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
