use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Request validation failures. The messages are part of the job contract
/// and are returned verbatim to callers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("sentence is required")]
    MissingSentence,

    #[error("language is required")]
    MissingLanguage,

    #[error("language not supported")]
    UnsupportedLanguage,

    #[error("sentence too long (max {0} chars)")]
    SentenceTooLong(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Invalid(#[from] InputError),

    #[error("Failed to load model {model}: {reason}")]
    ModelLoad { model: String, reason: String },

    #[error("TTS generation failed: {0}")]
    TtsError(String),

    #[error("Upload failed: {0}")]
    StorageError(String),

    #[error("Upload is not configured")]
    UploadNotConfigured,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Invalid(e) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", e.to_string()),
            AppError::ModelLoad { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "MODEL_LOAD_ERROR",
                self.to_string(),
            ),
            AppError::TtsError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "TTS_ERROR",
                msg.clone(),
            ),
            AppError::StorageError(msg) => {
                (StatusCode::BAD_GATEWAY, "STORAGE_ERROR", msg.clone())
            }
            AppError::UploadNotConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                "UPLOAD_NOT_CONFIGURED",
                self.to_string(),
            ),
            AppError::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            AppError::IoError(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
            AppError::JsonError(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "JSON_ERROR",
                e.to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {} - {}", code, message);
        } else {
            tracing::warn!("Request rejected: {} - {}", code, message);
        }

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}
