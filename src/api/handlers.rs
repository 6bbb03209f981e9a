use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

use super::{HealthResponse, JobOutput, JobRequest, JobResponse, JobStatus, LanguagesResponse};
use crate::api::routes::AppState;
use crate::error::AppError;

const STREAM_CHUNK_BYTES: usize = 16 * 1024;

/// Turns a handler outcome into a job result. Validation failures are part of
/// the job output; everything else is an HTTP error.
fn finish(id: Option<String>, outcome: Result<JobOutput, AppError>) -> Result<Json<JobResponse>, AppError> {
    let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let (status, output) = match outcome {
        Ok(output) => (JobStatus::Completed, output),
        Err(AppError::Invalid(e)) => {
            tracing::info!("Job {} rejected: {}", id, e);
            (JobStatus::Failed, JobOutput::Error { error: e.to_string() })
        }
        Err(e) => return Err(e),
    };

    Ok(Json(JobResponse { id, status, output }))
}

pub async fn run_inline(
    State(state): State<Arc<AppState>>,
    Json(job): Json<JobRequest>,
) -> Result<Json<JobResponse>, AppError> {
    let (id, input) = job.into_parts();
    let outcome = state
        .tts
        .speak(input.sentence, input.language)
        .await
        .map(|wav| JobOutput::Audio {
            audio: base64::engine::general_purpose::STANDARD.encode(wav),
        });

    finish(id, outcome)
}

pub async fn run_upload(
    State(state): State<Arc<AppState>>,
    Json(job): Json<JobRequest>,
) -> Result<Json<JobResponse>, AppError> {
    let (id, input) = job.into_parts();

    // Job errors take precedence over the storage configuration
    if let Err(e) = state
        .tts
        .resolve(input.sentence.as_deref(), input.language.as_deref())
    {
        return finish(id, Err(e.into()));
    }

    let uploader = state
        .uploader
        .as_ref()
        .ok_or(AppError::UploadNotConfigured)?;

    let outcome = match state.tts.speak(input.sentence, input.language).await {
        Ok(wav) => uploader
            .upload(wav)
            .await
            .map(|audio_url| JobOutput::Url { audio_url }),
        Err(e) => Err(e),
    };

    finish(id, outcome)
}

pub async fn run_stream(
    State(state): State<Arc<AppState>>,
    Json(job): Json<JobRequest>,
) -> Result<Response, AppError> {
    let (_, input) = job.into_parts();
    let wav = state.tts.speak(input.sentence, input.language).await?;

    let audio = Bytes::from(wav);
    let content_length = audio.len();

    let stream = async_stream::stream! {
        let mut offset = 0;
        while offset < audio.len() {
            let end = (offset + STREAM_CHUNK_BYTES).min(audio.len());
            yield Ok::<_, Infallible>(audio.slice(offset..end));
            offset = end;
        }
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (header::CONTENT_LENGTH, content_length.to_string()),
            (
                header::CONTENT_DISPOSITION,
                "inline; filename=\"speech.wav\"".to_string(),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

pub async fn list_languages(State(state): State<Arc<AppState>>) -> Json<LanguagesResponse> {
    Json(LanguagesResponse {
        languages: state.tts.languages(),
    })
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::create_router;
    use crate::storage::testing::MemoryStore;
    use crate::storage::AudioUploader;
    use crate::tts::testing::{service, FailingSynthesizer};
    use crate::tts::{TtsService, Voice};
    use axum::http::Request;
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::io::Cursor;
    use tower::ServiceExt;

    fn app(uploader: Option<AudioUploader>) -> Router {
        create_router(Arc::new(AppState {
            tts: service(),
            uploader,
        }))
    }

    async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Vec<u8>) {
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let (status, bytes) = post(app, uri, body).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_runsync_returns_base64_wav() {
        let (status, body) = post_json(
            app(None),
            "/runsync",
            json!({"id": "job-1", "input": {"sentence": "namaste", "language": "hi"}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "job-1");
        assert_eq!(body["status"], "COMPLETED");

        let audio = body["output"]["audio"].as_str().unwrap();
        let wav = base64::engine::general_purpose::STANDARD.decode(audio).unwrap();
        assert!(!wav.is_empty());
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert!(reader.len() > 0);
    }

    #[tokio::test]
    async fn test_runsync_validation_errors_are_exact() {
        let cases = [
            (json!({"input": {"sentence": "", "language": "hi"}}), "sentence is required"),
            (json!({"input": {"language": "hi"}}), "sentence is required"),
            (json!({}), "sentence is required"),
            (json!({"input": null}), "sentence is required"),
            (json!({"input": {"sentence": "namaste"}}), "language is required"),
            (json!({"input": {"sentence": "hello", "language": "fr"}}), "language not supported"),
        ];

        for (request, message) in cases {
            let (status, body) = post_json(app(None), "/runsync", request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "FAILED");
            assert_eq!(body["output"], json!({"error": message}));
            assert!(!body["id"].as_str().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_runsync_inference_failure_is_server_error() {
        let state = AppState {
            tts: TtsService::new(
                vec![Voice::new("hi", "facebook/mms-tts-hin", Box::new(FailingSynthesizer))],
                100,
            ),
            uploader: None,
        };
        let (status, body) = post_json(
            create_router(Arc::new(state)),
            "/runsync",
            json!({"input": {"sentence": "namaste", "language": "hi"}}),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "TTS_ERROR");
    }

    #[tokio::test]
    async fn test_stream_returns_wav_body() {
        let sentence = "a".repeat(100);
        let (status, bytes) = post(
            app(None),
            "/stream",
            json!({"input": {"sentence": sentence, "language": "ta"}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        // larger than one chunk
        assert!(bytes.len() > STREAM_CHUNK_BYTES);
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.len(), 100 * 160);
    }

    #[tokio::test]
    async fn test_stream_rejects_invalid_input() {
        let (status, body) = post_json(
            app(None),
            "/stream",
            json!({"input": {"sentence": "hello", "language": "fr"}}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "language not supported");
        assert_eq!(body["code"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_upload_returns_cdn_url() {
        let store = Arc::new(MemoryStore::default());
        let uploader = AudioUploader::new(store.clone(), "https://cdn.example.com", "tts/");

        let (status, body) = post_json(
            app(Some(uploader)),
            "/upload",
            json!({"input": {"sentence": "vanakkam", "language": "ta"}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "COMPLETED");
        let url = body["output"]["audio_url"].as_str().unwrap();
        assert!(url.starts_with("https://cdn.example.com/tts/"));

        let objects = store.objects.lock().unwrap();
        let (wav, _) = objects.values().next().unwrap();
        assert!(wav.starts_with(b"RIFF"));
    }

    #[tokio::test]
    async fn test_upload_validation_skips_storage() {
        let store = Arc::new(MemoryStore::default());
        let uploader = AudioUploader::new(store.clone(), "https://cdn.example.com", "");

        let (_, body) = post_json(
            app(Some(uploader)),
            "/upload",
            json!({"input": {"sentence": "", "language": "te"}}),
        )
        .await;

        assert_eq!(body["output"], json!({"error": "sentence is required"}));
        assert!(store.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_not_configured() {
        let (status, body) = post_json(
            app(None),
            "/upload",
            json!({"input": {"sentence": "namaste", "language": "hi"}}),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "UPLOAD_NOT_CONFIGURED");
    }

    #[tokio::test]
    async fn test_upload_validates_before_storage_check() {
        let (status, body) = post_json(
            app(None),
            "/upload",
            json!({"input": {"sentence": "", "language": "hi"}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "FAILED");
        assert_eq!(body["output"], json!({"error": "sentence is required"}));
    }

    #[tokio::test]
    async fn test_stream_accepts_null_input_as_empty() {
        let (status, body) = post_json(app(None), "/stream", json!({"input": null})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "sentence is required");
    }

    #[tokio::test]
    async fn test_languages_and_health() {
        let resp = app(None)
            .oneshot(Request::get("/languages").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["languages"].as_array().unwrap().len(), 4);
        assert_eq!(body["languages"][0]["code"], "hi");
        assert_eq!(body["languages"][0]["sample_rate"], 16_000);

        let resp = app(None)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
