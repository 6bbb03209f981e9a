use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::storage::AudioUploader;
use crate::tts::TtsService;

pub struct AppState {
    pub tts: TtsService,
    pub uploader: Option<AudioUploader>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/runsync", post(handlers::run_inline))
        .route("/stream", post(handlers::run_stream))
        .route("/upload", post(handlers::run_upload))
        .route("/languages", get(handlers::list_languages))
        .route("/health", get(handlers::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
