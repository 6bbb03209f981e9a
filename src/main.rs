use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod error;
mod storage;
mod tts;

use api::routes::{create_router, AppState};
use config::Config;
use error::AppError;
use storage::AudioUploader;
use tts::TtsService;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing::info!("MMS TTS worker v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Models directory: {}", config.models_dir.display());
    tracing::info!("Device: {:?}", config.device);

    // Every model is loaded before the listener opens
    let models_dir = config.models_dir.clone();
    let (device, threads, max_chars) = (
        config.device,
        config.intra_threads,
        config.max_sentence_chars,
    );
    let tts = tokio::task::spawn_blocking(move || {
        TtsService::load(&models_dir, device, threads, max_chars)
    })
    .await
    .map_err(|e| AppError::TtsError(format!("Model loading task failed: {}", e)))??;

    let uploader = match &config.storage {
        Some(storage) => {
            tracing::info!(
                "Uploads enabled: bucket {} served from {}",
                storage.bucket,
                storage.cdn_base_url
            );
            Some(AudioUploader::from_config(storage).await)
        }
        None => {
            tracing::info!("Uploads disabled (BUCKET_NAME/CDN_BASE_URL not set)");
            None
        }
    };

    let state = Arc::new(AppState { tts, uploader });
    let app = create_router(state);

    tracing::info!("Starting server on http://{}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
