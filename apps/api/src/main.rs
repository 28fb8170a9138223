mod catalog;
mod config;
mod enrichment;
mod errors;
mod llm_client;
mod media;
mod models;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::enrichment::processor::RequestProcessor;
use crate::llm_client::LlmClient;
use crate::media::ImageFetcher;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting request enricher v{}", env!("CARGO_PKG_VERSION"));

    let llm = LlmClient::new(
        &config.inference_api_url,
        &config.inference_api_key,
        &config.inference_model,
        config.inference_timeout_secs,
    )?;
    info!("Inference client initialized (model: {})", llm.model());

    let images = ImageFetcher::new(config.image_fetch_timeout_secs, config.max_image_bytes)?;

    let state = AppState {
        processor: RequestProcessor::with_client(Arc::new(llm)),
        images,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
