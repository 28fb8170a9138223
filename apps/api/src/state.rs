use crate::config::Config;
use crate::enrichment::processor::RequestProcessor;
use crate::media::ImageFetcher;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub processor: RequestProcessor,
    pub images: ImageFetcher,
    pub config: Config,
}
