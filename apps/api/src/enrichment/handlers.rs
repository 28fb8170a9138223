//! Axum route handlers for the Enrichment API.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::catalog::ServiceCategory;
use crate::enrichment::processor::process_311_request;
use crate::errors::AppError;
use crate::models::processed::ProcessedRequest;
use crate::models::request::ServiceRequestPayload;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CategoryEntry {
    pub name: &'static str,
    pub definition: &'static str,
}

/// POST /api/v1/requests/process
///
/// Verifies the category of a 311 request and returns it with an enhanced description.
pub async fn handle_process(
    State(state): State<AppState>,
    Json(payload): Json<ServiceRequestPayload>,
) -> Result<Json<ProcessedRequest>, AppError> {
    let processed = process_311_request(payload, &state.images, &state.processor).await?;
    Ok(Json(processed))
}

/// GET /api/v1/categories
pub async fn handle_list_categories() -> Json<Vec<CategoryEntry>> {
    Json(
        ServiceCategory::all()
            .map(|c| CategoryEntry {
                name: c.name(),
                definition: c.definition(),
            })
            .collect(),
    )
}
