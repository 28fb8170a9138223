//! Request Processor: orchestrates the two-stage enrichment pipeline.
//!
//! Flow: verify category → resolve effective category → enhance description
//! (conditioned on the effective category) → assemble `ProcessedRequest`.
//!
//! Stages run strictly in sequence. A failure in either stage fails the whole
//! request; no partial result is returned.

use std::sync::Arc;

use tracing::info;

use crate::enrichment::enhancer::{DescriptionEnhancer, InferenceEnhancer};
use crate::enrichment::verifier::{InferenceVerifier, ServiceVerifier};
use crate::errors::{AppError, Stage};
use crate::llm_client::InferenceClient;
use crate::media::ImageFetcher;
use crate::models::processed::ProcessedRequest;
use crate::models::request::{IncomingRequest, ServiceRequestPayload};

/// Holds no per-request state; one instance serves concurrent requests.
#[derive(Clone)]
pub struct RequestProcessor {
    verifier: Arc<dyn ServiceVerifier>,
    enhancer: Arc<dyn DescriptionEnhancer>,
}

impl RequestProcessor {
    pub fn new(verifier: Arc<dyn ServiceVerifier>, enhancer: Arc<dyn DescriptionEnhancer>) -> Self {
        Self { verifier, enhancer }
    }

    /// Both stages backed by the same inference client.
    pub fn with_client(client: Arc<dyn InferenceClient>) -> Self {
        Self::new(
            Arc::new(InferenceVerifier::new(client.clone())),
            Arc::new(InferenceEnhancer::new(client)),
        )
    }

    pub async fn process(&self, request: &IncomingRequest) -> Result<ProcessedRequest, AppError> {
        let current = request.service_name;

        let verification = self
            .verifier
            .verify(&request.description, &request.image, current, &request.address)
            .await
            .map_err(AppError::inference(Stage::Verification))?;

        let effective = verification.effective_category(current);
        info!(
            "Request {}: claimed '{}', keep_service={}, effective '{}' (confidence {:.2})",
            request.service_request_id,
            current,
            verification.keep_service,
            effective,
            verification.confidence
        );

        let enhancement = self
            .enhancer
            .enhance(&request.description, &request.image, &request.address, effective)
            .await
            .map_err(AppError::inference(Stage::Enhancement))?;

        if enhancement.emergency {
            info!("Request {} flagged as emergency", request.service_request_id);
        }

        Ok(ProcessedRequest {
            original_category: current,
            recommended_category: effective,
            updated_description: enhancement.enhanced_description,
            emergency: enhancement.emergency,
            image_verified: enhancement.image_verified,
            confidence: verification.confidence,
            rationale: verification.rationale,
            service_request_id: request.service_request_id.clone(),
            status: request.status.clone(),
            address: request.address.clone(),
            lat: request.lat,
            long: request.long,
            requested_datetime: request.requested_datetime,
            updated_datetime: request.updated_datetime,
        })
    }
}

/// Processes one 311 request from its JSON payload: validate, fetch the image,
/// then run the pipeline.
pub async fn process_311_request(
    payload: ServiceRequestPayload,
    images: &ImageFetcher,
    processor: &RequestProcessor,
) -> Result<ProcessedRequest, AppError> {
    let request = IncomingRequest::resolve(payload, images).await?;
    processor.process(&request).await
}
