//! Incoming 311 request: the raw JSON payload and its validated, image-resolved form.

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

use crate::catalog::ServiceCategory;
use crate::errors::AppError;
use crate::media::{Image, ImageFetcher};

/// A 311 request as submitted. Fields beyond these (status_notes, service_code,
/// token, ...) are accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceRequestPayload {
    pub service_request_id: String,
    pub status: String,
    pub service_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub address: String,
    pub lat: f64,
    pub long: f64,
    pub requested_datetime: String,
    pub updated_datetime: String,
    #[serde(default)]
    pub media_url: Option<String>,
}

/// One citizen report, validated and with its image resolved. Read-only once built.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub service_request_id: String,
    pub status: String,
    pub service_name: ServiceCategory,
    pub description: String,
    pub address: String,
    pub lat: f64,
    pub long: f64,
    pub requested_datetime: DateTime<FixedOffset>,
    pub updated_datetime: DateTime<FixedOffset>,
    pub image: Image,
}

struct CheckedFields {
    category: ServiceCategory,
    requested: DateTime<FixedOffset>,
    updated: DateTime<FixedOffset>,
}

impl ServiceRequestPayload {
    fn check(&self) -> Result<CheckedFields, AppError> {
        let category = self
            .service_name
            .parse::<ServiceCategory>()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        Ok(CheckedFields {
            category,
            requested: parse_timestamp("requested_datetime", &self.requested_datetime)?,
            updated: parse_timestamp("updated_datetime", &self.updated_datetime)?,
        })
    }
}

impl IncomingRequest {
    /// Validates the payload, then downloads its image. The image is fetched
    /// last so a malformed payload never triggers a download.
    pub async fn resolve(
        payload: ServiceRequestPayload,
        images: &ImageFetcher,
    ) -> Result<Self, AppError> {
        let checked = payload.check()?;

        let url = payload
            .media_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AppError::Validation("media_url is required".to_string()))?;
        let image = images.fetch(url).await?;

        Ok(Self::assemble(payload, checked, image))
    }

    /// Validates the payload against an already resolved image.
    pub fn with_image(payload: ServiceRequestPayload, image: Image) -> Result<Self, AppError> {
        let checked = payload.check()?;
        Ok(Self::assemble(payload, checked, image))
    }

    fn assemble(payload: ServiceRequestPayload, checked: CheckedFields, image: Image) -> Self {
        Self {
            service_request_id: payload.service_request_id,
            status: payload.status,
            service_name: checked.category,
            description: payload.description,
            address: payload.address,
            lat: payload.lat,
            long: payload.long,
            requested_datetime: checked.requested,
            updated_datetime: checked.updated,
            image,
        }
    }
}

/// Parses an ISO-8601 / RFC 3339 timestamp. A `Z` suffix becomes a `+00:00`
/// offset; timestamps without any offset are rejected.
pub fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<FixedOffset>, AppError> {
    DateTime::parse_from_rfc3339(value.trim()).map_err(|e| {
        AppError::Validation(format!(
            "{field} '{value}' is not a timezone-aware ISO-8601 timestamp: {e}"
        ))
    })
}
