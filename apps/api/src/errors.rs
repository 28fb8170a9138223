use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;

/// The pipeline stage an inference failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Verification,
    Enhancement,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Verification => f.write_str("verification"),
            Stage::Enhancement => f.write_str("enhancement"),
        }
    }
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Raised before any inference call: unknown category, bad timestamp, unresolvable image.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Inference failed during {stage}: {source}")]
    Inference {
        stage: Stage,
        #[source]
        source: LlmError,
    },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn inference(stage: Stage) -> impl FnOnce(LlmError) -> AppError {
        move |source| AppError::Inference { stage, source }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Inference { stage, source } => {
                tracing::error!("Inference error during {stage}: {source}");
                if source.is_schema() {
                    (
                        StatusCode::BAD_GATEWAY,
                        "SCHEMA_CONFORMANCE_ERROR",
                        format!("The model returned a non-conforming {stage} result"),
                    )
                } else if source.is_timeout() {
                    (
                        StatusCode::GATEWAY_TIMEOUT,
                        "INFERENCE_TIMEOUT",
                        format!("The {stage} inference call timed out"),
                    )
                } else {
                    (
                        StatusCode::BAD_GATEWAY,
                        "INFERENCE_ERROR",
                        format!("The {stage} inference call failed"),
                    )
                }
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
