//! Service Verifier: asks the model whether a request's category is right,
//! then applies the conservative override policy.
//!
//! Model recategorization is unreliable on thin signal. When the description is
//! very short, or the model's own rationale admits ambiguity, the citizen's
//! original category is kept with a neutral confidence of 0.5.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::{ServiceCategory, CATEGORY_NAMES};
use crate::enrichment::prompts::{system_prompt, VERIFY_TASK};
use crate::llm_client::schema::{FieldKind, OutputField, OutputSchema};
use crate::llm_client::{infer_typed, InferenceClient, InferenceRequest, LlmError};
use crate::media::Image;

/// Descriptions shorter than this (in characters, after trimming) are too thin to recategorize.
pub const MIN_DESCRIPTION_CHARS: usize = 10;

/// Confidence assigned whenever the override policy fires.
pub const OVERRIDE_CONFIDENCE: f64 = 0.5;

pub static VERIFIER_SCHEMA: OutputSchema = OutputSchema {
    fields: &[
        OutputField {
            name: "keep_service",
            kind: FieldKind::Boolean,
            description: "Whether to keep the current service classification",
        },
        OutputField {
            name: "recommended_service",
            kind: FieldKind::Enumerated(CATEGORY_NAMES),
            description: "The recommended service if different",
        },
        OutputField {
            name: "confidence",
            kind: FieldKind::UnitFloat,
            description: "Confidence in the classification (0-1)",
        },
        OutputField {
            name: "rationale",
            kind: FieldKind::Text,
            description: "Reasoning for the recommendation",
        },
    ],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub keep_service: bool,
    #[serde(rename = "recommended_service")]
    pub recommended_category: ServiceCategory,
    pub confidence: f64,
    pub rationale: String,
}

impl VerificationOutcome {
    /// The category the rest of the pipeline should use.
    pub fn effective_category(&self, current: ServiceCategory) -> ServiceCategory {
        if self.keep_service {
            current
        } else {
            self.recommended_category
        }
    }
}

/// Why the override policy discarded the model's recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideReason {
    ShortDescription,
    MultipleIssues,
    ConflictingInformation,
    InsufficientContext,
}

impl fmt::Display for OverrideReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverrideReason::ShortDescription => "short description",
            OverrideReason::MultipleIssues => "multiple issues",
            OverrideReason::ConflictingInformation => "conflicting information",
            OverrideReason::InsufficientContext => "insufficient context",
        };
        f.write_str(s)
    }
}

const RATIONALE_TRIGGERS: &[(&str, OverrideReason)] = &[
    ("multiple issues", OverrideReason::MultipleIssues),
    ("conflicting information", OverrideReason::ConflictingInformation),
    ("insufficient context", OverrideReason::InsufficientContext),
];

/// Returns the first override condition that holds, if any.
pub fn override_reason(description: &str, rationale: &str) -> Option<OverrideReason> {
    if description.trim().chars().count() < MIN_DESCRIPTION_CHARS {
        return Some(OverrideReason::ShortDescription);
    }
    let rationale = rationale.to_lowercase();
    RATIONALE_TRIGGERS
        .iter()
        .find(|(phrase, _)| rationale.contains(phrase))
        .map(|(_, reason)| *reason)
}

/// Applies the override policy to a raw model outcome. The rationale is never altered.
pub fn apply_override_policy(
    description: &str,
    current: ServiceCategory,
    raw: VerificationOutcome,
) -> (VerificationOutcome, Option<OverrideReason>) {
    match override_reason(description, &raw.rationale) {
        Some(reason) => (
            VerificationOutcome {
                keep_service: true,
                recommended_category: current,
                confidence: OVERRIDE_CONFIDENCE,
                rationale: raw.rationale,
            },
            Some(reason),
        ),
        None => (raw, None),
    }
}

/// Capability: confirm or correct a request's category.
#[async_trait]
pub trait ServiceVerifier: Send + Sync {
    async fn verify(
        &self,
        description: &str,
        image: &Image,
        current: ServiceCategory,
        address: &str,
    ) -> Result<VerificationOutcome, LlmError>;
}

/// Verifier backed by the inference collaborator.
pub struct InferenceVerifier {
    client: Arc<dyn InferenceClient>,
}

impl InferenceVerifier {
    pub fn new(client: Arc<dyn InferenceClient>) -> Self {
        Self { client }
    }
}

pub fn build_verify_request<'a>(
    description: &str,
    image: &'a Image,
    current: ServiceCategory,
    address: &str,
) -> InferenceRequest<'a> {
    InferenceRequest {
        system: system_prompt(),
        task: VERIFY_TASK,
        inputs: vec![
            ("description", description.to_string()),
            ("location", address.to_string()),
            ("current_service", current.name().to_string()),
        ],
        image: Some(image),
        schema: &VERIFIER_SCHEMA,
    }
}

#[async_trait]
impl ServiceVerifier for InferenceVerifier {
    async fn verify(
        &self,
        description: &str,
        image: &Image,
        current: ServiceCategory,
        address: &str,
    ) -> Result<VerificationOutcome, LlmError> {
        let request = build_verify_request(description, image, current, address);
        let raw: VerificationOutcome = infer_typed(self.client.as_ref(), &request).await?;

        let (outcome, reason) = apply_override_policy(description, current, raw);
        if let Some(reason) = reason {
            info!("Verification override applied ({reason}): keeping '{current}'");
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::testing::ScriptedClient;
    use serde_json::json;

    const LONG_DESCRIPTION: &str =
        "Lots of trash behind Washington St SL stop by Blackstone school";

    fn raw(keep: bool, recommended: ServiceCategory, confidence: f64, rationale: &str) -> VerificationOutcome {
        VerificationOutcome {
            keep_service: keep,
            recommended_category: recommended,
            confidence,
            rationale: rationale.to_string(),
        }
    }

    fn image() -> Image {
        Image::new(vec![0xFF, 0xD8, 0xFF], "image/jpeg")
    }

    #[test]
    fn test_short_descriptions_always_override() {
        for description in ["", "x", "   ", "123456789", "   trash    ", "ゴミが多い"] {
            let (outcome, reason) = apply_override_policy(
                description,
                ServiceCategory::Litter,
                raw(false, ServiceCategory::Pothole, 0.97, "Clear pothole in image"),
            );
            assert_eq!(reason, Some(OverrideReason::ShortDescription), "{description:?}");
            assert!(outcome.keep_service);
            assert_eq!(outcome.confidence, OVERRIDE_CONFIDENCE);
            assert_eq!(outcome.recommended_category, ServiceCategory::Litter);
        }
    }

    #[test]
    fn test_ten_characters_is_enough() {
        assert_eq!(override_reason("1234567890", "Looks fine"), None);
        assert_eq!(override_reason("  1234567890  ", "Looks fine"), None);
    }

    #[test]
    fn test_rationale_triggers_are_case_insensitive() {
        let cases = [
            ("There are MULTIPLE ISSUES here", OverrideReason::MultipleIssues),
            ("The photo gives Conflicting Information", OverrideReason::ConflictingInformation),
            ("insufficient context to decide", OverrideReason::InsufficientContext),
        ];
        for (rationale, expected) in cases {
            assert_eq!(override_reason(LONG_DESCRIPTION, rationale), Some(expected));
        }
    }

    #[test]
    fn test_rationale_trigger_overrides_a_recategorization() {
        let rationale = "There are multiple issues present in this report";
        let (outcome, reason) = apply_override_policy(
            LONG_DESCRIPTION,
            ServiceCategory::RequestsForStreetCleaning,
            raw(false, ServiceCategory::OverflowingTrashCan, 0.8, rationale),
        );
        assert_eq!(reason, Some(OverrideReason::MultipleIssues));
        assert!(outcome.keep_service);
        assert_eq!(outcome.confidence, 0.5);
        assert_eq!(outcome.recommended_category, ServiceCategory::RequestsForStreetCleaning);
        assert_eq!(outcome.rationale, rationale);
    }

    #[test]
    fn test_no_trigger_passes_raw_outcome_through() {
        let original = raw(false, ServiceCategory::OverflowingTrashCan, 0.82, "Bin is overflowing");
        let (outcome, reason) =
            apply_override_policy(LONG_DESCRIPTION, ServiceCategory::Litter, original.clone());
        assert_eq!(reason, None);
        assert_eq!(outcome, original);
    }

    #[test]
    fn test_effective_category() {
        let kept = raw(true, ServiceCategory::Pothole, 0.9, "");
        assert_eq!(kept.effective_category(ServiceCategory::Litter), ServiceCategory::Litter);
        let changed = raw(false, ServiceCategory::Pothole, 0.9, "");
        assert_eq!(changed.effective_category(ServiceCategory::Litter), ServiceCategory::Pothole);
    }

    #[test]
    fn test_outcome_deserializes_from_model_field_names() {
        let outcome: VerificationOutcome = serde_json::from_value(json!({
            "keep_service": false,
            "recommended_service": "Illegal Parking",
            "confidence": 0.7,
            "rationale": "Car blocks a hydrant"
        }))
        .unwrap();
        assert_eq!(outcome.recommended_category, ServiceCategory::IllegalParking);
    }

    #[tokio::test]
    async fn test_verify_sends_inputs_and_image() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(json!({
            "keep_service": true,
            "recommended_service": "Requests for Street Cleaning",
            "confidence": 0.9,
            "rationale": "Trash visible on the sidewalk"
        }))]));
        let verifier = InferenceVerifier::new(client.clone());

        let outcome = verifier
            .verify(
                LONG_DESCRIPTION,
                &image(),
                ServiceCategory::RequestsForStreetCleaning,
                "Washington St",
            )
            .await
            .unwrap();

        assert!(outcome.keep_service);
        assert_eq!(outcome.confidence, 0.9);

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].had_image);
        assert_eq!(calls[0].input("description"), Some(LONG_DESCRIPTION));
        assert_eq!(calls[0].input("location"), Some("Washington St"));
        assert_eq!(calls[0].input("current_service"), Some("Requests for Street Cleaning"));
        assert_eq!(
            calls[0].fields,
            vec!["keep_service", "recommended_service", "confidence", "rationale"]
        );
    }

    #[tokio::test]
    async fn test_verify_overrides_short_description_regardless_of_model() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(json!({
            "keep_service": false,
            "recommended_service": "Pothole",
            "confidence": 0.99,
            "rationale": "Definitely a pothole"
        }))]));
        let verifier = InferenceVerifier::new(client);

        let outcome = verifier
            .verify("x", &image(), ServiceCategory::Litter, "")
            .await
            .unwrap();

        assert!(outcome.keep_service);
        assert_eq!(outcome.confidence, 0.5);
        assert_eq!(outcome.recommended_category, ServiceCategory::Litter);
        assert_eq!(outcome.rationale, "Definitely a pothole");
    }

    #[tokio::test]
    async fn test_verify_rejects_out_of_range_confidence() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(json!({
            "keep_service": true,
            "recommended_service": "Litter",
            "confidence": 9.0,
            "rationale": "Sure"
        }))]));
        let verifier = InferenceVerifier::new(client);

        let err = verifier
            .verify(LONG_DESCRIPTION, &image(), ServiceCategory::Litter, "")
            .await
            .unwrap_err();
        assert!(err.is_schema());
    }

    #[tokio::test]
    async fn test_verify_rejects_category_outside_catalog() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(json!({
            "keep_service": false,
            "recommended_service": "Snow Removal",
            "confidence": 0.6,
            "rationale": "Snow on the road"
        }))]));
        let verifier = InferenceVerifier::new(client);

        let err = verifier
            .verify(LONG_DESCRIPTION, &image(), ServiceCategory::Litter, "")
            .await
            .unwrap_err();
        assert!(err.is_schema());
    }

    #[tokio::test]
    async fn test_verify_propagates_client_failure() {
        let client = Arc::new(ScriptedClient::new(vec![Err(LlmError::Timeout)]));
        let verifier = InferenceVerifier::new(client);

        let err = verifier
            .verify(LONG_DESCRIPTION, &image(), ServiceCategory::Litter, "")
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
