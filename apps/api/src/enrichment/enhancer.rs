//! Description Enhancer: rewrites a request description for city workers,
//! conditioned on the verified category. Model output is passed through as is.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::ServiceCategory;
use crate::enrichment::prompts::{system_prompt, ENHANCE_TASK};
use crate::llm_client::schema::{FieldKind, OutputField, OutputSchema};
use crate::llm_client::{infer_typed, InferenceClient, InferenceRequest, LlmError};
use crate::media::Image;

pub static ENHANCER_SCHEMA: OutputSchema = OutputSchema {
    fields: &[
        OutputField {
            name: "enhanced_description",
            kind: FieldKind::Text,
            description: "Enhanced description, more detailed and actionable for city workers",
        },
        OutputField {
            name: "emergency",
            kind: FieldKind::Boolean,
            description: "Whether this poses immediate threat to public safety and shows active danger to a person",
        },
        OutputField {
            name: "image_verified",
            kind: FieldKind::Boolean,
            description: "Whether the image supports the issue",
        },
    ],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementOutcome {
    pub enhanced_description: String,
    pub emergency: bool,
    pub image_verified: bool,
}

/// Capability: produce an enhanced description plus emergency and image flags.
#[async_trait]
pub trait DescriptionEnhancer: Send + Sync {
    async fn enhance(
        &self,
        description: &str,
        image: &Image,
        address: &str,
        category: ServiceCategory,
    ) -> Result<EnhancementOutcome, LlmError>;
}

pub struct InferenceEnhancer {
    client: Arc<dyn InferenceClient>,
}

impl InferenceEnhancer {
    pub fn new(client: Arc<dyn InferenceClient>) -> Self {
        Self { client }
    }
}

pub fn build_enhance_request<'a>(
    description: &str,
    image: &'a Image,
    address: &str,
    category: ServiceCategory,
) -> InferenceRequest<'a> {
    InferenceRequest {
        system: system_prompt(),
        task: ENHANCE_TASK,
        inputs: vec![
            ("description", description.to_string()),
            ("location", address.to_string()),
            ("service_name", category.name().to_string()),
            ("service_definition", category.definition().to_string()),
        ],
        image: Some(image),
        schema: &ENHANCER_SCHEMA,
    }
}

#[async_trait]
impl DescriptionEnhancer for InferenceEnhancer {
    async fn enhance(
        &self,
        description: &str,
        image: &Image,
        address: &str,
        category: ServiceCategory,
    ) -> Result<EnhancementOutcome, LlmError> {
        let request = build_enhance_request(description, image, address, category);
        infer_typed(self.client.as_ref(), &request).await
    }
}
