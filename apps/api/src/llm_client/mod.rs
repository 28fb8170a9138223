/// LLM Client: the single point of entry for multimodal inference calls.
///
/// ARCHITECTURAL RULE: no other module may call the inference backend directly.
/// Pipeline stages depend on the `InferenceClient` trait; `LlmClient` is the
/// production implementation against the Anthropic Messages API.
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::media::Image;

pub mod prompts;
pub mod schema;

use prompts::{JSON_ONLY_SYSTEM, OUTPUT_SCHEMA_HEADING};
use schema::OutputSchema;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The model replied, but the reply does not match the requested schema.
    #[error("Schema conformance error: {0}")]
    Schema(String),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("Inference call timed out")]
    Timeout,
}

impl LlmError {
    pub fn is_schema(&self) -> bool {
        matches!(self, LlmError::Schema(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Timeout)
    }
}

/// One structured inference call: named text inputs, an optional image, and
/// the schema the reply must conform to.
#[derive(Debug, Clone)]
pub struct InferenceRequest<'a> {
    pub system: &'a str,
    pub task: &'a str,
    pub inputs: Vec<(&'static str, String)>,
    pub image: Option<&'a Image>,
    pub schema: &'static OutputSchema,
}

impl<'a> InferenceRequest<'a> {
    /// System prompt with the JSON-only instruction appended.
    pub fn system_prompt(&self) -> String {
        format!("{}\n\n{}", self.system, JSON_ONLY_SYSTEM)
    }

    /// User-turn text: task, inputs, then the output schema.
    pub fn render_prompt(&self) -> String {
        let inputs = self
            .inputs
            .iter()
            .map(|(name, value)| format!("{}: {}", name.to_uppercase(), value))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "{task}\n\nINPUTS:\n{inputs}\n\n{heading}\n{{\n{schema}\n}}",
            task = self.task,
            heading = OUTPUT_SCHEMA_HEADING,
            schema = self.schema.render(),
        )
    }
}

/// Capability: execute a structured prompt against a multimodal model.
///
/// Implementations own retries, timeouts and connection reuse. The returned
/// value is the raw JSON reply; callers conform it via `infer_typed`.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn infer(&self, request: &InferenceRequest<'_>) -> Result<Value, LlmError>;
}

/// Runs `request`, checks the reply against its schema, and deserializes it.
pub async fn infer_typed<T: DeserializeOwned>(
    client: &dyn InferenceClient,
    request: &InferenceRequest<'_>,
) -> Result<T, LlmError> {
    let raw = client.infer(request).await?;
    let conformed = request.schema.conform(raw)?;
    serde_json::from_value(conformed).map_err(|e| LlmError::Schema(e.to_string()))
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    source_type: &'a str,
    media_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Production inference client.
/// Wraps the Anthropic Messages API with retry logic and image content blocks.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_url: &str, api_key: &str, model: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build inference HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Makes a raw call to the Messages API, returning the full response object.
    /// Retries on 429 (rate limit), 5xx and transport errors with exponential backoff.
    pub async fn call(
        &self,
        prompt: &str,
        system: &str,
        image: Option<&Image>,
    ) -> Result<LlmResponse, LlmError> {
        let mut content = Vec::with_capacity(2);
        if let Some(image) = image {
            content.push(ContentPart::Image {
                source: ImageSource {
                    source_type: "base64",
                    media_type: &image.media_type,
                    data: image.to_base64(),
                },
            });
        }
        content.push(ContentPart::Text { text: prompt });

        let request_body = AnthropicRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content,
            }],
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "Inference call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&self.api_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    last_error = Some(LlmError::Timeout);
                    continue;
                }
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Inference API returned {}: {}", status, body);
                last_error = Some(if status.as_u16() == 429 {
                    LlmError::RateLimited {
                        retries: MAX_RETRIES,
                    }
                } else {
                    LlmError::Api {
                        status: status.as_u16(),
                        message: body,
                    }
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let llm_response: LlmResponse = response.json().await.map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Http(e)
                }
            })?;

            debug!(
                "Inference call succeeded: input_tokens={}, output_tokens={}",
                llm_response.usage.input_tokens, llm_response.usage.output_tokens
            );

            return Ok(llm_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl InferenceClient for LlmClient {
    async fn infer(&self, request: &InferenceRequest<'_>) -> Result<Value, LlmError> {
        let system = request.system_prompt();
        let prompt = request.render_prompt();
        let response = self.call(&prompt, &system, request.image).await?;

        let text = response.text().ok_or(LlmError::EmptyContent)?;
        let text = strip_json_fences(text);

        serde_json::from_str(text).map_err(LlmError::Parse)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(stripped) => stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start()),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::schema::{FieldKind, OutputField};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use axum::{response::IntoResponse, routing::post, Json, Router};
    use serde_json::json;

    const FLAG_SCHEMA: OutputSchema = OutputSchema {
        fields: &[OutputField {
            name: "flag",
            kind: FieldKind::Boolean,
            description: "a flag",
        }],
    };

    struct FixedClient(Value);

    #[async_trait]
    impl InferenceClient for FixedClient {
        async fn infer(&self, _request: &InferenceRequest<'_>) -> Result<Value, LlmError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Debug, Deserialize)]
    struct Flag {
        flag: bool,
    }

    fn request<'a>(image: Option<&'a Image>) -> InferenceRequest<'a> {
        InferenceRequest {
            system: "You are a test assistant.",
            task: "Decide the flag.",
            inputs: vec![("description", "Garbage on sidewalk".to_string())],
            image,
            schema: &FLAG_SCHEMA,
        }
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_render_prompt_contains_inputs_and_schema() {
        let prompt = request(None).render_prompt();
        assert!(prompt.starts_with("Decide the flag."));
        assert!(prompt.contains("DESCRIPTION: Garbage on sidewalk"));
        assert!(prompt.contains(OUTPUT_SCHEMA_HEADING));
        assert!(prompt.contains("\"flag\": boolean"));
    }

    #[test]
    fn test_system_prompt_appends_json_instruction() {
        let system = request(None).system_prompt();
        assert!(system.starts_with("You are a test assistant."));
        assert!(system.ends_with(JSON_ONLY_SYSTEM));
    }

    #[test]
    fn test_image_content_part_serializes_as_base64_block() {
        let part = ContentPart::Image {
            source: ImageSource {
                source_type: "base64",
                media_type: "image/jpeg",
                data: "/9j/".to_string(),
            },
        };
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(
            value,
            json!({"type": "image", "source": {"type": "base64", "media_type": "image/jpeg", "data": "/9j/"}})
        );
    }

    #[tokio::test]
    async fn test_infer_typed_conforms_and_deserializes() {
        let client = FixedClient(json!({"flag": true, "noise": 1}));
        let flag: Flag = infer_typed(&client, &request(None)).await.unwrap();
        assert!(flag.flag);
    }

    #[tokio::test]
    async fn test_infer_typed_rejects_nonconforming_reply() {
        let client = FixedClient(json!({"flag": "yes"}));
        let err = infer_typed::<Flag>(&client, &request(None)).await.unwrap_err();
        assert!(err.is_schema());
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1/messages")
    }

    #[tokio::test]
    async fn test_llm_client_sends_image_and_parses_fenced_reply() {
        let app = Router::new().route(
            "/v1/messages",
            post(|Json(body): Json<Value>| async move {
                let content = &body["messages"][0]["content"];
                let saw_image = content[0]["type"] == "image"
                    && content[0]["source"]["media_type"] == "image/png";
                let saw_model = body["model"] == "test-model";
                let reply = format!(
                    "```json\n{{\"flag\": {}}}\n```",
                    saw_image && saw_model && content[1]["type"] == "text"
                );
                Json(json!({
                    "content": [{"type": "text", "text": reply}],
                    "usage": {"input_tokens": 10, "output_tokens": 5}
                }))
            }),
        );
        let url = serve(app).await;
        let client = LlmClient::new(&url, "key", "test-model", 5).unwrap();
        let image = Image::new(vec![0x89, b'P', b'N', b'G'], "image/png");

        let flag: Flag = infer_typed(&client, &request(Some(&image))).await.unwrap();
        assert!(flag.flag);
    }

    #[tokio::test]
    async fn test_llm_client_surfaces_client_errors_without_retry() {
        let app = Router::new().route(
            "/v1/messages",
            post(|| async {
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    Json(json!({"error": {"message": "bad image"}})),
                )
            }),
        );
        let url = serve(app).await;
        let client = LlmClient::new(&url, "key", "test-model", 5).unwrap();

        let err = client.infer(&request(None)).await.unwrap_err();
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad image");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    fn flag_reply() -> Json<Value> {
        Json(json!({
            "content": [{"type": "text", "text": "{\"flag\": true}"}],
            "usage": {"input_tokens": 1, "output_tokens": 1}
        }))
    }

    #[tokio::test]
    async fn test_llm_client_retries_server_error_then_succeeds() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/v1/messages",
            post(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        (axum::http::StatusCode::SERVICE_UNAVAILABLE, "overloaded").into_response()
                    } else {
                        flag_reply().into_response()
                    }
                }
            }),
        );
        let url = serve(app).await;
        let client = LlmClient::new(&url, "key", "test-model", 5).unwrap();

        let flag: Flag = infer_typed(&client, &request(None)).await.unwrap();
        assert!(flag.flag);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_llm_client_reports_rate_limit_after_exhausting_retries() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/v1/messages",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (axum::http::StatusCode::TOO_MANY_REQUESTS, "slow down")
                }
            }),
        );
        let url = serve(app).await;
        let client = LlmClient::new(&url, "key", "test-model", 5).unwrap();

        let err = client.infer(&request(None)).await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { retries: MAX_RETRIES }));
        assert_eq!(hits.load(Ordering::SeqCst), MAX_RETRIES);
    }

    #[tokio::test]
    async fn test_llm_client_maps_slow_backend_to_timeout() {
        let app = Router::new().route(
            "/v1/messages",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                flag_reply()
            }),
        );
        let url = serve(app).await;
        let client = LlmClient::new(&url, "key", "test-model", 1).unwrap();

        let err = client.infer(&request(None)).await.unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err:?}");
    }

    #[tokio::test]
    async fn test_llm_client_rejects_non_json_reply() {
        let app = Router::new().route(
            "/v1/messages",
            post(|| async {
                Json(json!({
                    "content": [{"type": "text", "text": "I cannot help with that."}],
                    "usage": {"input_tokens": 1, "output_tokens": 1}
                }))
            }),
        );
        let url = serve(app).await;
        let client = LlmClient::new(&url, "key", "test-model", 5).unwrap();

        let err = client.infer(&request(None)).await.unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
    }
}
