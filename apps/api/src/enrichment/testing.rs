//! Scripted inference client for pipeline tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm_client::{InferenceClient, InferenceRequest, LlmError};

/// What a stage sent to the inference collaborator.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub fields: Vec<&'static str>,
    pub inputs: Vec<(&'static str, String)>,
    pub had_image: bool,
}

impl RecordedCall {
    pub fn input(&self, name: &str) -> Option<&str> {
        self.inputs
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Replies with queued results in order and records every request.
/// Fails with `EmptyContent` once the queue runs dry.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<Value, LlmError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<Value, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceClient for ScriptedClient {
    async fn infer(&self, request: &InferenceRequest<'_>) -> Result<Value, LlmError> {
        self.calls.lock().unwrap().push(RecordedCall {
            fields: request.schema.fields.iter().map(|f| f.name).collect(),
            inputs: request.inputs.clone(),
            had_image: request.image.is_some(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyContent))
    }
}
