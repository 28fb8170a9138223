// 311 request enrichment: category verification, description enhancement,
// and the processor that composes them.
// All inference goes through llm_client::InferenceClient.

pub mod enhancer;
pub mod handlers;
pub mod processor;
pub mod prompts;
pub mod verifier;

#[cfg(test)]
pub mod testing;
