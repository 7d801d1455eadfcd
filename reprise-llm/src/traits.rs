use async_trait::async_trait;
use reprise_common::{RepriseError, Result};
use serde::{Deserialize, Serialize};

use crate::extract_json_block;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response to the given prompt with optional system prompt
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse>;

    /// Check if the LLM service is available
    async fn health_check(&self) -> Result<bool>;

    /// Get the model name being used
    fn model_name(&self) -> &str;

    /// Generate deterministically and decode the reply as a JSON object.
    ///
    /// Replies wrapped in a ```json fence or surrounded by prose are tolerated.
    async fn generate_json(
        &self,
        prompt: &str,
        system_prompt: &str,
        max_tokens: Option<u32>,
    ) -> Result<serde_json::Value> {
        let response = self
            .generate(prompt, Some(system_prompt), max_tokens, Some(0.0))
            .await?;
        let text = response.text.trim();
        tracing::debug!(model = self.model_name(), reply_len = text.len(), "llm.generate_json");

        let json = extract_json_block(text).unwrap_or_else(|| text.to_string());
        serde_json::from_str(&json)
            .map_err(|e| RepriseError::Llm(format!("reply was not valid JSON: {e}: {text}")))
    }
}
