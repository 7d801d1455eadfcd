use crate::traits::{LlmClient, LlmResponse};
use async_trait::async_trait;
use reprise_common::{RepriseError, Result};
use reprise_http::HttpClient;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const OLLAMA_CONNECTION_ERROR: &str = "No running Ollama server detected. Start it with: `ollama serve` (after installing). Install instructions: https://github.com/ollama/ollama";

/// Ollama client for local model inference.
///
/// Expects a running Ollama server (see https://github.com/ollama/ollama).
pub struct OllamaClient {
    client: HttpClient,
    model: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaClient {
    /// Create a new client and verify server/model availability.
    pub async fn new(base_url: &str, model: String) -> Result<Self> {
        let client = Self::unchecked(base_url, model)?;
        let models = client.fetch_available_models().await?;

        if !models.iter().any(|m| m == &client.model) {
            tracing::info!(model = %client.model, "llm.ollama.pulling_model");
            client.pull_model().await?;
        }

        Ok(client)
    }

    /// Build a client without probing the server.
    pub fn unchecked(base_url: &str, model: String) -> Result<Self> {
        let client = HttpClient::new(base_url)
            .map_err(|e| RepriseError::Llm(format!("Failed to create HTTP client: {e}")))?
            // local models can take a while on the first prompt
            .with_timeout(Duration::from_secs(300))
            .with_retries(0);
        Ok(Self { client, model })
    }

    async fn fetch_available_models(&self) -> Result<Vec<String>> {
        let tags: TagsResponse = self.client.get_json("api/tags").await.map_err(|e| {
            tracing::warn!(error = %e, "llm.ollama.probe_failed");
            RepriseError::Llm(OLLAMA_CONNECTION_ERROR.to_string())
        })?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull_model(&self) -> Result<()> {
        let _: serde_json::Value = self
            .client
            .post_json(
                "api/pull",
                None,
                &json!({ "model": self.model, "stream": false }),
            )
            .await
            .map_err(|e| RepriseError::Llm(format!("Failed to pull model: {e}")))?;
        tracing::info!(model = %self.model, "llm.ollama.pulled_model");
        Ok(())
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let mut options = serde_json::Map::new();
        if let Some(temp) = temperature {
            options.insert("temperature".to_string(), json!(temp));
        }
        if let Some(max_tok) = max_tokens {
            options.insert("num_predict".to_string(), json!(max_tok));
        }

        let mut payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": options,
        });
        if let Some(system) = system_prompt {
            payload["system"] = json!(system);
        }

        let resp: GenerateResponse = self
            .client
            .post_json("api/generate", None, &payload)
            .await
            .map_err(|e| RepriseError::Llm(format!("Generate request failed: {e}")))?;

        Ok(LlmResponse {
            text: resp.response,
            model: Some(self.model.clone()),
            tokens_used: resp.eval_count,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.fetch_available_models().await.is_ok())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
