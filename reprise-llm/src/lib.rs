//! Provider-agnostic LLM integration for Reprise.
//!
//! This crate exposes a common [`traits::LlmClient`] interface and concrete
//! provider implementations for Ollama and OpenAI. It also provides a
//! convenience function to initialize a client from a [`reprise_common::LlmConfig`].
//!
//! # Examples
//! ```no_run
//! use reprise_common::{LlmConfig, Result};
//! use reprise_llm::ensure_llm_ready;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let cfg = LlmConfig::default();
//! let client = ensure_llm_ready(&cfg).await?;
//! assert!(!client.model_name().is_empty());
//! # Ok(())
//! # }
//! ```
pub mod ollama;
pub mod openai;
pub mod traits;

use reprise_common::{LlmConfig, RepriseError};
use regex::Regex;
use std::sync::Arc;
use traits::LlmClient;

/// Default model recommendations for element resolution
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2:3b";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Build a client for `config`, verifying local providers are reachable.
pub async fn ensure_llm_ready(
    config: &LlmConfig,
) -> reprise_common::Result<Arc<dyn LlmClient + Send + Sync + 'static>> {
    match config {
        #[cfg(feature = "ollama")]
        LlmConfig::Ollama { base_url, model } => {
            let client = ollama::OllamaClient::new(base_url, model.clone()).await?;
            Ok(Arc::new(client))
        }
        #[cfg(feature = "openai")]
        LlmConfig::OpenAi {
            api_key,
            model,
            base_url,
        } => {
            let client = match base_url {
                Some(base) => openai::OpenAiClient::with_base_url(base, api_key.clone(), model.clone())?,
                None => openai::OpenAiClient::new(api_key.clone(), model.clone())?,
            };
            Ok(Arc::new(client))
        }
        LlmConfig::None => Err(RepriseError::Config("No LLM configured".to_string())),
        #[allow(unreachable_patterns)]
        _ => Err(RepriseError::Config("LLM provider not enabled".to_string())),
    }
}

/// Try to extract a ```json ... ``` fenced block; fall back to the outermost braces.
pub fn extract_json_block(text: &str) -> Option<String> {
    let re_fence = Regex::new("(?s)```json\\s*(\\{.*?\\})\\s*```").ok()?;
    if let Some(caps) = re_fence.captures(text) {
        return Some(caps.get(1)?.as_str().to_string());
    }
    let re_plain = Regex::new("(?s)(\\{.*\\})").ok()?;
    re_plain
        .captures(text)
        .and_then(|c| c.get(1).map(|m| m.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulls_object_out_of_fence() {
        let text = "Here you go:\n```json\n{\"elements\": []}\n```\nthanks";
        assert_eq!(extract_json_block(text).as_deref(), Some("{\"elements\": []}"));
    }

    #[test]
    fn falls_back_to_outer_braces() {
        let text = "sure {\"a\": {\"b\": 1}} done";
        assert_eq!(extract_json_block(text).as_deref(), Some("{\"a\": {\"b\": 1}}"));
        assert!(extract_json_block("no json here").is_none());
    }

    #[tokio::test]
    async fn none_provider_is_a_config_error() {
        let err = ensure_llm_ready(&LlmConfig::None).await.err().unwrap();
        assert!(matches!(err, RepriseError::Config(_)));
    }
}
