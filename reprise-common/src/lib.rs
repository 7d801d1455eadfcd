//! Common types and utilities shared across Reprise crates.
//!
//! This crate defines the provider-agnostic LLM configuration, observability
//! helpers, and the shared error type used throughout the Reprise workspace.
//! It stays dependency-light so that every crate can depend on it.
//!
//! # Overview
//!
//! - [`LlmConfig`]: Provider-agnostic LLM configuration
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`RepriseError`] and [`Result`]: Shared error handling
//!
//! # Examples
//!
//! ```rust
//! use reprise_common::RepriseError;
//!
//! let err = RepriseError::NoCandidates("Click on \"USDC\"".to_string());
//! assert!(err.to_string().contains("USDC"));
//! ```
use serde::{Deserialize, Serialize};

pub mod observability;

/// Configuration for the LLM provider that backs element resolution.
///
/// Feature flags control which variants are compiled in.
/// See the `reprise-llm` crate for concrete client implementations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum LlmConfig {
    #[cfg(feature = "ollama")]
    Ollama {
        #[serde(default = "default_ollama_base_url")]
        base_url: String,
        model: String,
    },
    #[cfg(feature = "openai")]
    OpenAi {
        api_key: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
    None,
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        // Default to a local Ollama server if the feature is enabled
        #[cfg(feature = "ollama")]
        {
            Self::Ollama {
                base_url: default_ollama_base_url(),
                model: "llama3.2:3b".to_string(),
            }
        }
        #[cfg(not(feature = "ollama"))]
        {
            Self::None
        }
    }
}

/// Error types used across the Reprise system.
#[derive(thiserror::Error, Debug)]
pub enum RepriseError {
    /// The resolver could not locate or execute the requested action.
    #[error("Resolve error: {0}")]
    Resolve(String),

    /// Observation returned no candidate for the instruction.
    #[error("No candidate element for instruction: {0}")]
    NoCandidates(String),

    /// A driver (browser, network, etc.) reported an error.
    #[error("Driver error: {0}")]
    Driver(#[from] anyhow::Error),

    /// An LLM provider failed or returned an unusable response.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation exceeded its time bound.
    #[error("Timeout occurred")]
    Timeout,
}

/// Convenient alias for results that use [`RepriseError`].
pub type Result<T> = std::result::Result<T, RepriseError>;
