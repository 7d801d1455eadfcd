//! Seams to the live automation layer.
use std::time::Duration;

use async_trait::async_trait;
use reprise_common::Result;

use crate::record::{ActRequest, ActionRecord};

/// Turns natural-language instructions into element references and actions.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Candidate elements for `instruction`, ranked best-first. May invoke an LLM.
    async fn observe(&self, instruction: &str) -> Result<Vec<ActionRecord>>;

    /// Perform an interaction. `ActRequest::Record` replays without inference;
    /// `ActRequest::Instruction` forces a fresh resolution.
    async fn act(&self, request: ActRequest<'_>) -> Result<()>;
}

/// Read access to the page the resolver is driving.
#[async_trait]
pub trait PageContext: Send + Sync {
    async fn url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// Rendered text of the document body.
    async fn visible_text(&self) -> Result<String>;

    /// Succeeds once `selector` matches a visible element, fails after `timeout`.
    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<()>;
}
