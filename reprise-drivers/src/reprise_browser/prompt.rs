//! Prompt and reply handling for LLM-backed element observation.
use reprise_cache::ActionRecord;
use reprise_common::{RepriseError, Result};
use serde::Deserialize;
use serde_json::Value;

/// Upper bound on page HTML sent to the model, in characters.
pub const MAX_HTML_CHARS: usize = 120_000;

pub const OBSERVE_SYSTEM_PROMPT: &str = r#"
You locate elements in web pages for a browser automation tool.
Analyze the provided HTML and return the elements that best satisfy the user's instruction,
most relevant first.
Your response must be a single JSON object of the form:
{"elements": [{"selector": "...", "description": "...", "method": "...", "arguments": ["..."]}]}
- "selector" is a CSS selector, or an absolute XPath prefixed with "xpath=".
- "method" is one of "click", "fill", "type", "press"; omit it for plain observation.
- "arguments" holds the text to enter or the key to press, if any.
If nothing matches, return {"elements": []}.
Do not provide any other text, explanation, or markdown.
"#;

#[derive(Debug, Deserialize)]
struct ObserveReply {
    #[serde(default)]
    elements: Vec<ActionRecord>,
}

/// User prompt for `instruction` against the page at `url`.
pub fn build_observe_prompt(instruction: &str, url: &str, html: &str) -> Result<String> {
    let html: String = html.chars().take(MAX_HTML_CHARS).collect();
    serde_json::to_string(&serde_json::json!({
        "task": "locate_elements",
        "instruction": instruction,
        "url": url,
        "html_content": html,
    }))
    .map_err(|e| RepriseError::Llm(format!("failed to encode prompt: {e}")))
}

/// Decode the model reply, dropping entries without a usable selector.
///
/// Model order is preserved; it is the ranking the executor relies on.
pub fn parse_observation(reply: Value) -> Result<Vec<ActionRecord>> {
    let parsed: ObserveReply = serde_json::from_value(reply)
        .map_err(|e| RepriseError::Llm(format!("unexpected observation shape: {e}")))?;
    Ok(parsed
        .elements
        .into_iter()
        .filter(|r| {
            let sel = r.selector.trim();
            !sel.is_empty() && sel != "xpath="
        })
        .collect())
}
