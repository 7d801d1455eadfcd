//! Resolved element references and their cached shapes.
use serde::{Deserialize, Serialize};

/// A resolved element reference, replayable without new inference.
///
/// Optional fields are omitted when empty so a bare `{"selector": "#id"}`
/// document reads and writes back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub selector: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Interaction to perform (`click`, `fill`, `type`, `press`). `None` means click.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
}

impl ActionRecord {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            description: String::new(),
            method: None,
            arguments: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>, arguments: Vec<String>) -> Self {
        self.method = Some(method.into());
        self.arguments = arguments;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Value stored under a cache key: one record from `act`, many from `observe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheEntry {
    Many(Vec<ActionRecord>),
    Single(ActionRecord),
}

impl CacheEntry {
    /// The record the act path should replay, if any.
    pub fn into_first(self) -> Option<ActionRecord> {
        match self {
            Self::Single(record) => Some(record),
            Self::Many(records) => select_candidate(records),
        }
    }
}

/// What the resolver should act on.
#[derive(Debug, Clone, Copy)]
pub enum ActRequest<'a> {
    /// Replay a previously resolved element; no inference.
    Record(&'a ActionRecord),
    /// Resolve the instruction afresh, then act.
    Instruction(&'a str),
}

/// Pick the action to use from resolver output.
///
/// Resolvers return candidates ranked best-first; the head of the list wins
/// and ties are broken by that order. An empty list yields nothing.
pub fn select_candidate(candidates: Vec<ActionRecord>) -> Option<ActionRecord> {
    candidates.into_iter().next()
}
