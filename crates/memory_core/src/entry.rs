//! Memory entries — the unit of short-term memory.
//!
//! Mirrors `MemoryEntry` from the conversational memory engine this crate
//! re-expresses: a role, optional content, optional tool-call fields, and
//! free-form metadata. Two projections are exposed: [`MemoryEntry::to_persisted`]
//! (everything non-empty, used for the on-disk STM document) and
//! [`MemoryEntry::to_llm`] (role/content/tool_calls/name/tool_call_id,
//! metadata omitted, used when assembling prompt context).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The role a message entry was authored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// One short-term-memory entry.
///
/// Invariant: at least one of `content` or `tool_calls` is present; a
/// `tool`-role entry carries `tool_call_id`. This is a caller contract, not
/// enforced by the type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// The LLM-facing projection: role, content, tool_calls, name, tool_call_id.
/// Metadata is always omitted.
#[derive(Debug, Clone, Serialize)]
pub struct LlmMessage {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl MemoryEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: None,
            name: None,
            tool_call_id: None,
            metadata: HashMap::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            name: None,
            tool_call_id: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// The persistence projection: every field whose value isn't `None`.
    /// `metadata` defaults to `{}` rather than `None` so it always survives
    /// round-tripping.
    pub fn to_persisted(&self) -> Value {
        serde_json::to_value(self).expect("MemoryEntry always serializes")
    }

    /// The LLM projection: metadata stripped.
    pub fn to_llm(&self) -> LlmMessage {
        LlmMessage {
            role: self.role,
            content: self.content.clone(),
            tool_calls: self.tool_calls.clone(),
            name: self.name.clone(),
            tool_call_id: self.tool_call_id.clone(),
        }
    }

    /// `true` for user/assistant entries that carry non-empty content —
    /// the filter applied when building the message list handed to a
    /// processor for summarisation/fact-extraction.
    pub fn is_conversational(&self) -> bool {
        matches!(self.role, Role::User | Role::Assistant)
            && self.content.as_deref().is_some_and(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_projection_omits_none_fields() {
        let entry = MemoryEntry::user("hello");
        let value = entry.to_persisted();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("tool_calls"));
        assert!(!obj.contains_key("name"));
        assert_eq!(obj["content"], "hello");
    }

    #[test]
    fn persisted_projection_always_includes_metadata() {
        let entry = MemoryEntry::user("hi");
        let value = entry.to_persisted();
        assert!(value.as_object().unwrap().contains_key("metadata"));
    }

    #[test]
    fn llm_projection_omits_metadata() {
        let mut metadata = HashMap::new();
        metadata.insert("author_id".to_string(), Value::String("u1".to_string()));
        let entry = MemoryEntry::user("hi").with_metadata(metadata);
        let llm = entry.to_llm();
        let value = serde_json::to_value(&llm).unwrap();
        assert!(!value.as_object().unwrap().contains_key("metadata"));
    }

    #[test]
    fn is_conversational_requires_nonempty_content() {
        let empty = MemoryEntry {
            role: Role::User,
            content: Some(String::new()),
            tool_calls: None,
            name: None,
            tool_call_id: None,
            metadata: HashMap::new(),
        };
        assert!(!empty.is_conversational());

        let system = MemoryEntry {
            role: Role::System,
            content: Some("note".to_string()),
            tool_calls: None,
            name: None,
            tool_call_id: None,
            metadata: HashMap::new(),
        };
        assert!(!system.is_conversational());

        assert!(MemoryEntry::assistant("hi there").is_conversational());
    }
}
