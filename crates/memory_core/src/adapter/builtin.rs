//! Compile-time table of built-in adapters.
//!
//! Each built-in is gated behind the `embed-cloud` feature; the table itself
//! (which names exist, which constructor backs them) is static, so
//! `AdapterRegistry::list` never has to probe anything at runtime. Four
//! names are built in -- `openai`/`anthropic`/`ollama`/`huggingface` -- all
//! routed through the same `genai::Client` rather than four bespoke HTTP
//! clients, since genai already speaks all of these providers' chat APIs.

use std::sync::Arc;

use async_trait::async_trait;
use genai::chat::{ChatMessage, ChatRequest, ContentPart, MessageContent};

use super::{Adapter, AdapterMessage, AdapterResult, ExtractedFact};
use crate::error::AdapterError;

#[cfg(feature = "embed-cloud")]
pub fn names() -> &'static [&'static str] {
    &["openai", "anthropic", "ollama", "huggingface"]
}

#[cfg(not(feature = "embed-cloud"))]
pub fn names() -> &'static [&'static str] {
    &[]
}

pub fn construct(
    name: &str,
    config: serde_json::Map<String, serde_json::Value>,
) -> Option<Result<Arc<dyn Adapter>, AdapterError>> {
    match name {
        #[cfg(feature = "embed-cloud")]
        "openai" => Some(build(name, "gpt-4o-mini", config)),
        #[cfg(feature = "embed-cloud")]
        "anthropic" => Some(build(name, "claude-3-5-haiku-latest", config)),
        #[cfg(feature = "embed-cloud")]
        "ollama" => Some(build(name, "llama3.1", config)),
        #[cfg(feature = "embed-cloud")]
        "huggingface" => Some(build(name, "meta-llama/Llama-3.1-8B-Instruct", config)),
        _ => None,
    }
}

#[cfg(feature = "embed-cloud")]
fn build(
    name: &str,
    default_model: &str,
    config: serde_json::Map<String, serde_json::Value>,
) -> Result<Arc<dyn Adapter>, AdapterError> {
    GenAiAdapter::from_config(name, default_model, config).map(|a| Arc::new(a) as Arc<dyn Adapter>)
}

/// Adapter backed by [`genai::Client`], shared across every provider
/// genai supports; only the model id differs per built-in name.
#[cfg(feature = "embed-cloud")]
#[derive(Debug)]
pub struct GenAiAdapter {
    name: String,
    model: String,
    client: genai::Client,
}

#[cfg(feature = "embed-cloud")]
impl GenAiAdapter {
    fn from_config(
        name: &str,
        default_model: &str,
        config: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, AdapterError> {
        let model = config
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or(default_model)
            .to_string();

        Ok(Self {
            name: name.to_string(),
            model,
            client: genai::Client::default(),
        })
    }

    async fn chat(&self, system: &str, user: &str) -> AdapterResult<String> {
        let request = ChatRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)]);
        let response = self
            .client
            .exec_chat(&self.model, request, None)
            .await
            .map_err(|err| AdapterError::Transient(err.to_string()))?;

        response
            .content
            .iter()
            .find_map(Self::text_of)
            .ok_or_else(|| AdapterError::Transient("empty completion".to_string()))
    }

    fn text_of(content: &MessageContent) -> Option<String> {
        match content {
            MessageContent::Text(text) => Some(text.clone()),
            MessageContent::Parts(parts) => parts.iter().find_map(|part| match part {
                ContentPart::Text(text) => Some(text.clone()),
                _ => None,
            }),
            _ => None,
        }
    }
}

#[cfg(feature = "embed-cloud")]
#[async_trait]
impl Adapter for GenAiAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn summarize_conversation(&self, messages: &[AdapterMessage]) -> AdapterResult<Option<String>> {
        if messages.is_empty() {
            return Ok(None);
        }
        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let summary = self
            .chat(
                "Summarize the following conversation in one or two sentences.",
                &transcript,
            )
            .await?;
        Ok(Some(summary))
    }

    async fn extract_facts(&self, messages: &[AdapterMessage]) -> AdapterResult<Vec<ExtractedFact>> {
        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let text = self
            .chat(
                "List standalone facts worth remembering from this conversation, one per line.",
                &transcript,
            )
            .await?;

        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let mut fact = ExtractedFact::new();
                fact.insert(
                    "text".to_string(),
                    serde_json::json!(line.trim_start_matches(['-', '*']).trim()),
                );
                fact
            })
            .collect())
    }

    async fn score_importance(&self, text: &str) -> AdapterResult<i32> {
        let response = self
            .chat(
                "Rate the importance of the following message on a scale of 0 to 10. \
                 Respond with only the integer.",
                text,
            )
            .await?;

        response
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse::<i32>()
            .map(|score| score.clamp(0, 10))
            .map_err(|_| AdapterError::Transient(format!("non-numeric importance response: {response}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_name_is_not_constructed() {
        assert!(construct("nonexistent", Default::default()).is_none());
    }
}
