//! Adapter interface for AI-backed summarization, fact extraction, and
//! importance scoring, plus the registry that resolves adapter names to
//! live instances.
//!
//! A simple name-keyed map behind a lock, with `register`/`get`/`list`.

pub mod builtin;
pub mod registry;

pub use registry::AdapterRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entry::MemoryEntry;
use crate::error::AdapterError;

/// A single conversational turn, projected for adapter consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterMessage {
    pub role: String,
    pub content: String,
}

impl From<&MemoryEntry> for AdapterMessage {
    fn from(entry: &MemoryEntry) -> Self {
        Self {
            role: entry.role.as_str().to_string(),
            content: entry.content.clone().unwrap_or_default(),
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// A fact extracted from a conversation. Kept as a free-form JSON object
/// (rather than a fixed struct) since adapters are free to attach whatever
/// fields their backend produces.
pub type ExtractedFact = serde_json::Map<String, serde_json::Value>;

/// An AI-backed (or AI-shaped) backend for the three operations the
/// processors need. Implementations may call out to an LLM, a local
/// model, or anything else; the registry only cares that they conform
/// to this interface.
#[async_trait]
pub trait Adapter: Send + Sync + std::fmt::Debug {
    /// Name this adapter was registered/constructed under.
    fn name(&self) -> &str;

    /// Produce a natural-language summary of `messages`, or `None` if the
    /// adapter declines to summarize (e.g. nothing worth summarizing).
    async fn summarize_conversation(&self, messages: &[AdapterMessage]) -> AdapterResult<Option<String>>;

    /// Extract standalone facts worth remembering from `messages`.
    async fn extract_facts(&self, messages: &[AdapterMessage]) -> AdapterResult<Vec<ExtractedFact>>;

    /// Score the importance of a single piece of text, 0-10.
    async fn score_importance(&self, text: &str) -> AdapterResult<i32>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Adapter stub that always fails, for exercising fallback paths.
    #[derive(Debug, Default)]
    pub struct AlwaysFailingAdapter {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl Adapter for AlwaysFailingAdapter {
        fn name(&self) -> &str {
            "always-failing"
        }

        async fn summarize_conversation(
            &self,
            _messages: &[AdapterMessage],
        ) -> AdapterResult<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AdapterError::Transient("simulated failure".to_string()))
        }

        async fn extract_facts(&self, _messages: &[AdapterMessage]) -> AdapterResult<Vec<ExtractedFact>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AdapterError::Transient("simulated failure".to_string()))
        }

        async fn score_importance(&self, _text: &str) -> AdapterResult<i32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AdapterError::Transient("simulated failure".to_string()))
        }
    }

    /// Adapter stub that always succeeds with fixed output.
    #[derive(Debug)]
    pub struct StaticAdapter;

    #[async_trait]
    impl Adapter for StaticAdapter {
        fn name(&self) -> &str {
            "static"
        }

        async fn summarize_conversation(
            &self,
            _messages: &[AdapterMessage],
        ) -> AdapterResult<Option<String>> {
            Ok(Some("a static summary".to_string()))
        }

        async fn extract_facts(&self, _messages: &[AdapterMessage]) -> AdapterResult<Vec<ExtractedFact>> {
            let mut fact = ExtractedFact::new();
            fact.insert("text".to_string(), serde_json::json!("a static fact"));
            Ok(vec![fact])
        }

        async fn score_importance(&self, _text: &str) -> AdapterResult<i32> {
            Ok(5)
        }
    }
}
