//! No-op processor for `Mode::Disabled`: LTM processing is turned off
//! entirely but the manager still needs something implementing
//! [`Processor`] to hold.

use async_trait::async_trait;

use crate::adapter::{AdapterMessage, ExtractedFact};

use super::Processor;

#[derive(Debug, Default)]
pub struct DisabledProcessor;

#[async_trait]
impl Processor for DisabledProcessor {
    async fn summarize(&self, _messages: &[AdapterMessage]) -> Option<String> {
        None
    }

    async fn extract_facts(&self, _messages: &[AdapterMessage]) -> Vec<ExtractedFact> {
        Vec::new()
    }

    async fn score_importance(&self, _text: &str) -> i32 {
        5
    }

    /// Deliberately not `ProcessingMetrics`-shaped: there is nothing to
    /// meter when processing never runs.
    fn get_metrics(&self) -> serde_json::Value {
        serde_json::json!({
            "mode": "disabled",
            "note": "LTM processing is disabled, no metrics collected",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_operation_returns_a_neutral_result() {
        let processor = DisabledProcessor;
        assert!(processor.summarize(&[]).await.is_none());
        assert!(processor.extract_facts(&[]).await.is_empty());
        assert_eq!(processor.score_importance("anything").await, 5);
    }

    #[test]
    fn metrics_report_disabled_shape() {
        let metrics = DisabledProcessor.get_metrics();
        assert_eq!(metrics["mode"], "disabled");
    }
}
