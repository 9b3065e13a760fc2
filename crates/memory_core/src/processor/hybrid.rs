//! Routes each call between [`HeuristicProcessor`] and [`AIProcessor`]
//! based on a cheap heuristic importance estimate, with fallback to the
//! heuristic result on AI failure.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::adapter::{AdapterMessage, ExtractedFact};
use crate::config::HybridConfig;

use super::{AIProcessor, HeuristicProcessor, MetricKind, Processor, ProcessingMetrics};

#[derive(Debug)]
pub struct HybridProcessor {
    heuristic: HeuristicProcessor,
    ai: AIProcessor,
    config: HybridConfig,
    metrics: RwLock<ProcessingMetrics>,
}

impl HybridProcessor {
    pub fn new(heuristic: HeuristicProcessor, ai: AIProcessor, config: HybridConfig) -> Self {
        Self {
            heuristic,
            ai,
            config,
            metrics: RwLock::new(ProcessingMetrics::default()),
        }
    }

    /// A call routes to AI when the heuristic estimate already clears the
    /// configured importance threshold, or (independently) on a random
    /// draw against `ai_probability` -- so even routine traffic
    /// occasionally samples the AI path.
    fn should_use_ai(&self, heuristic_importance: i32) -> bool {
        heuristic_importance >= self.config.ai_threshold_importance
            || rand::random::<f64>() < self.config.ai_probability
    }

    fn concat_content(messages: &[AdapterMessage]) -> String {
        messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join(" ")
    }
}

#[async_trait]
impl Processor for HybridProcessor {
    async fn summarize(&self, messages: &[AdapterMessage]) -> Option<String> {
        let content = Self::concat_content(messages);
        let estimate = self.heuristic.score_importance(&content).await;

        if self.should_use_ai(estimate) {
            match self.ai.try_summarize(messages).await {
                Ok(summary) => {
                    self.metrics.write().increment(MetricKind::HybridAiUsed, "summarize");
                    return summary;
                }
                Err(err) => {
                    self.metrics.write().increment(MetricKind::HybridFallback, "summarize");
                    tracing::warn!("AI summarize failed, falling back to heuristic: {err}");
                    if !self.config.fallback_to_heuristic {
                        return None;
                    }
                }
            }
        }

        self.metrics.write().increment(MetricKind::HybridHeuristicUsed, "summarize");
        self.heuristic.summarize(messages).await
    }

    async fn extract_facts(&self, messages: &[AdapterMessage]) -> Vec<ExtractedFact> {
        let content = Self::concat_content(messages);
        let estimate = self.heuristic.score_importance(&content).await;

        if self.should_use_ai(estimate) {
            match self.ai.try_extract_facts(messages).await {
                Ok(facts) => {
                    self.metrics.write().increment(MetricKind::HybridAiUsed, "extract_facts");
                    return facts;
                }
                Err(err) => {
                    self.metrics.write().increment(MetricKind::HybridFallback, "extract_facts");
                    tracing::warn!("AI extract_facts failed, falling back to heuristic: {err}");
                    if !self.config.fallback_to_heuristic {
                        return Vec::new();
                    }
                }
            }
        }

        self.metrics.write().increment(MetricKind::HybridHeuristicUsed, "extract_facts");
        self.heuristic.extract_facts(messages).await
    }

    async fn score_importance(&self, text: &str) -> i32 {
        let estimate = self.heuristic.score_importance(text).await;

        if self.should_use_ai(estimate) {
            match self.ai.try_score_importance(text).await {
                Ok(score) => {
                    self.metrics.write().increment(MetricKind::HybridAiUsed, "score_importance");
                    return score;
                }
                Err(err) => {
                    self.metrics.write().increment(MetricKind::HybridFallback, "score_importance");
                    tracing::warn!("AI score_importance failed, falling back to heuristic: {err}");
                }
            }
        }

        self.metrics.write().increment(MetricKind::HybridHeuristicUsed, "score_importance");
        estimate
    }

    /// Combines this processor's own routing counters with the nested
    /// heuristic and AI processors' counters into one [`ProcessingMetrics`]
    /// snapshot, so `ai_usage_rate`/`fallback_rate` reflect the whole
    /// pipeline rather than just the top-level routing decision.
    fn get_metrics(&self) -> serde_json::Value {
        let mut merged = self.metrics.read().clone();

        if let Ok(ai_metrics) = serde_json::from_value::<ProcessingMetrics>(self.ai.get_metrics()) {
            merge_counts(&mut merged.ai_calls, &ai_metrics.ai_calls);
            merge_counts(&mut merged.ai_success, &ai_metrics.ai_success);
            merge_counts(&mut merged.ai_errors, &ai_metrics.ai_errors);
            merge_times(&mut merged.processing_time, &ai_metrics.processing_time);
        }

        if let Ok(heuristic_metrics) = serde_json::from_value::<ProcessingMetrics>(self.heuristic.get_metrics()) {
            merge_counts(&mut merged.heuristic_calls, &heuristic_metrics.heuristic_calls);
        }

        serde_json::to_value(merged).unwrap_or(serde_json::Value::Null)
    }
}

fn merge_counts(into: &mut HashMap<String, u64>, from: &HashMap<String, u64>) {
    for (key, value) in from {
        *into.entry(key.clone()).or_insert(0) += value;
    }
}

fn merge_times(into: &mut HashMap<String, f64>, from: &HashMap<String, f64>) {
    for (key, value) in from {
        *into.entry(key.clone()).or_insert(0.0) += value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::test_support::{AlwaysFailingAdapter, StaticAdapter};
    use crate::config::HeuristicConfig;
    use std::sync::Arc;

    fn msg(role: &str, content: &str) -> AdapterMessage {
        AdapterMessage { role: role.to_string(), content: content.to_string() }
    }

    fn hybrid_with(ai: AIProcessor, config: HybridConfig) -> HybridProcessor {
        HybridProcessor::new(HeuristicProcessor::new(HeuristicConfig::default()), ai, config)
    }

    #[tokio::test]
    async fn high_importance_routes_to_ai() {
        let config = HybridConfig { ai_threshold_importance: 1, ai_probability: 0.0, ..Default::default() };
        let processor = hybrid_with(AIProcessor::new(Arc::new(StaticAdapter), false, None, false), config);
        let summary = processor.summarize(&[msg("user", "important! remember this critical fact")]).await;
        assert_eq!(summary.as_deref(), Some("a static summary"));

        let metrics: ProcessingMetrics = serde_json::from_value(processor.get_metrics()).unwrap();
        assert_eq!(metrics.hybrid_ai_used.get("summarize"), Some(&1));
    }

    #[tokio::test]
    async fn ai_failure_falls_back_to_heuristic_result() {
        let config = HybridConfig {
            ai_threshold_importance: 1,
            ai_probability: 0.0,
            fallback_to_heuristic: true,
            ..Default::default()
        };
        let processor = hybrid_with(AIProcessor::new(Arc::new(AlwaysFailingAdapter::default()), false, None, false), config);
        let score = processor.score_importance("important critical remember").await;
        assert!((1..=10).contains(&score));

        let metrics: ProcessingMetrics = serde_json::from_value(processor.get_metrics()).unwrap();
        assert_eq!(metrics.hybrid_fallback.get("score_importance"), Some(&1));
        assert_eq!(metrics.hybrid_heuristic_used.get("score_importance"), Some(&1));
    }

    #[tokio::test]
    async fn low_importance_with_zero_probability_stays_on_heuristic() {
        let config = HybridConfig { ai_threshold_importance: 10, ai_probability: 0.0, ..Default::default() };
        let processor = hybrid_with(AIProcessor::new(Arc::new(StaticAdapter), false, None, false), config);
        processor.summarize(&[msg("user", "hi")]).await;

        let metrics: ProcessingMetrics = serde_json::from_value(processor.get_metrics()).unwrap();
        assert_eq!(metrics.hybrid_heuristic_used.get("summarize"), Some(&1));
        assert!(metrics.hybrid_ai_used.get("summarize").is_none());
    }
}
