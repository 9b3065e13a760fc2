//! The processor hierarchy: turns an STM snapshot into LTM writes.
//!
//! All four processors (heuristic, AI, hybrid, disabled) implement the same
//! infallible public [`Processor`] trait so the memory manager never has to
//! branch on which one it's holding.

pub mod ai;
pub mod disabled;
pub mod heuristic;
pub mod hybrid;

pub use ai::AIProcessor;
pub use disabled::DisabledProcessor;
pub use heuristic::HeuristicProcessor;
pub use hybrid::HybridProcessor;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::adapter::{AdapterMessage, ExtractedFact};

/// Per-operation counters and cumulative timing for a processor instance.
/// All counters are monotonic for the lifetime of the processor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    pub ai_calls: HashMap<String, u64>,
    pub ai_success: HashMap<String, u64>,
    pub ai_errors: HashMap<String, u64>,
    pub heuristic_calls: HashMap<String, u64>,
    pub hybrid_ai_used: HashMap<String, u64>,
    pub hybrid_heuristic_used: HashMap<String, u64>,
    pub hybrid_fallback: HashMap<String, u64>,
    pub processing_time: HashMap<String, f64>,
}

/// Which counter an `increment` call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    AiCalls,
    AiSuccess,
    AiErrors,
    HeuristicCalls,
    HybridAiUsed,
    HybridHeuristicUsed,
    HybridFallback,
}

impl ProcessingMetrics {
    fn counter_mut(&mut self, metric: MetricKind) -> &mut HashMap<String, u64> {
        match metric {
            MetricKind::AiCalls => &mut self.ai_calls,
            MetricKind::AiSuccess => &mut self.ai_success,
            MetricKind::AiErrors => &mut self.ai_errors,
            MetricKind::HeuristicCalls => &mut self.heuristic_calls,
            MetricKind::HybridAiUsed => &mut self.hybrid_ai_used,
            MetricKind::HybridHeuristicUsed => &mut self.hybrid_heuristic_used,
            MetricKind::HybridFallback => &mut self.hybrid_fallback,
        }
    }

    /// Bump the named counter for `operation` by one.
    pub fn increment(&mut self, metric: MetricKind, operation: &str) {
        *self.counter_mut(metric).entry(operation.to_string()).or_insert(0) += 1;
    }

    /// Add elapsed wall-clock time to `operation`'s running total.
    pub fn add_time(&mut self, operation: &str, duration: Duration) {
        *self.processing_time.entry(operation.to_string()).or_insert(0.0) += duration.as_secs_f64();
    }

    fn sum(map: &HashMap<String, u64>) -> u64 {
        map.values().sum()
    }

    /// `hybrid_ai_used / (hybrid_ai_used + hybrid_heuristic_used)`, summed
    /// across every operation; `0.0` when no hybrid routing has happened.
    pub fn ai_usage_rate(&self) -> f64 {
        let ai_used = Self::sum(&self.hybrid_ai_used) as f64;
        let heuristic_used = Self::sum(&self.hybrid_heuristic_used) as f64;
        let total = ai_used + heuristic_used;
        if total == 0.0 { 0.0 } else { ai_used / total }
    }

    /// Fallback rate normalized against total AI attempts actually used by
    /// the hybrid router (`hybrid_ai_used`), not total hybrid calls.
    pub fn fallback_rate(&self) -> f64 {
        let ai_used = Self::sum(&self.hybrid_ai_used) as f64;
        if ai_used == 0.0 {
            0.0
        } else {
            Self::sum(&self.hybrid_fallback) as f64 / ai_used
        }
    }
}

/// The distillation contract every processor variant implements. Every
/// method is infallible: internal failures degrade to a neutral result and
/// are only ever observable through `get_metrics()` or logs.
#[async_trait]
pub trait Processor: Send + Sync + std::fmt::Debug {
    /// Produce a summary of `messages`, or `None` if nothing was produced.
    async fn summarize(&self, messages: &[AdapterMessage]) -> Option<String>;

    /// Extract standalone facts from `messages`.
    async fn extract_facts(&self, messages: &[AdapterMessage]) -> Vec<ExtractedFact>;

    /// Score the importance of `text`, always in `[1, 10]`.
    async fn score_importance(&self, text: &str) -> i32;

    /// Current metrics snapshot. Shape varies by processor (the disabled
    /// processor reports a distinct, non-`ProcessingMetrics` shaped value),
    /// so this returns opaque JSON rather than a fixed struct.
    fn get_metrics(&self) -> serde_json::Value;
}

/// Clamp a raw importance score into the documented `[1, 10]` range.
pub(crate) fn clamp_importance(score: i64) -> i32 {
    score.clamp(1, 10) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_usage_rate_is_zero_with_no_hybrid_calls() {
        let metrics = ProcessingMetrics::default();
        assert_eq!(metrics.ai_usage_rate(), 0.0);
        assert_eq!(metrics.fallback_rate(), 0.0);
    }

    #[test]
    fn ai_usage_rate_and_fallback_rate_compute_correctly() {
        let mut metrics = ProcessingMetrics::default();
        metrics.increment(MetricKind::HybridAiUsed, "summarize");
        metrics.increment(MetricKind::HybridAiUsed, "summarize");
        metrics.increment(MetricKind::HybridAiUsed, "summarize");
        metrics.increment(MetricKind::HybridHeuristicUsed, "summarize");
        metrics.increment(MetricKind::HybridFallback, "summarize");

        assert!((metrics.ai_usage_rate() - 0.75).abs() < 1e-9);
        assert!((metrics.fallback_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn clamp_importance_respects_bounds() {
        assert_eq!(clamp_importance(-5), 1);
        assert_eq!(clamp_importance(0), 1);
        assert_eq!(clamp_importance(15), 10);
        assert_eq!(clamp_importance(7), 7);
    }
}
