//! Rule-based processor: no adapter, no network, fully deterministic.
//!
//! Three summarisation methods, three fact-extraction methods, and an
//! additive importance rule set. The `keybert`/`ner` methods have no
//! pure-Rust equivalent backend in this crate, so they always downgrade at
//! construction -- see the module doc on [`HeuristicProcessor::new`].

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;

use crate::adapter::{AdapterMessage, ExtractedFact};
use crate::config::{FactExtractionMethod, HeuristicConfig, SummaryMethod};

use super::{MetricKind, Processor, ProcessingMetrics, clamp_importance};

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "her", "was", "one", "our",
    "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old", "see", "two",
    "way", "who", "boy", "did", "its", "let", "put", "say", "she", "too", "use", "that", "this",
    "with", "have", "from", "they", "will", "would", "there", "their", "what", "about", "which",
    "when", "make", "like", "time", "just", "into", "than", "then", "some", "could", "also",
];

/// Downgraded method a `HeuristicProcessor` actually runs for a given
/// configured method -- fixed for the processor's lifetime at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EffectiveSummaryMethod {
    Sample,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EffectiveFactMethod {
    Keywords,
    Patterns,
}

#[derive(Debug)]
pub struct HeuristicProcessor {
    config: HeuristicConfig,
    summary_method: EffectiveSummaryMethod,
    fact_method: EffectiveFactMethod,
    patterns: Vec<(String, Regex)>,
    metrics: RwLock<ProcessingMetrics>,
}

impl HeuristicProcessor {
    /// Construct from configuration. `keybert` always downgrades to
    /// `sample` and `ner` always downgrades to `keywords` -- this crate
    /// ships no keyphrase-extraction or NER backend, so these are the
    /// permanent "optional dependency unavailable" downgrade the reference
    /// processor takes when its optional imports fail, logged once here at
    /// construction exactly as it is there.
    pub fn new(config: HeuristicConfig) -> Self {
        let summary_method = match config.summary_method {
            SummaryMethod::Keybert => {
                tracing::warn!("keybert summarization unavailable, downgrading to sample");
                EffectiveSummaryMethod::Sample
            }
            SummaryMethod::Sample => EffectiveSummaryMethod::Sample,
            SummaryMethod::Concat => EffectiveSummaryMethod::Concat,
        };

        let fact_method = match config.fact_extraction_method {
            FactExtractionMethod::Ner => {
                tracing::warn!("NER fact extraction unavailable, downgrading to keywords");
                EffectiveFactMethod::Keywords
            }
            FactExtractionMethod::Keywords => EffectiveFactMethod::Keywords,
            FactExtractionMethod::Patterns => EffectiveFactMethod::Patterns,
        };

        let patterns = if config.custom_patterns.is_empty() {
            default_patterns()
        } else {
            config
                .custom_patterns
                .iter()
                .filter_map(|p| Regex::new(p).ok().map(|re| ("custom".to_string(), re)))
                .collect()
        };

        Self {
            config,
            summary_method,
            fact_method,
            patterns,
            metrics: RwLock::new(ProcessingMetrics::default()),
        }
    }

    fn truncate(&self, text: String) -> String {
        let max = self.config.summary_max_length;
        if text.chars().count() <= max {
            text
        } else {
            let mut truncated: String = text.chars().take(max.saturating_sub(1)).collect();
            truncated.push('…');
            truncated
        }
    }

    fn summarize_sample(&self, messages: &[AdapterMessage]) -> Option<String> {
        let non_empty: Vec<&AdapterMessage> =
            messages.iter().filter(|m| !m.content.trim().is_empty()).collect();
        if non_empty.is_empty() {
            return None;
        }

        let first = non_empty.first().unwrap();
        let last = non_empty.last().unwrap();
        let longest = non_empty
            .iter()
            .max_by_key(|m| m.content.len())
            .unwrap();

        let mut parts = vec![format!("[{}]: {}", first.role, first.content)];
        if !std::ptr::eq(*longest, *first) && !std::ptr::eq(*longest, *last) {
            parts.push(format!("[{}]: {}", longest.role, longest.content));
        }
        if !std::ptr::eq(*last, *first) {
            parts.push(format!("[{}]: {}", last.role, last.content));
        }

        Some(self.truncate(parts.join(" | ")))
    }

    fn summarize_concat(&self, messages: &[AdapterMessage]) -> Option<String> {
        let joined = messages
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| format!("[{}]: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join(" ");

        if joined.is_empty() { None } else { Some(self.truncate(joined)) }
    }

    fn extract_keywords(&self, messages: &[AdapterMessage]) -> Vec<ExtractedFact> {
        let mut frequency: HashMap<String, u64> = HashMap::new();
        for message in messages {
            for token in message.content.split(|c: char| !c.is_alphabetic()) {
                let lower = token.to_lowercase();
                if lower.len() >= self.config.min_keyword_length && !STOPWORDS.contains(&lower.as_str()) {
                    *frequency.entry(lower).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(String, u64)> = frequency.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.config.top_keywords);

        ranked
            .into_iter()
            .map(|(text, frequency)| {
                let mut fact = ExtractedFact::new();
                fact.insert("type".to_string(), serde_json::json!("keyword"));
                fact.insert("text".to_string(), serde_json::json!(text));
                fact.insert("frequency".to_string(), serde_json::json!(frequency));
                fact
            })
            .collect()
    }

    fn extract_patterns(&self, messages: &[AdapterMessage]) -> Vec<ExtractedFact> {
        let mut facts = Vec::new();
        for message in messages {
            for (pattern_type, regex) in &self.patterns {
                for m in regex.find_iter(&message.content) {
                    let mut fact = ExtractedFact::new();
                    fact.insert("type".to_string(), serde_json::json!("pattern_match"));
                    fact.insert("pattern_type".to_string(), serde_json::json!(pattern_type));
                    fact.insert("text".to_string(), serde_json::json!(m.as_str()));
                    fact.insert(
                        "context".to_string(),
                        serde_json::json!(context_window(&message.content, m.start(), m.end(), 50)),
                    );
                    facts.push(fact);
                }
            }
        }
        facts
    }
}

/// Context window around a `[match_start, match_end)` byte range, extended by
/// up to `radius` bytes on each side and snapped inward to the nearest char
/// boundary so a multi-byte character straddling the window edge is never
/// sliced in half.
fn context_window(text: &str, match_start: usize, match_end: usize, radius: usize) -> &str {
    let mut start = match_start.saturating_sub(radius);
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }

    let mut end = (match_end + radius).min(text.len());
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }

    &text[start..end]
}

fn default_patterns() -> Vec<(String, Regex)> {
    static PATTERNS: OnceLock<Vec<(String, Regex)>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            vec![
                ("email", r"[\w.+-]+@[\w-]+\.[\w.-]+"),
                ("url", r"https?://[^\s]+"),
                ("date", r"\d{4}-\d{2}-\d{2}"),
                ("time", r"\b\d{1,2}:\d{2}(:\d{2})?\b"),
                ("currency", r"[$€£]\s?\d+(\.\d{2})?"),
                ("phone", r"\+?\d[\d\-\s]{7,}\d"),
            ]
            .into_iter()
            .map(|(name, pattern)| (name.to_string(), Regex::new(pattern).expect("valid built-in pattern")))
            .collect()
        })
        .clone()
}

#[async_trait]
impl Processor for HeuristicProcessor {
    async fn summarize(&self, messages: &[AdapterMessage]) -> Option<String> {
        self.metrics.write().increment(MetricKind::HeuristicCalls, "summarize");
        match self.summary_method {
            EffectiveSummaryMethod::Sample => self.summarize_sample(messages),
            EffectiveSummaryMethod::Concat => self.summarize_concat(messages),
        }
    }

    async fn extract_facts(&self, messages: &[AdapterMessage]) -> Vec<ExtractedFact> {
        self.metrics.write().increment(MetricKind::HeuristicCalls, "extract_facts");
        match self.fact_method {
            EffectiveFactMethod::Keywords => self.extract_keywords(messages),
            EffectiveFactMethod::Patterns => self.extract_patterns(messages),
        }
    }

    async fn score_importance(&self, text: &str) -> i32 {
        self.metrics.write().increment(MetricKind::HeuristicCalls, "score_importance");
        let rules = &self.config.importance_rules;
        let mut score = rules.base_score;

        if text.len() > rules.length_bonus.threshold {
            score += rules.length_bonus.bonus;
        }
        let lower = text.to_lowercase();
        if rules.keyword_bonus.keywords.iter().any(|kw| lower.contains(&kw.to_lowercase())) {
            score += rules.keyword_bonus.bonus;
        }
        if text.contains('?') {
            score += rules.question_bonus;
        }
        if ["```", "def ", "function ", "class "].iter().any(|marker| text.contains(marker)) {
            score += rules.code_bonus;
        }
        if text.contains("http://") || text.contains("https://") {
            score += rules.url_bonus;
        }

        clamp_importance(score as i64)
    }

    fn get_metrics(&self) -> serde_json::Value {
        serde_json::to_value(&*self.metrics.read()).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str) -> AdapterMessage {
        AdapterMessage { role: role.to_string(), content: content.to_string() }
    }

    #[tokio::test]
    async fn keybert_downgrades_to_sample() {
        let config = HeuristicConfig { summary_method: SummaryMethod::Keybert, ..Default::default() };
        let processor = HeuristicProcessor::new(config);
        assert_eq!(processor.summary_method, EffectiveSummaryMethod::Sample);
    }

    #[tokio::test]
    async fn ner_downgrades_to_keywords() {
        let config = HeuristicConfig { fact_extraction_method: FactExtractionMethod::Ner, ..Default::default() };
        let processor = HeuristicProcessor::new(config);
        assert_eq!(processor.fact_method, EffectiveFactMethod::Keywords);
    }

    #[tokio::test]
    async fn empty_messages_summarize_to_none() {
        let processor = HeuristicProcessor::new(HeuristicConfig::default());
        assert!(processor.summarize(&[]).await.is_none());
        assert!(processor.summarize(&[msg("user", "   ")]).await.is_none());
    }

    #[tokio::test]
    async fn sample_summary_includes_first_longest_last() {
        let processor = HeuristicProcessor::new(HeuristicConfig {
            summary_method: SummaryMethod::Sample,
            ..Default::default()
        });
        let messages = vec![
            msg("user", "hi"),
            msg("assistant", "this is a much longer message than the others by far"),
            msg("user", "bye"),
        ];
        let summary = processor.summarize(&messages).await.unwrap();
        assert!(summary.contains("hi"));
        assert!(summary.contains("much longer"));
        assert!(summary.contains("bye"));
    }

    #[tokio::test]
    async fn concat_summary_skips_empty_messages() {
        let processor = HeuristicProcessor::new(HeuristicConfig {
            summary_method: SummaryMethod::Concat,
            ..Default::default()
        });
        let messages = vec![msg("user", "hello there"), msg("assistant", "")];
        let summary = processor.summarize(&messages).await.unwrap();
        assert!(summary.contains("hello there"));
    }

    #[tokio::test]
    async fn long_summary_is_truncated_with_ellipsis() {
        let processor = HeuristicProcessor::new(HeuristicConfig {
            summary_method: SummaryMethod::Concat,
            summary_max_length: 10,
            ..Default::default()
        });
        let summary = processor.summarize(&[msg("user", "a very long message that exceeds the cap")]).await.unwrap();
        assert_eq!(summary.chars().count(), 10);
        assert!(summary.ends_with('…'));
    }

    #[tokio::test]
    async fn keyword_extraction_counts_frequency_and_skips_stopwords() {
        let processor = HeuristicProcessor::new(HeuristicConfig::default());
        let facts = processor
            .extract_facts(&[msg("user", "rust rust rust is great, the language is fast")])
            .await;
        let rust_fact = facts.iter().find(|f| f.get("text").unwrap() == "rust").unwrap();
        assert_eq!(rust_fact.get("frequency").unwrap(), 3);
        assert!(facts.iter().all(|f| f.get("text").unwrap() != "the"));
    }

    #[tokio::test]
    async fn pattern_extraction_finds_emails() {
        let processor = HeuristicProcessor::new(HeuristicConfig {
            fact_extraction_method: FactExtractionMethod::Patterns,
            ..Default::default()
        });
        let facts = processor
            .extract_facts(&[msg("user", "reach me at person@example.com anytime")])
            .await;
        assert!(facts.iter().any(|f| f.get("pattern_type").unwrap() == "email"));
    }

    #[tokio::test]
    async fn pattern_extraction_near_multibyte_chars_does_not_panic() {
        let processor = HeuristicProcessor::new(HeuristicConfig {
            fact_extraction_method: FactExtractionMethod::Patterns,
            ..Default::default()
        });
        let padding: String = std::iter::repeat('✨').take(40).collect();
        let content = format!("{padding} contact person@example.com {padding}");
        let facts = processor.extract_facts(&[msg("user", &content)]).await;
        assert!(facts.iter().any(|f| f.get("pattern_type").unwrap() == "email"));
    }

    #[tokio::test]
    async fn importance_score_clamps_and_applies_bonuses_once() {
        let processor = HeuristicProcessor::new(HeuristicConfig::default());
        let score = processor
            .score_importance("important important important? def foo(): http://example.com")
            .await;
        assert!((1..=10).contains(&score));
    }

    #[tokio::test]
    async fn metrics_record_heuristic_calls() {
        let processor = HeuristicProcessor::new(HeuristicConfig::default());
        processor.score_importance("hello").await;
        let metrics: ProcessingMetrics = serde_json::from_value(processor.get_metrics()).unwrap();
        assert_eq!(metrics.heuristic_calls.get("score_importance"), Some(&1));
    }
}
