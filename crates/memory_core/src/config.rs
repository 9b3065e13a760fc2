//! Configuration for the memory engine.
//!
//! [`MemoryConfig`] is the root document; [`HeuristicConfig`] and
//! [`HybridConfig`] are its nested sub-configs. Everything is plain,
//! serializable, value-typed data — construction never fails, only
//! [`MemoryConfig::validate`] can reject a configuration, and it collects
//! every violation rather than stopping at the first.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_STM_MAX_LENGTH: usize = 150;
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
pub const ENHANCED_EMBEDDING_MODEL: &str = "BAAI/bge-m3";
pub const CODE_EMBEDDING_MODEL: &str = "jinaai/jina-embeddings-v2-base-code";
pub const DEFAULT_STORAGE_PATH: &str = "./data";
pub const DEFAULT_VECTOR_DB_PATH: &str = "./data/vector_db";
pub const LTM_IMPORTANCE_THRESHOLD: u8 = 8;
pub const LTM_SEARCH_RESULTS: usize = 3;
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// Which processor backend a [`MemoryConfig`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Ai,
    Heuristic,
    Hybrid,
    Disabled,
}

/// Summarisation method selected by [`HeuristicConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMethod {
    Sample,
    Concat,
    Keybert,
}

/// Fact-extraction method selected by [`HeuristicConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactExtractionMethod {
    Ner,
    Keywords,
    Patterns,
}

/// Bonus/threshold rules driving heuristic importance scoring.
///
/// Kept as a flat struct with fixed defaults rather than a dynamic map,
/// since every key it carries is known up front.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceRules {
    #[serde(default = "default_base_score")]
    pub base_score: i32,
    #[serde(default)]
    pub length_bonus: LengthBonus,
    #[serde(default)]
    pub keyword_bonus: KeywordBonus,
    #[serde(default = "default_question_bonus")]
    pub question_bonus: i32,
    #[serde(default = "default_code_bonus")]
    pub code_bonus: i32,
    #[serde(default = "default_url_bonus")]
    pub url_bonus: i32,
}

fn default_base_score() -> i32 {
    5
}
fn default_question_bonus() -> i32 {
    1
}
fn default_code_bonus() -> i32 {
    2
}
fn default_url_bonus() -> i32 {
    1
}

impl Default for ImportanceRules {
    fn default() -> Self {
        Self {
            base_score: default_base_score(),
            length_bonus: LengthBonus::default(),
            keyword_bonus: KeywordBonus::default(),
            question_bonus: default_question_bonus(),
            code_bonus: default_code_bonus(),
            url_bonus: default_url_bonus(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LengthBonus {
    #[serde(default = "default_length_threshold")]
    pub threshold: usize,
    #[serde(default = "default_length_bonus_value")]
    pub bonus: i32,
}

fn default_length_threshold() -> usize {
    500
}
fn default_length_bonus_value() -> i32 {
    2
}

impl Default for LengthBonus {
    fn default() -> Self {
        Self {
            threshold: default_length_threshold(),
            bonus: default_length_bonus_value(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordBonus {
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_keyword_bonus_value")]
    pub bonus: i32,
}

fn default_keywords() -> Vec<String> {
    vec![
        "important".to_string(),
        "remember".to_string(),
        "critical".to_string(),
    ]
}
fn default_keyword_bonus_value() -> i32 {
    2
}

impl Default for KeywordBonus {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            bonus: default_keyword_bonus_value(),
        }
    }
}

/// Configuration for [`crate::processor::heuristic::HeuristicProcessor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicConfig {
    #[serde(default = "default_summary_method")]
    pub summary_method: SummaryMethod,
    #[serde(default = "default_summary_max_length")]
    pub summary_max_length: usize,
    #[serde(default = "default_fact_extraction_method")]
    pub fact_extraction_method: FactExtractionMethod,
    #[serde(default)]
    pub use_spacy: bool,
    #[serde(default)]
    pub custom_patterns: Vec<String>,
    #[serde(default)]
    pub importance_rules: ImportanceRules,
    #[serde(default = "default_top_keywords")]
    pub top_keywords: usize,
    #[serde(default = "default_min_keyword_length")]
    pub min_keyword_length: usize,
}

fn default_summary_method() -> SummaryMethod {
    SummaryMethod::Keybert
}
fn default_summary_max_length() -> usize {
    500
}
fn default_fact_extraction_method() -> FactExtractionMethod {
    FactExtractionMethod::Keywords
}
fn default_top_keywords() -> usize {
    10
}
fn default_min_keyword_length() -> usize {
    3
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            summary_method: default_summary_method(),
            summary_max_length: default_summary_max_length(),
            fact_extraction_method: default_fact_extraction_method(),
            use_spacy: false,
            custom_patterns: Vec::new(),
            importance_rules: ImportanceRules::default(),
            top_keywords: default_top_keywords(),
            min_keyword_length: default_min_keyword_length(),
        }
    }
}

/// Configuration for [`crate::processor::hybrid::HybridProcessor`] routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    #[serde(default = "default_ai_threshold_importance")]
    pub ai_threshold_importance: i32,
    #[serde(default = "default_ai_probability")]
    pub ai_probability: f64,
    #[serde(default = "default_true")]
    pub fallback_to_heuristic: bool,
    #[serde(default = "default_max_ai_calls_per_batch")]
    pub max_ai_calls_per_batch: usize,
    #[serde(default = "default_true")]
    pub prefer_cached: bool,
}

fn default_ai_threshold_importance() -> i32 {
    7
}
fn default_ai_probability() -> f64 {
    0.1
}
fn default_true() -> bool {
    true
}
fn default_max_ai_calls_per_batch() -> usize {
    5
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            ai_threshold_importance: default_ai_threshold_importance(),
            ai_probability: default_ai_probability(),
            fallback_to_heuristic: true,
            max_ai_calls_per_batch: default_max_ai_calls_per_batch(),
            prefer_cached: true,
        }
    }
}

/// Root configuration document for a [`crate::manager::MemoryManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default = "default_stm_max_length")]
    pub stm_max_length: usize,
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    #[serde(default = "default_true")]
    pub ltm_enabled: bool,
    #[serde(default = "default_vector_db_path")]
    pub vector_db_path: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub ai_adapter_name: Option<String>,
    #[serde(default)]
    pub ai_adapter_config: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub heuristic_config: HeuristicConfig,
    #[serde(default)]
    pub hybrid_config: HybridConfig,
    #[serde(default)]
    pub batch_processing: bool,
    #[serde(default = "default_true")]
    pub cache_summaries: bool,
    #[serde(default)]
    pub max_api_calls_per_minute: Option<u32>,
    #[serde(default = "default_true")]
    pub enable_metrics: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_mode() -> Mode {
    Mode::Heuristic
}
fn default_stm_max_length() -> usize {
    DEFAULT_STM_MAX_LENGTH
}
fn default_storage_path() -> String {
    DEFAULT_STORAGE_PATH.to_string()
}
fn default_vector_db_path() -> String {
    DEFAULT_VECTOR_DB_PATH.to_string()
}
fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            stm_max_length: default_stm_max_length(),
            storage_path: default_storage_path(),
            ltm_enabled: true,
            vector_db_path: default_vector_db_path(),
            embedding_model: default_embedding_model(),
            ai_adapter_name: None,
            ai_adapter_config: HashMap::new(),
            heuristic_config: HeuristicConfig::default(),
            hybrid_config: HybridConfig::default(),
            batch_processing: false,
            cache_summaries: true,
            max_api_calls_per_minute: None,
            enable_metrics: true,
            log_level: default_log_level(),
        }
    }
}

impl MemoryConfig {
    /// Load a configuration document from a `.json`, `.yaml`, or `.yml`
    /// file. Any other extension fails with [`ConfigError::UnsupportedFormat`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_lowercase();

        match extension.as_str() {
            "json" => serde_json::from_str(&contents).map_err(|err| ConfigError::Parse {
                path: path.display().to_string(),
                source: Box::new(err),
            }),
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|err| ConfigError::Parse {
                path: path.display().to_string(),
                source: Box::new(err),
            }),
            other => Err(ConfigError::UnsupportedFormat {
                extension: other.to_string(),
            }),
        }
    }

    /// Collect every violation in this configuration. An empty vec means
    /// the configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if matches!(self.mode, Mode::Ai) && self.ai_adapter_name.is_none() {
            violations.push("AI mode requires 'ai_adapter_name'".to_string());
        }

        if matches!(self.mode, Mode::Hybrid) {
            if self.ai_adapter_name.is_none() {
                violations.push("Hybrid mode requires 'ai_adapter_name'".to_string());
            }
            if !(0.0..=1.0).contains(&self.hybrid_config.ai_probability) {
                violations.push("hybrid_config.ai_probability must be in [0, 1]".to_string());
            }
            if !(1..=10).contains(&self.hybrid_config.ai_threshold_importance) {
                violations
                    .push("hybrid_config.ai_threshold_importance must be in [1, 10]".to_string());
            }
        }

        if self.stm_max_length == 0 {
            violations.push("stm_max_length must be greater than 0".to_string());
        }

        if matches!(self.max_api_calls_per_minute, Some(0)) {
            violations.push("max_api_calls_per_minute must be greater than 0 when set".to_string());
        }

        if self.heuristic_config.summary_max_length == 0 {
            violations.push("heuristic_config.summary_max_length must be greater than 0".to_string());
        }

        if self.heuristic_config.top_keywords == 0 {
            violations.push("heuristic_config.top_keywords must be greater than 0".to_string());
        }

        if self.heuristic_config.min_keyword_length == 0 {
            violations.push("heuristic_config.min_keyword_length must be greater than 0".to_string());
        }

        if self.storage_path.is_empty() {
            violations.push("storage_path must be a non-empty string".to_string());
        }

        if self.vector_db_path.is_empty() {
            violations.push("vector_db_path must be a non-empty string".to_string());
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.to_uppercase().as_str()) {
            violations.push(format!(
                "log_level must be one of {:?}",
                VALID_LOG_LEVELS
            ));
        }

        violations
    }

    /// Validate and convert to a `Result`, collecting every violation into
    /// a single [`ConfigError::Invalid`].
    pub fn validated(self) -> Result<Self, ConfigError> {
        let violations = self.validate();
        if violations.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Invalid { violations })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MemoryConfig::default().validate().is_empty());
    }

    #[test]
    fn ai_mode_requires_adapter_name() {
        let config = MemoryConfig {
            mode: Mode::Ai,
            ..Default::default()
        };
        let violations = config.validate();
        assert!(violations.iter().any(|v| v.contains("ai_adapter_name")));
    }

    #[test]
    fn validate_collects_every_violation_not_just_first() {
        let config = MemoryConfig {
            mode: Mode::Hybrid,
            stm_max_length: 0,
            log_level: "NOPE".to_string(),
            ..Default::default()
        };
        let violations = config.validate();
        assert!(violations.len() >= 3);
    }

    #[test]
    fn from_file_rejects_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "mode = \"heuristic\"").unwrap();
        let err = MemoryConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }

    #[test]
    fn from_file_loads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"mode": "ai", "ai_adapter_name": "openai"}"#).unwrap();
        let config = MemoryConfig::from_file(&path).unwrap();
        assert!(matches!(config.mode, Mode::Ai));
        assert_eq!(config.ai_adapter_name.as_deref(), Some("openai"));
    }

    #[test]
    fn from_file_loads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "mode: heuristic\nstm_max_length: 42\n").unwrap();
        let config = MemoryConfig::from_file(&path).unwrap();
        assert_eq!(config.stm_max_length, 42);
    }
}
