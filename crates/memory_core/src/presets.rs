//! Named configuration presets for common deployment shapes.
//!
//! Six presets, each an immutable [`crate::config::MemoryConfig`] document
//! (see `DESIGN.md` for where the exact values come from).

use std::str::FromStr;

use serde_json::json;

use crate::config::{
    CODE_EMBEDDING_MODEL, ENHANCED_EMBEDDING_MODEL, FactExtractionMethod, HeuristicConfig,
    HybridConfig, ImportanceRules, KeywordBonus, LengthBonus, MemoryConfig, Mode, SummaryMethod,
};
use crate::error::ConfigError;

/// One of the six named presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Chatbot,
    ChatbotEnhanced,
    CodingAgent,
    CodingAgentEnhanced,
    Assistant,
    Offline,
}

impl Preset {
    pub const ALL: [Preset; 6] = [
        Preset::Chatbot,
        Preset::ChatbotEnhanced,
        Preset::CodingAgent,
        Preset::CodingAgentEnhanced,
        Preset::Assistant,
        Preset::Offline,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::Chatbot => "chatbot",
            Preset::ChatbotEnhanced => "chatbot-enhanced",
            Preset::CodingAgent => "coding-agent",
            Preset::CodingAgentEnhanced => "coding-agent-enhanced",
            Preset::Assistant => "assistant",
            Preset::Offline => "offline",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Preset::Chatbot => "Hybrid mode with lightweight embeddings (fast)",
            Preset::ChatbotEnhanced => {
                "Hybrid mode with enhanced quality embeddings (better accuracy)"
            }
            Preset::CodingAgent => "Heuristic mode with code-optimized embeddings (fast, offline)",
            Preset::CodingAgentEnhanced => "Hybrid mode with code-optimized embeddings (AI + code focus)",
            Preset::Assistant => "AI mode with enhanced embeddings (high quality)",
            Preset::Offline => "Heuristic mode with lightweight embeddings (completely offline)",
        }
    }

    /// Materialise the immutable configuration document for this preset.
    pub fn to_config(&self) -> MemoryConfig {
        match self {
            Preset::Chatbot => chatbot("all-MiniLM-L6-v2"),
            Preset::ChatbotEnhanced => chatbot("BAAI/bge-m3"),
            Preset::CodingAgent => coding_agent(Mode::Heuristic, None),
            Preset::CodingAgentEnhanced => coding_agent(
                Mode::Hybrid,
                Some(("openai".to_string(), json!({"model": "gpt-4o-mini"}))),
            ),
            Preset::Assistant => assistant(),
            Preset::Offline => offline(),
        }
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| ConfigError::UnknownPreset {
                name: s.to_string(),
                available: Preset::ALL.iter().map(|p| p.name().to_string()).collect(),
            })
    }
}

fn chatbot(embedding_model: &str) -> MemoryConfig {
    MemoryConfig {
        mode: Mode::Hybrid,
        stm_max_length: 100,
        embedding_model: embedding_model.to_string(),
        heuristic_config: HeuristicConfig {
            importance_rules: ImportanceRules {
                base_score: 5,
                keyword_bonus: KeywordBonus {
                    keywords: vec![
                        "remember".to_string(),
                        "always".to_string(),
                        "never".to_string(),
                        "important".to_string(),
                        "prefer".to_string(),
                    ],
                    bonus: 3,
                },
                question_bonus: 2,
                length_bonus: LengthBonus {
                    threshold: 500,
                    bonus: 2,
                },
                code_bonus: 2,
                url_bonus: 1,
            },
            ..Default::default()
        },
        hybrid_config: HybridConfig {
            ai_threshold_importance: 8,
            ai_probability: 0.05,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn coding_agent(mode: Mode, ai_adapter: Option<(String, serde_json::Value)>) -> MemoryConfig {
    let custom_patterns = vec![
        r"def \w+\(".to_string(),
        r"class \w+:".to_string(),
        r"import \w+".to_string(),
        r"file: [\w/\.]+".to_string(),
    ];

    let (keywords, keyword_bonus, question_bonus, hybrid_config) = match &ai_adapter {
        Some(_) => (
            vec![
                "important".to_string(),
                "remember".to_string(),
                "critical".to_string(),
                "bug".to_string(),
                "fix".to_string(),
            ],
            3,
            2,
            HybridConfig {
                ai_threshold_importance: 7,
                ai_probability: 0.1,
                ..Default::default()
            },
        ),
        None => (
            vec![
                "important".to_string(),
                "remember".to_string(),
                "critical".to_string(),
            ],
            2,
            1,
            HybridConfig::default(),
        ),
    };

    let (ai_adapter_name, ai_adapter_config) = match ai_adapter {
        Some((name, config)) => (
            Some(name),
            config
                .as_object()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .collect(),
        ),
        None => (None, Default::default()),
    };

    MemoryConfig {
        mode,
        stm_max_length: 200,
        embedding_model: CODE_EMBEDDING_MODEL.to_string(),
        ai_adapter_name,
        ai_adapter_config,
        heuristic_config: HeuristicConfig {
            summary_method: SummaryMethod::Sample,
            fact_extraction_method: FactExtractionMethod::Patterns,
            custom_patterns,
            importance_rules: ImportanceRules {
                base_score: 5,
                code_bonus: 3,
                length_bonus: LengthBonus {
                    threshold: 300,
                    bonus: 2,
                },
                keyword_bonus: KeywordBonus {
                    keywords,
                    bonus: keyword_bonus,
                },
                question_bonus,
                url_bonus: 1,
            },
            ..Default::default()
        },
        hybrid_config,
        ..Default::default()
    }
}

fn assistant() -> MemoryConfig {
    MemoryConfig {
        mode: Mode::Ai,
        ai_adapter_name: Some("openai".to_string()),
        ai_adapter_config: json!({"model": "gpt-4o-mini"})
            .as_object()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect(),
        stm_max_length: 150,
        embedding_model: ENHANCED_EMBEDDING_MODEL.to_string(),
        heuristic_config: HeuristicConfig {
            importance_rules: ImportanceRules {
                base_score: 5,
                keyword_bonus: KeywordBonus {
                    keywords: vec![
                        "task".to_string(),
                        "todo".to_string(),
                        "remind".to_string(),
                        "schedule".to_string(),
                        "deadline".to_string(),
                    ],
                    bonus: 3,
                },
                length_bonus: LengthBonus {
                    threshold: 500,
                    bonus: 2,
                },
                question_bonus: 1,
                code_bonus: 2,
                url_bonus: 1,
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

fn offline() -> MemoryConfig {
    MemoryConfig {
        mode: Mode::Heuristic,
        ltm_enabled: true,
        heuristic_config: HeuristicConfig {
            summary_method: SummaryMethod::Keybert,
            fact_extraction_method: FactExtractionMethod::Keywords,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_preset_names_parse_back() {
        for preset in Preset::ALL {
            let parsed: Preset = preset.name().parse().unwrap();
            assert_eq!(parsed, preset);
        }
    }

    #[test]
    fn unknown_preset_lists_available() {
        let err = "nonexistent".parse::<Preset>().unwrap_err();
        match err {
            ConfigError::UnknownPreset { available, .. } => assert_eq!(available.len(), 6),
            _ => panic!("expected UnknownPreset"),
        }
    }

    #[test]
    fn chatbot_enhanced_differs_only_in_embedding_model() {
        let base = Preset::Chatbot.to_config();
        let enhanced = Preset::ChatbotEnhanced.to_config();
        assert_eq!(base.stm_max_length, enhanced.stm_max_length);
        assert_ne!(base.embedding_model, enhanced.embedding_model);
        assert_eq!(enhanced.embedding_model, "BAAI/bge-m3");
    }

    #[test]
    fn coding_agent_enhanced_sets_ai_adapter() {
        let config = Preset::CodingAgentEnhanced.to_config();
        assert_eq!(config.ai_adapter_name.as_deref(), Some("openai"));
        assert!(matches!(config.mode, Mode::Hybrid));
    }

    #[test]
    fn every_preset_validates() {
        for preset in Preset::ALL {
            let violations = preset.to_config().validate();
            assert!(
                violations.is_empty(),
                "{} had violations: {violations:?}",
                preset.name()
            );
        }
    }
}
