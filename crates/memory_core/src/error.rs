//! Error taxonomy for the memory engine
//!
//! Errors that surface to a host are rare by design (see `§7` of the design
//! doc): configuration problems at construction, and adapter-not-found
//! during registry lookups. Everything else — a transient adapter failure,
//! a persistence I/O error, a vector store hiccup — is logged and degraded
//! internally so the manager's public operations stay total.

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while building or loading a [`crate::config::MemoryConfig`].
#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("invalid configuration: {}", .violations.join("; "))]
    #[diagnostic(
        code(memory_core::config::invalid),
        help("fix the listed violations and reconstruct the configuration")
    )]
    Invalid { violations: Vec<String> },

    #[error("failed to read configuration file {path}")]
    #[diagnostic(code(memory_core::config::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported configuration file extension: {extension}")]
    #[diagnostic(
        code(memory_core::config::unsupported_format),
        help("use a .json, .yaml, or .yml file")
    )]
    UnsupportedFormat { extension: String },

    #[error("failed to parse configuration file {path}")]
    #[diagnostic(code(memory_core::config::parse))]
    Parse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("unknown preset: {name}")]
    #[diagnostic(
        code(memory_core::config::unknown_preset),
        help("available presets: {}", .available.join(", "))
    )]
    UnknownPreset { name: String, available: Vec<String> },
}

/// Errors raised by adapter construction and registry lookups.
#[derive(Error, Debug, Diagnostic)]
pub enum AdapterError {
    #[error("adapter '{name}' not found")]
    #[diagnostic(
        code(memory_core::adapter::not_found),
        help("available adapters: {}", .available.join(", "))
    )]
    NotFound { name: String, available: Vec<String> },

    #[error("adapter '{name}' does not conform to the adapter interface")]
    #[diagnostic(code(memory_core::adapter::not_conforming))]
    NotConforming { name: String },

    #[error("adapter '{name}' failed to construct")]
    #[diagnostic(code(memory_core::adapter::construction))]
    Construction {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A call into the adapter failed. Used internally by the AI processor's
    /// fallible path (see `processor::ai::AiProcessor::try_summarize` and
    /// friends); never constructed as something that reaches a manager
    /// caller directly.
    #[error("adapter call failed: {0}")]
    #[diagnostic(code(memory_core::adapter::transient))]
    Transient(String),
}

/// Top-level crate error.
#[derive(Error, Debug, Diagnostic)]
pub enum CoreError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Adapter(#[from] AdapterError),

    #[error("vector store error: {0}")]
    #[diagnostic(code(memory_core::vector_store))]
    VectorStore(String),

    #[error("operation cancelled")]
    #[diagnostic(code(memory_core::cancelled))]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn vector_store(cause: impl std::fmt::Display) -> Self {
        CoreError::VectorStore(cause.to_string())
    }
}

impl AdapterError {
    pub fn not_found(name: impl Into<String>, available: Vec<String>) -> Self {
        AdapterError::NotFound {
            name: name.into(),
            available,
        }
    }

    pub fn construction(name: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        AdapterError::Construction {
            name: name.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_invalid_lists_all_violations() {
        let err = ConfigError::Invalid {
            violations: vec!["a".to_string(), "b".to_string()],
        };
        let report = miette::Report::new(err);
        assert!(report.to_string().contains("a; b"));
    }

    #[test]
    fn adapter_not_found_lists_available() {
        let err = AdapterError::not_found("openai", vec!["anthropic".to_string(), "ollama".to_string()]);
        let report = miette::Report::new(err);
        let rendered = format!("{report:?}");
        assert!(rendered.contains("anthropic"));
    }
}
