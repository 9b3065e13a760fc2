//! The public façade: one [`MemoryManager`] per conversation context, owning
//! its STM ring, its processor, and (when LTM is enabled) a vector store
//! handle.
//!
//! LTM distillation, once a thread's STM reaches its cap, runs as a detached
//! `tokio::spawn` task rather than being awaited inline -- further
//! `add_message` calls are not blocked on it, and the snapshot it processes
//! is captured synchronously before the task is spawned, so later appends
//! are never re-processed by that task.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::adapter::{Adapter, AdapterMessage, ExtractedFact};
use crate::config::{LTM_SEARCH_RESULTS, MemoryConfig, Mode};
use crate::embeddings;
use crate::entry::{LlmMessage, MemoryEntry, Role};
use crate::error::{AdapterError, ConfigError, CoreError};
use crate::processor::{AIProcessor, DisabledProcessor, HeuristicProcessor, HybridProcessor, Processor};
use crate::vector_store::VectorStore;

/// One conversation context: its STM (per thread), its processor, and
/// (when LTM is enabled) its vector store handle.
pub struct MemoryManager {
    context_id: String,
    config: MemoryConfig,
    memory_file: PathBuf,
    stm: RwLock<HashMap<String, VecDeque<MemoryEntry>>>,
    vector_store: Option<Arc<VectorStore>>,
    processor: Arc<dyn Processor>,
}

impl MemoryManager {
    pub fn builder() -> MemoryManagerBuilder {
        MemoryManagerBuilder::default()
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Rehydrate STM from the persisted document. Records that fail to
    /// parse are skipped (and logged) rather than aborting the whole load.
    /// `false` if there was nothing to load.
    pub async fn load(&self) -> bool {
        let path = self.memory_file.clone();
        let doc: Option<serde_json::Value> =
            tokio::task::spawn_blocking(move || crate::persistence::load_from_json(&path))
                .await
                .unwrap_or(None);

        let Some(doc) = doc else {
            return false;
        };
        let Some(stm_value) = doc.get("stm").and_then(|v| v.as_object()) else {
            return false;
        };

        let mut rehydrated: HashMap<String, VecDeque<MemoryEntry>> = HashMap::new();
        for (thread, entries) in stm_value {
            let mut queue = VecDeque::new();
            if let Some(array) = entries.as_array() {
                for raw in array {
                    match serde_json::from_value::<MemoryEntry>(raw.clone()) {
                        Ok(entry) => queue.push_back(entry),
                        Err(err) => {
                            tracing::warn!(thread = %thread, error = %err, "skipping unparsable STM entry")
                        }
                    }
                }
            }
            rehydrated.insert(thread.clone(), queue);
        }

        *self.stm.write() = rehydrated;
        true
    }

    /// Persist the current STM. Disk I/O is offloaded to a blocking task;
    /// this never panics or propagates an error, matching the
    /// persistence sink's "never raises" contract.
    pub async fn save(&self) -> bool {
        let snapshot: HashMap<String, Vec<serde_json::Value>> = {
            let stm = self.stm.read();
            stm.iter()
                .map(|(thread, queue)| (thread.clone(), queue.iter().map(MemoryEntry::to_persisted).collect()))
                .collect()
        };
        let doc = serde_json::json!({ "stm": snapshot });
        let path = self.memory_file.clone();
        tokio::task::spawn_blocking(move || crate::persistence::save_to_json(&doc, &path))
            .await
            .unwrap_or(false)
    }

    /// Append `entry` to `thread_id`'s STM (bounded at
    /// `config.stm_max_length`, oldest evicted), persist, and -- once that
    /// thread's STM has reached its cap -- schedule LTM distillation as a
    /// detached task.
    pub async fn add_message(&self, entry: MemoryEntry, thread_id: Option<&str>) {
        let thread = thread_id.unwrap_or("default").to_string();

        let reached_cap = {
            let mut stm = self.stm.write();
            let queue = stm.entry(thread.clone()).or_default();
            queue.push_back(entry);
            while queue.len() > self.config.stm_max_length {
                queue.pop_front();
            }
            queue.len() >= self.config.stm_max_length
        };

        self.save().await;

        if !reached_cap || matches!(self.config.mode, Mode::Disabled) || !self.config.ltm_enabled {
            return;
        }

        let Some(vector_store) = self.vector_store.clone() else {
            return;
        };
        let processor = self.processor.clone();
        let context_id = self.context_id.clone();
        let snapshot: Vec<MemoryEntry> = {
            let stm = self.stm.read();
            stm.get(&thread).map(|queue| queue.iter().cloned().collect()).unwrap_or_default()
        };

        tokio::spawn(process_stm_for_ltm(processor, vector_store, context_id, snapshot));
    }

    /// Relevant LTM summaries (when `include_ltm`) as synthetic
    /// system-role entries prefixed `"Relevant Long Term Memory: "`,
    /// followed by the thread's STM in order.
    pub async fn get_context(
        &self,
        current_prompt: &str,
        thread_id: Option<&str>,
        include_ltm: bool,
    ) -> Vec<LlmMessage> {
        let thread = thread_id.unwrap_or("default");
        let mut context = Vec::new();

        if include_ltm {
            if let Some(vector_store) = &self.vector_store {
                match vector_store.search_memories(current_prompt, &self.context_id, LTM_SEARCH_RESULTS).await {
                    Ok(records) => {
                        for record in records {
                            context.push(LlmMessage {
                                role: Role::System,
                                content: Some(format!("Relevant Long Term Memory: {}", record.summary)),
                                tool_calls: None,
                                name: None,
                                tool_call_id: None,
                            });
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "LTM retrieval failed, continuing with STM only")
                    }
                }
            }
        }

        let stm = self.stm.read();
        if let Some(queue) = stm.get(thread) {
            context.extend(queue.iter().map(MemoryEntry::to_llm));
        }
        context
    }

    /// Clear `thread_id`'s STM, or (when absent) every thread's STM plus
    /// the context's LTM collection. `true` iff anything was cleared.
    pub async fn reset(&self, thread_id: Option<&str>) -> bool {
        match thread_id {
            Some(thread) => self.stm.write().remove(thread).is_some(),
            None => {
                let cleared_stm = {
                    let mut stm = self.stm.write();
                    let had_entries = !stm.is_empty();
                    stm.clear();
                    had_entries
                };
                let cleared_ltm = match &self.vector_store {
                    Some(vector_store) => vector_store.reset(&self.context_id).await.unwrap_or_else(|err| {
                        tracing::warn!(error = %err, "failed to reset LTM collection");
                        false
                    }),
                    None => false,
                };
                cleared_stm || cleared_ltm
            }
        }
    }

    /// The underlying processor's metrics snapshot.
    pub fn get_metrics(&self) -> serde_json::Value {
        self.processor.get_metrics()
    }
}

/// Runs detached after a thread's STM reaches its cap: summarise and
/// extract facts from the captured snapshot in parallel, score and
/// upsert each into LTM. Best-effort -- a failed upsert is logged, not
/// propagated, since nothing awaits this task's outcome.
async fn process_stm_for_ltm(
    processor: Arc<dyn Processor>,
    vector_store: Arc<VectorStore>,
    context_id: String,
    snapshot: Vec<MemoryEntry>,
) {
    let messages: Vec<AdapterMessage> =
        snapshot.iter().filter(|entry| entry.is_conversational()).map(AdapterMessage::from).collect();
    if messages.is_empty() {
        return;
    }

    let (summary, facts) = tokio::join!(processor.summarize(&messages), processor.extract_facts(&messages));

    if let Some(summary) = summary {
        let importance = processor.score_importance(&summary).await;
        if let Err(err) = vector_store.add_memory(&summary, &context_id, importance as i64).await {
            tracing::warn!(error = %err, "failed to write LTM summary");
        }
    }

    for fact in facts {
        let text = stringify_fact(&fact);
        if text.is_empty() {
            continue;
        }
        let importance = processor.score_importance(&text).await;
        if let Err(err) = vector_store.add_memory(&text, &context_id, importance as i64).await {
            tracing::warn!(error = %err, "failed to write LTM fact");
        }
    }
}

/// Join a fact's values with spaces; non-string values fall back to their
/// JSON string form.
fn stringify_fact(fact: &ExtractedFact) -> String {
    fact.values().map(value_to_text).collect::<Vec<_>>().join(" ")
}

fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn resolve_adapter(
    config: &MemoryConfig,
    override_adapter: &Option<Arc<dyn Adapter>>,
) -> Result<Arc<dyn Adapter>, CoreError> {
    if let Some(adapter) = override_adapter {
        return Ok(adapter.clone());
    }

    let name = config.ai_adapter_name.as_deref().ok_or_else(|| {
        CoreError::Adapter(AdapterError::not_found("<none configured>", crate::adapter::registry::global().list()))
    })?;
    let adapter_config = config.ai_adapter_config.clone().into_iter().collect();
    crate::adapter::registry::global().get(name, adapter_config).map_err(CoreError::Adapter)
}

fn build_processor(config: &MemoryConfig, override_adapter: Option<Arc<dyn Adapter>>) -> Result<Arc<dyn Processor>, CoreError> {
    Ok(match config.mode {
        Mode::Disabled => Arc::new(DisabledProcessor) as Arc<dyn Processor>,
        Mode::Heuristic => Arc::new(HeuristicProcessor::new(config.heuristic_config.clone())),
        Mode::Ai => {
            let adapter = resolve_adapter(config, &override_adapter)?;
            Arc::new(AIProcessor::new(
                adapter,
                config.cache_summaries,
                config.max_api_calls_per_minute,
                config.batch_processing,
            ))
        }
        Mode::Hybrid => {
            let adapter = resolve_adapter(config, &override_adapter)?;
            let heuristic = HeuristicProcessor::new(config.heuristic_config.clone());
            let ai = AIProcessor::new(
                adapter,
                config.cache_summaries,
                config.max_api_calls_per_minute,
                config.batch_processing,
            );
            Arc::new(HybridProcessor::new(heuristic, ai, config.hybrid_config.clone()))
        }
    })
}

/// Builds a [`MemoryManager`], folding legacy direct parameters (storage
/// path, STM cap, a directly-injected adapter) into a [`MemoryConfig`] when
/// an explicit config is absent.
#[derive(Default)]
pub struct MemoryManagerBuilder {
    context_id: Option<String>,
    config: Option<MemoryConfig>,
    storage_path: Option<String>,
    max_stm_length: Option<usize>,
    adapter: Option<Arc<dyn Adapter>>,
}

impl MemoryManagerBuilder {
    pub fn context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    pub fn config(mut self, config: MemoryConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn storage_path(mut self, storage_path: impl Into<String>) -> Self {
        self.storage_path = Some(storage_path.into());
        self
    }

    pub fn max_stm_length(mut self, max_stm_length: usize) -> Self {
        self.max_stm_length = Some(max_stm_length);
        self
    }

    pub fn adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub async fn build(self) -> Result<MemoryManager, CoreError> {
        let context_id = self.context_id.ok_or_else(|| {
            CoreError::Config(ConfigError::Invalid { violations: vec!["context_id is required".to_string()] })
        })?;

        let mut config = self.config.unwrap_or_default();
        if let Some(storage_path) = self.storage_path {
            config.storage_path = storage_path;
        }
        if let Some(max_stm_length) = self.max_stm_length {
            config.stm_max_length = max_stm_length;
        }
        let config = config.validated()?;

        let processor = build_processor(&config, self.adapter)?;

        let vector_store = if config.ltm_enabled && !matches!(config.mode, Mode::Disabled) {
            let provider = embeddings::provider_for_model_identifier(&config.embedding_model).await;
            let store = VectorStore::open(&config.vector_db_path, provider).await.map_err(CoreError::vector_store)?;
            Some(Arc::new(store))
        } else {
            None
        };

        let memory_file = Path::new(&config.storage_path).join("contexts").join(&context_id).join("memory.json");

        let manager = MemoryManager {
            context_id,
            config,
            memory_file,
            stm: RwLock::new(HashMap::new()),
            vector_store,
            processor,
        };
        manager.load().await;
        Ok(manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HeuristicConfig, Mode as ConfigMode};

    fn temp_storage_path() -> String {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();
        std::mem::forget(dir);
        path
    }

    fn temp_vector_db_path() -> String {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db").to_string_lossy().to_string();
        std::mem::forget(dir);
        path
    }

    async fn heuristic_manager(context_id: &str, stm_max_length: usize) -> MemoryManager {
        let config = MemoryConfig {
            mode: ConfigMode::Heuristic,
            stm_max_length,
            storage_path: temp_storage_path(),
            vector_db_path: temp_vector_db_path(),
            heuristic_config: HeuristicConfig::default(),
            ..Default::default()
        };
        MemoryManager::builder().context_id(context_id).config(config).build().await.unwrap()
    }

    #[tokio::test]
    async fn builder_requires_context_id() {
        let err = MemoryManager::builder().build().await.unwrap_err();
        assert!(matches!(err, CoreError::Config(ConfigError::Invalid { .. })));
    }

    #[tokio::test]
    async fn add_message_respects_stm_cap() {
        let manager = heuristic_manager("ctx-cap", 3).await;
        for i in 0..5 {
            manager.add_message(MemoryEntry::user(format!("message {i}")), None).await;
        }
        let context = manager.get_context("anything", None, false).await;
        assert_eq!(context.len(), 3);
    }

    #[tokio::test]
    async fn reset_without_thread_clears_everything() {
        let manager = heuristic_manager("ctx-reset", 10).await;
        manager.add_message(MemoryEntry::user("hi"), None).await;
        assert!(manager.reset(None).await);
        let context = manager.get_context("anything", None, false).await;
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn reset_with_thread_only_clears_that_thread() {
        let manager = heuristic_manager("ctx-threads", 10).await;
        manager.add_message(MemoryEntry::user("hi"), Some("a")).await;
        manager.add_message(MemoryEntry::user("yo"), Some("b")).await;

        assert!(manager.reset(Some("a")).await);
        assert!(manager.get_context("x", Some("a"), false).await.is_empty());
        assert!(!manager.get_context("x", Some("b"), false).await.is_empty());
    }

    #[tokio::test]
    async fn disabled_mode_never_triggers_ltm_and_reports_distinct_metrics() {
        let config = MemoryConfig {
            mode: ConfigMode::Disabled,
            stm_max_length: 1,
            storage_path: temp_storage_path(),
            ltm_enabled: false,
            ..Default::default()
        };
        let manager = MemoryManager::builder().context_id("ctx-disabled").config(config).build().await.unwrap();
        manager.add_message(MemoryEntry::user("hi"), None).await;
        assert_eq!(manager.get_metrics()["mode"], "disabled");
    }

    #[tokio::test]
    async fn stm_overflow_eventually_populates_ltm() {
        let manager = heuristic_manager("ctx-overflow", 3).await;
        for i in 0..4 {
            manager
                .add_message(MemoryEntry::user(format!("important fact number {i}")), None)
                .await;
            manager
                .add_message(MemoryEntry::assistant(format!("acknowledged fact {i}")), None)
                .await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let context = manager.get_context("fact", None, true).await;
        assert!(context.iter().any(|m| {
            m.content.as_deref().is_some_and(|c| c.starts_with("Relevant Long Term Memory: "))
        }));
    }

    #[tokio::test]
    async fn load_rehydrates_what_save_persisted() {
        let storage_path = temp_storage_path();
        let vector_db_path = temp_vector_db_path();
        let config = MemoryConfig {
            mode: ConfigMode::Heuristic,
            stm_max_length: 10,
            storage_path: storage_path.clone(),
            vector_db_path: vector_db_path.clone(),
            ..Default::default()
        };
        let first = MemoryManager::builder().context_id("ctx-persist").config(config.clone()).build().await.unwrap();
        first.add_message(MemoryEntry::user("remember this"), None).await;

        let second = MemoryManager::builder().context_id("ctx-persist").config(config).build().await.unwrap();
        let context = second.get_context("anything", None, false).await;
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].content.as_deref(), Some("remember this"));
    }
}
