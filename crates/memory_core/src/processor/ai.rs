//! Adapter-backed processor: caches, retries, rate-limits, and batches
//! calls into a single [`Adapter`].
//!
//! Retry/backoff follows the same shape as the cloud embedding providers'
//! request loops (`embeddings::cloud`): bounded retries, exponential
//! backoff, a `tracing::warn!` per attempt. The concurrent cache is a
//! `dashmap::DashMap`, the usual concurrent-map choice for this shape of
//! shared, frequently-read state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use tokio::sync::{Notify, oneshot};

use crate::adapter::{Adapter, AdapterMessage, AdapterResult, ExtractedFact};
use crate::error::AdapterError;

use super::{MetricKind, Processor, ProcessingMetrics};

const CACHE_TTL: Duration = Duration::from_secs(3600);
const MAX_RETRIES: u32 = 3;
const BATCH_SIZE: usize = 5;
const BATCH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
enum CachedValue {
    Summary(Option<String>),
    Facts(Vec<ExtractedFact>),
    Importance(i32),
}

struct CacheEntry {
    value: CachedValue,
    expires_at: Instant,
}

/// A `summarize` call waiting in the transparent batch queue for its turn.
struct PendingSummarize {
    messages: Vec<AdapterMessage>,
    key: String,
    reply: oneshot::Sender<Option<String>>,
}

#[derive(Default)]
struct BatchQueue {
    pending: Vec<PendingSummarize>,
}

impl std::fmt::Debug for PendingSummarize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSummarize")
            .field("messages", &self.messages.len())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for BatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchQueue").field("pending", &self.pending.len()).finish()
    }
}

/// Wraps an [`Adapter`] with caching, retry, rate-limiting, and batching,
/// exposed through the same infallible [`Processor`] contract as every
/// other variant. Internal failures (after retries are exhausted) degrade
/// to a neutral result and are only observable via `get_metrics()`.
#[derive(Debug)]
pub struct AIProcessor {
    adapter: Arc<dyn Adapter>,
    cache: DashMap<String, CacheEntry>,
    cache_enabled: bool,
    max_calls_per_minute: Option<u32>,
    call_log: Mutex<Vec<Instant>>,
    metrics: RwLock<ProcessingMetrics>,
    batch_enabled: bool,
    batch_queue: Mutex<BatchQueue>,
    batch_notify: Notify,
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry").finish_non_exhaustive()
    }
}

impl AIProcessor {
    pub fn new(
        adapter: Arc<dyn Adapter>,
        cache_enabled: bool,
        max_calls_per_minute: Option<u32>,
        batch_enabled: bool,
    ) -> Self {
        Self {
            adapter,
            cache: DashMap::new(),
            cache_enabled,
            max_calls_per_minute,
            call_log: Mutex::new(Vec::new()),
            metrics: RwLock::new(ProcessingMetrics::default()),
            batch_enabled,
            batch_queue: Mutex::new(BatchQueue::default()),
            batch_notify: Notify::new(),
        }
    }

    fn cache_key(op: &str, content: &str) -> String {
        let digest = Sha256::digest(content.as_bytes());
        let hex = format!("{digest:x}");
        format!("{op}:{}", &hex[..16])
    }

    fn cache_get(&self, key: &str) -> Option<CachedValue> {
        if !self.cache_enabled {
            return None;
        }
        let entry = self.cache.get(key)?;
        if entry.expires_at > Instant::now() {
            Some(entry.value.clone())
        } else {
            drop(entry);
            self.cache.remove(key);
            None
        }
    }

    fn cache_put(&self, key: String, value: CachedValue) {
        if self.cache_enabled {
            self.cache.insert(
                key,
                CacheEntry { value, expires_at: Instant::now() + CACHE_TTL },
            );
        }
    }

    /// Block (cooperatively) until a new call fits within the configured
    /// per-minute budget. A no-op when no limit is configured.
    async fn await_rate_limit(&self) {
        let Some(limit) = self.max_calls_per_minute else {
            return;
        };
        loop {
            let wait = {
                let mut log = self.call_log.lock();
                let cutoff = Instant::now() - Duration::from_secs(60);
                log.retain(|t| *t > cutoff);
                if log.len() < limit as usize {
                    log.push(Instant::now());
                    None
                } else {
                    log.first().map(|oldest| *oldest + Duration::from_secs(60) - Instant::now())
                }
            };
            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration.max(Duration::from_millis(10))).await,
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, call: F) -> AdapterResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = AdapterResult<T>>,
    {
        self.metrics.write().increment(MetricKind::AiCalls, operation);
        let started = Instant::now();

        let mut attempt = 1;
        loop {
            self.await_rate_limit().await;
            match call().await {
                Ok(value) => {
                    self.metrics.write().increment(MetricKind::AiSuccess, operation);
                    self.metrics.write().add_time(operation, started.elapsed());
                    return Ok(value);
                }
                Err(err) if attempt < MAX_RETRIES => {
                    let backoff = Duration::from_secs(2u64.pow(attempt - 1));
                    tracing::warn!(
                        "adapter {} call failed (attempt {}/{}): {} -- retrying in {:?}",
                        self.adapter.name(),
                        attempt,
                        MAX_RETRIES,
                        err,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.metrics.write().increment(MetricKind::AiErrors, operation);
                    self.metrics.write().add_time(operation, started.elapsed());
                    return Err(err);
                }
            }
        }
    }

    /// Fallible summarize, retried and cached. Used directly by the hybrid
    /// processor, which needs to observe failure to decide on fallback.
    pub(crate) async fn try_summarize(&self, messages: &[AdapterMessage]) -> AdapterResult<Option<String>> {
        let transcript = transcript_of(messages);
        let key = Self::cache_key("summarize", &transcript);
        if let Some(CachedValue::Summary(cached)) = self.cache_get(&key) {
            return Ok(cached);
        }

        let result = self
            .with_retry("summarize", || self.adapter.summarize_conversation(messages))
            .await?;
        self.cache_put(key, CachedValue::Summary(result.clone()));
        Ok(result)
    }

    pub(crate) async fn try_extract_facts(&self, messages: &[AdapterMessage]) -> AdapterResult<Vec<ExtractedFact>> {
        let transcript = transcript_of(messages);
        let key = Self::cache_key("extract_facts", &transcript);
        if let Some(CachedValue::Facts(cached)) = self.cache_get(&key) {
            return Ok(cached);
        }

        let result = self
            .with_retry("extract_facts", || self.adapter.extract_facts(messages))
            .await?;
        self.cache_put(key, CachedValue::Facts(result.clone()));
        Ok(result)
    }

    pub(crate) async fn try_score_importance(&self, text: &str) -> AdapterResult<i32> {
        let key = Self::cache_key("score_importance", text);
        if let Some(CachedValue::Importance(cached)) = self.cache_get(&key) {
            return Ok(cached);
        }

        let result = self
            .with_retry("score_importance", || self.adapter.score_importance(text))
            .await?;
        self.cache_put(key, CachedValue::Importance(result));
        Ok(result)
    }

    /// Summarize several conversations in as few adapter calls as possible:
    /// groups of up to [`BATCH_SIZE`] are joined into one transcript with
    /// `--- Batch i ---` separators and sent as a single call, then split
    /// back apart on those same markers. If the adapter's response doesn't
    /// contain the expected number of markers, the batch falls back to
    /// dividing the raw response into equal slices, one per input.
    pub async fn batch_summarize(&self, conversations: &[Vec<AdapterMessage>]) -> Vec<Option<String>> {
        let mut results = Vec::with_capacity(conversations.len());
        for chunk in conversations.chunks(BATCH_SIZE) {
            if chunk.len() == 1 {
                results.push(self.try_summarize(&chunk[0]).await.unwrap_or(None));
                continue;
            }

            let combined: Vec<AdapterMessage> = chunk
                .iter()
                .enumerate()
                .flat_map(|(i, messages)| {
                    std::iter::once(AdapterMessage {
                        role: "system".to_string(),
                        content: format!("--- Batch {i} ---"),
                    })
                    .chain(messages.iter().cloned())
                })
                .collect();

            match self.try_summarize(&combined).await {
                Ok(Some(summary)) => results.extend(split_batch_response(&summary, chunk.len())),
                _ => {
                    for conversation in chunk {
                        results.push(self.try_summarize(conversation).await.unwrap_or(None));
                    }
                }
            }
        }
        results
    }

    /// Transparent batch-coalescing path for `summarize`: enqueues this call
    /// alongside any others that arrive within [`BATCH_TIMEOUT`], and joins
    /// them into a single [`batch_summarize`](Self::batch_summarize) call
    /// once either [`BATCH_SIZE`] requests have queued up or the timeout
    /// elapses -- whichever happens first. The caller that pushes the queue
    /// to size does the flush; every other caller just awaits its own
    /// result.
    async fn summarize_batched(&self, messages: &[AdapterMessage]) -> Option<String> {
        let transcript = transcript_of(messages);
        let key = Self::cache_key("summarize", &transcript);
        if let Some(CachedValue::Summary(cached)) = self.cache_get(&key) {
            return cached;
        }

        let (reply, mut receiver) = oneshot::channel();
        let is_leader = {
            let mut queue = self.batch_queue.lock();
            queue.pending.push(PendingSummarize { messages: messages.to_vec(), key, reply });
            self.batch_notify.notify_one();
            queue.pending.len() == 1
        };

        if is_leader {
            let deadline = tokio::time::Instant::now() + BATCH_TIMEOUT;
            loop {
                if self.batch_queue.lock().pending.len() >= BATCH_SIZE {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    _ = self.batch_notify.notified() => {}
                }
            }
            let batch = std::mem::take(&mut self.batch_queue.lock().pending);
            self.process_batch(batch).await;
        }

        receiver.await.unwrap_or(None)
    }

    async fn process_batch(&self, pending: Vec<PendingSummarize>) {
        if pending.is_empty() {
            return;
        }
        if pending.len() == 1 {
            let PendingSummarize { messages, reply, .. } =
                pending.into_iter().next().expect("checked len == 1 above");
            // try_summarize already caches under this exact key.
            let result = self.try_summarize(&messages).await.unwrap_or(None);
            let _ = reply.send(result);
            return;
        }

        let conversations: Vec<Vec<AdapterMessage>> = pending.iter().map(|p| p.messages.clone()).collect();
        let results = self.batch_summarize(&conversations).await;
        for (item, result) in pending.into_iter().zip(results) {
            self.cache_put(item.key, CachedValue::Summary(result.clone()));
            let _ = item.reply.send(result);
        }
    }
}

fn transcript_of(messages: &[AdapterMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split a combined batch summary back into `expected` pieces along
/// `--- Batch i ---` markers, falling back to an equal-length character
/// split when the markers don't line up with what was sent.
fn split_batch_response(summary: &str, expected: usize) -> Vec<Option<String>> {
    let marker = regex::Regex::new(r"(?m)^--- Batch \d+ ---$").expect("valid batch marker pattern");
    let pieces: Vec<&str> = marker.split(summary).map(str::trim).filter(|s| !s.is_empty()).collect();

    if pieces.len() == expected {
        return pieces.into_iter().map(|s| Some(s.to_string())).collect();
    }

    let chars: Vec<char> = summary.chars().collect();
    let slice_len = (chars.len() / expected.max(1)).max(1);
    (0..expected)
        .map(|i| {
            let start = i * slice_len;
            if start >= chars.len() {
                None
            } else {
                let end = (start + slice_len).min(chars.len());
                Some(chars[start..end].iter().collect())
            }
        })
        .collect()
}

#[async_trait::async_trait]
impl Processor for AIProcessor {
    async fn summarize(&self, messages: &[AdapterMessage]) -> Option<String> {
        if self.batch_enabled {
            self.summarize_batched(messages).await
        } else {
            self.try_summarize(messages).await.unwrap_or(None)
        }
    }

    async fn extract_facts(&self, messages: &[AdapterMessage]) -> Vec<ExtractedFact> {
        self.try_extract_facts(messages).await.unwrap_or_default()
    }

    async fn score_importance(&self, text: &str) -> i32 {
        self.try_score_importance(text).await.unwrap_or(5)
    }

    fn get_metrics(&self) -> serde_json::Value {
        serde_json::to_value(&*self.metrics.read()).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::test_support::{AlwaysFailingAdapter, StaticAdapter};
    use std::sync::atomic::Ordering;

    fn msg(role: &str, content: &str) -> AdapterMessage {
        AdapterMessage { role: role.to_string(), content: content.to_string() }
    }

    #[tokio::test]
    async fn successful_call_populates_cache() {
        let processor = AIProcessor::new(Arc::new(StaticAdapter), true, None, false);
        let messages = vec![msg("user", "hello")];
        let first = processor.summarize(&messages).await;
        let second = processor.summarize(&messages).await;
        assert_eq!(first, second);
        assert_eq!(first.as_deref(), Some("a static summary"));
    }

    #[tokio::test]
    async fn failing_adapter_degrades_to_neutral_result() {
        let adapter = Arc::new(AlwaysFailingAdapter::default());
        let processor = AIProcessor::new(adapter.clone(), false, None, false);
        let score = processor.score_importance("hello").await;
        assert_eq!(score, 5);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), MAX_RETRIES as usize);
    }

    #[tokio::test]
    async fn metrics_record_errors_after_retries_exhausted() {
        let adapter = Arc::new(AlwaysFailingAdapter::default());
        let processor = AIProcessor::new(adapter, false, None, false);
        processor.extract_facts(&[msg("user", "hi")]).await;
        let metrics: ProcessingMetrics = serde_json::from_value(processor.get_metrics()).unwrap();
        assert_eq!(metrics.ai_errors.get("extract_facts"), Some(&1));
    }

    #[test]
    fn split_batch_response_uses_markers_when_present() {
        let summary = "first\n--- Batch 1 ---\nsecond";
        let pieces = split_batch_response(summary, 2);
        assert_eq!(pieces, vec![Some("first".to_string()), Some("second".to_string())]);
    }

    #[test]
    fn split_batch_response_falls_back_to_equal_slices() {
        let summary = "no markers here at all";
        let pieces = split_batch_response(summary, 2);
        assert_eq!(pieces.len(), 2);
    }

    #[tokio::test]
    async fn batch_summarize_handles_more_than_one_batch() {
        let processor = AIProcessor::new(Arc::new(StaticAdapter), false, None, false);
        let conversations: Vec<Vec<AdapterMessage>> =
            (0..7).map(|i| vec![msg("user", &format!("message {i}"))]).collect();
        let results = processor.batch_summarize(&conversations).await;
        assert_eq!(results.len(), 7);
    }

    #[derive(Debug, Default)]
    struct CountingAdapter {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Adapter for CountingAdapter {
        fn name(&self) -> &str {
            "counting"
        }

        async fn summarize_conversation(&self, messages: &[AdapterMessage]) -> AdapterResult<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("summary of {} message(s)", messages.len())))
        }

        async fn extract_facts(&self, _messages: &[AdapterMessage]) -> AdapterResult<Vec<ExtractedFact>> {
            Ok(Vec::new())
        }

        async fn score_importance(&self, _text: &str) -> AdapterResult<i32> {
            Ok(5)
        }
    }

    #[tokio::test]
    async fn concurrent_summarize_calls_coalesce_into_few_adapter_calls() {
        let adapter = Arc::new(CountingAdapter::default());
        let processor = Arc::new(AIProcessor::new(adapter.clone(), false, None, true));

        let handles: Vec<_> = (0..BATCH_SIZE)
            .map(|i| {
                let processor = processor.clone();
                tokio::spawn(async move {
                    processor.summarize(&[msg("user", &format!("message {i}"))]).await
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }

        // BATCH_SIZE concurrent requests should collapse into far fewer
        // adapter calls than if each had been issued independently.
        assert!(adapter.calls.load(Ordering::SeqCst) < BATCH_SIZE);
    }
}
