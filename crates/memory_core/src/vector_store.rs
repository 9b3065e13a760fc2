//! Vector store façade: one SurrealDB table per context, upsert and
//! importance-weighted similarity search.
//!
//! Uses SurrealDB's embedded engine (raw SurrealQL, `vector::distance::knn()`,
//! `HNSW` index definition) with a two-pass, importance-weighted retrieval
//! strategy.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, SurrealKv};

use crate::embeddings::EmbeddingProvider;
use crate::id::LtmRecordId;

/// Only the first pass of retrieval is restricted to this importance floor.
pub const LTM_IMPORTANCE_THRESHOLD: i64 = 8;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("failed to connect to the embedded vector database")]
    Connection(#[source] surrealdb::Error),
    #[error("vector store query failed")]
    Query(#[source] surrealdb::Error),
    #[error("embedding failed: {0}")]
    Embedding(#[from] crate::embeddings::EmbeddingError),
}

pub type Result<T> = std::result::Result<T, VectorStoreError>;

/// One long-term-memory record as returned from a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LtmRecord {
    pub id: LtmRecordId,
    pub summary: String,
    pub importance: i64,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
struct InsertRecord<'a> {
    record_id: String,
    embedding: &'a [f32],
    summary: &'a str,
    importance: i64,
    created_at: i64,
}

/// Per-conversation vector store, one SurrealDB table per `context_id`.
pub struct VectorStore {
    client: Surreal<Db>,
    embedder: Arc<dyn EmbeddingProvider>,
    known_collections: RwLock<HashSet<String>>,
}

fn table_name(context_id: &str) -> String {
    // SurrealDB table identifiers can't contain arbitrary characters;
    // non-alphanumeric bytes are folded to `_` so any context_id is usable.
    let sanitized: String = context_id
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("ltm_{sanitized}")
}

impl VectorStore {
    pub async fn open(path: &str, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let client = Surreal::new::<SurrealKv>(path)
            .await
            .map_err(VectorStoreError::Connection)?;
        client
            .use_ns("memory_core")
            .use_db("ltm")
            .await
            .map_err(VectorStoreError::Connection)?;

        Ok(Self {
            client,
            embedder,
            known_collections: RwLock::new(HashSet::new()),
        })
    }

    /// Idempotently create the table + HNSW index for `context_id`.
    /// Caches known collections in-process to elide repeated DDL.
    pub async fn ensure_collection(&self, context_id: &str) -> Result<()> {
        let table = table_name(context_id);
        if self.known_collections.read().contains(&table) {
            return Ok(());
        }

        let dimensions = self.embedder.dimensions();
        let define_table = format!("DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS");
        self.client
            .query(define_table)
            .await
            .map_err(VectorStoreError::Query)?;

        let define_index = format!(
            "DEFINE INDEX IF NOT EXISTS {table}_embedding_idx ON {table} FIELDS embedding HNSW DIMENSION {dimensions} DIST COSINE"
        );
        self.client
            .query(define_index)
            .await
            .map_err(VectorStoreError::Query)?;

        self.known_collections.write().insert(table);
        Ok(())
    }

    /// Embed `summary_text`, generate a fresh id, and upsert the record.
    pub async fn add_memory(
        &self,
        summary_text: &str,
        context_id: &str,
        importance_score: i64,
    ) -> Result<LtmRecordId> {
        self.ensure_collection(context_id).await?;
        let table = table_name(context_id);

        let embedding = self.embedder.embed(summary_text).await?;
        let id = LtmRecordId::generate();
        let created_at = Utc::now().timestamp();

        let record = InsertRecord {
            record_id: id.to_string(),
            embedding: &embedding.vector,
            summary: summary_text,
            importance: importance_score,
            created_at,
        };

        let query = format!("CREATE {table} CONTENT $record");
        self.client
            .query(query)
            .bind(("record", record))
            .await
            .map_err(VectorStoreError::Query)?;

        Ok(id)
    }

    /// Two-pass importance-weighted similarity search: pass (a) restricted
    /// to `importance >= LTM_IMPORTANCE_THRESHOLD`, pass (b) unrestricted,
    /// merged de-duplicated by id preserving pass (a) first. Yields up to
    /// `2 * n_results` records; empty if the collection doesn't exist yet.
    pub async fn search_memories(
        &self,
        query_text: &str,
        context_id: &str,
        n_results: usize,
    ) -> Result<Vec<LtmRecord>> {
        let table = table_name(context_id);
        if !self.known_collections.read().contains(&table) {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query_text).await?;
        let vector_str = format!(
            "[{}]",
            query_embedding
                .vector
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );

        let important = self
            .knn_query(&table, &vector_str, n_results, Some(LTM_IMPORTANCE_THRESHOLD))
            .await?;
        let general = self.knn_query(&table, &vector_str, n_results, None).await?;

        let mut seen = HashSet::new();
        let mut merged = Vec::with_capacity(important.len() + general.len());
        for record in important.into_iter().chain(general) {
            if seen.insert(record.id) {
                merged.push(record);
            }
        }
        Ok(merged)
    }

    async fn knn_query(
        &self,
        table: &str,
        vector_str: &str,
        limit: usize,
        importance_floor: Option<i64>,
    ) -> Result<Vec<LtmRecord>> {
        let mut query = format!(
            "SELECT *, vector::distance::knn() AS score FROM {table} WHERE embedding <|{limit}|> {vector_str}"
        );
        if let Some(floor) = importance_floor {
            query.push_str(&format!(" AND importance >= {floor}"));
        }
        query.push_str(" ORDER BY score");

        let mut response = self
            .client
            .query(query)
            .await
            .map_err(VectorStoreError::Query)?;
        let rows: Vec<serde_json::Value> = response.take(0).map_err(VectorStoreError::Query)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = LtmRecordId::parse(row.get("record_id")?.as_str()?).ok()?;
                Some(LtmRecord {
                    id,
                    summary: row.get("summary")?.as_str()?.to_string(),
                    importance: row.get("importance")?.as_i64()?,
                    created_at: row.get("created_at")?.as_i64()?,
                })
            })
            .collect())
    }

    /// Drop the collection for `context_id`. Returns `false` if it never
    /// existed.
    pub async fn reset(&self, context_id: &str) -> Result<bool> {
        let table = table_name(context_id);
        let existed = self.known_collections.write().remove(&table);

        let query = format!("REMOVE TABLE IF EXISTS {table}");
        self.client
            .query(query)
            .await
            .map_err(VectorStoreError::Query)?;

        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::SimpleEmbeddingProvider;

    async fn store() -> VectorStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db").to_string_lossy().to_string();
        // leak the tempdir so the backing files outlive the store for the test
        std::mem::forget(dir);
        VectorStore::open(&path, Arc::new(SimpleEmbeddingProvider::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn search_on_empty_collection_returns_empty() {
        let store = store().await;
        let results = store
            .search_memories("what does the user like", "ctx1", 3)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn insert_then_search_finds_it() {
        let store = store().await;
        store
            .add_memory("user loves pepperoni pizza", "ctx1", 9)
            .await
            .unwrap();

        let results = store
            .search_memories("what does the user like to eat", "ctx1", 3)
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].summary, "user loves pepperoni pizza");
    }

    #[tokio::test]
    async fn reset_reports_whether_it_existed() {
        let store = store().await;
        assert!(!store.reset("never-seen").await.unwrap());

        store.add_memory("hello", "ctx2", 5).await.unwrap();
        assert!(store.reset("ctx2").await.unwrap());
    }
}
