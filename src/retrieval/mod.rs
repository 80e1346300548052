//! Owner-scoped hybrid retrieval
//!
//! One semantic search per expanded sub-query against a hybrid (dense+sparse)
//! index, fused server-side with reciprocal rank fusion. Every query carries a
//! server-side owner filter; results are never post-filtered client-side, so
//! the filter is the single tenancy boundary.

mod fusion;
mod qdrant;

pub use fusion::{fuse_top_k, FUSED_TOP_K};
pub use qdrant::QdrantBackend;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Search backend error: {0}")]
    Backend(String),
}

/// Payload attached to an indexed chunk: the known fields plus whatever else
/// the indexing pipeline stored (speaker, quarter, source document, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct HitPayload {
    /// Full chunk text. Never exposed in client-facing metadata.
    pub text: String,
    /// Owner identity the chunk is scoped to.
    pub user_id: String,
    /// Open extension map for provenance fields.
    pub extra: Map<String, Value>,
}

impl HitPayload {
    /// Build a payload from a raw backend map, pulling out the known fields.
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let text = match map.remove("text") {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let user_id = match map.remove("user_id") {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        Self {
            text,
            user_id,
            extra: map,
        }
    }

    /// Client-safe view of the payload: every field except `text`.
    pub fn provenance(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("user_id".to_string(), Value::String(self.user_id.clone()));
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

/// One ranked hit from a hybrid search. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Fused relevance score; absent when the backend returned none.
    pub score: Option<f32>,
    pub payload: HitPayload,
}

/// Search backend interface: one owner-scoped hybrid query.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn hybrid_search(
        &self,
        query: &str,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, SearchError>;
}

/// Executes sub-query searches against a search backend, concurrently for the
/// fan-out case.
pub struct Retriever {
    backend: Arc<dyn SearchBackend>,
    topn: usize,
}

impl Retriever {
    pub fn new(backend: Arc<dyn SearchBackend>, topn: usize) -> Self {
        Self { backend, topn }
    }

    /// One owner-scoped hybrid search.
    pub async fn search(&self, query: &str, owner_id: &str) -> Result<Vec<SearchHit>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }
        tracing::debug!(query, owner_id, "running hybrid search");
        let hits = self.backend.hybrid_search(query, owner_id, self.topn).await?;
        tracing::debug!(query, hits = hits.len(), "hybrid search returned");
        Ok(hits)
    }

    /// Fan out one search per sub-query, waiting for all of them to finish.
    /// A failed sub-query never cancels its siblings; each slot carries its
    /// own `Result` in input order.
    pub async fn search_many(
        &self,
        queries: &[String],
        owner_id: &str,
    ) -> Vec<Result<Vec<SearchHit>, SearchError>> {
        let searches = queries.iter().map(|q| self.search(q, owner_id));
        futures::future::join_all(searches).await
    }
}
