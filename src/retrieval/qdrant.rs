//! Qdrant hybrid-search backend
//!
//! Issues one `query_points` call per sub-query: a dense and a sparse
//! `Document` prefetch over the same collection, fused with reciprocal rank
//! fusion server-side. The owner filter is applied to both prefetches and to
//! the fusion query itself so no unscoped candidate can leak through.

use super::{HitPayload, SearchBackend, SearchError, SearchHit};
use crate::config::QdrantConfig;
use async_trait::async_trait;
use qdrant_client::qdrant::{
    value::Kind, Condition, Document, Filter, Fusion, PrefetchQueryBuilder, Query,
    QueryPointsBuilder, Value as QdrantValue,
};
use qdrant_client::Qdrant;
use serde_json::{Map, Number, Value};
use std::time::Duration;

pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
    dense_model: String,
    sparse_model: String,
    dense_vector: String,
    sparse_vector: String,
    owner_field: String,
}

impl QdrantBackend {
    pub fn from_config(config: &QdrantConfig) -> Result<Self, SearchError> {
        let client = Qdrant::from_url(&config.url)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.collection_name.clone(),
            dense_model: config.dense_model.clone(),
            sparse_model: config.sparse_model.clone(),
            dense_vector: config.dense_vector_name.clone(),
            sparse_vector: config.sparse_vector_name.clone(),
            owner_field: config.owner_field.clone(),
        })
    }

    fn owner_filter(&self, owner_id: &str) -> Filter {
        Filter::must([Condition::matches(
            self.owner_field.clone(),
            owner_id.to_string(),
        )])
    }
}

#[async_trait]
impl SearchBackend for QdrantBackend {
    async fn hybrid_search(
        &self,
        query: &str,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let filter = self.owner_filter(owner_id);

        let dense_prefetch = PrefetchQueryBuilder::default()
            .query(Query::new_nearest(Document::new(query, &self.dense_model)))
            .using(&self.dense_vector)
            .filter(filter.clone())
            .limit(limit as u64);
        let sparse_prefetch = PrefetchQueryBuilder::default()
            .query(Query::new_nearest(Document::new(query, &self.sparse_model)))
            .using(&self.sparse_vector)
            .filter(filter.clone())
            .limit(limit as u64);

        let request = QueryPointsBuilder::new(&self.collection)
            .add_prefetch(dense_prefetch)
            .add_prefetch(sparse_prefetch)
            .query(Fusion::Rrf)
            .filter(filter)
            .limit(limit as u64)
            .with_payload(true);

        let response = self
            .client
            .query(request)
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let mut map = Map::new();
                for (key, value) in point.payload {
                    map.insert(key, qdrant_value_to_json(value));
                }
                SearchHit {
                    score: Some(point.score),
                    payload: HitPayload::from_map(map),
                }
            })
            .collect())
    }
}

fn qdrant_value_to_json(value: QdrantValue) -> Value {
    match value.kind {
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => Number::from_f64(d).map(Value::Number).unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        ),
        Some(Kind::NullValue(_)) | None => Value::Null,
    }
}
