//! Streaming multi-query retrieval-augmented answer pipeline
//!
//! The orchestrator sequences expansion, parallel retrieval, fusion, metadata
//! emission, streamed answer generation, history persistence, and the final
//! done event. The sequence is linear; each step hands off to the next once
//! it succeeds, and there is no retry loop at this level.

mod events;
mod expander;
mod generator;

pub use events::StreamEvent;
pub use expander::{ExpandError, QueryExpander, MAX_EXPANSIONS};
pub use generator::{AnswerGenerator, GenerateError};

use crate::error::{CallsightError, Result};
use crate::llm::CompletionBackend;
use crate::retrieval::{fuse_top_k, Retriever, SearchHit, FUSED_TOP_K};
use crate::store::{ConversationStore, Role};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};

/// Per-key async mutexes serializing read-modify-write append pairs on the
/// conversation store. Without this, two concurrent requests for the same
/// session can interleave load/save and drop each other's turns.
pub struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl Default for SessionLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Root orchestrator for one chat request.
pub struct ChatPipeline {
    store: Arc<dyn ConversationStore>,
    retriever: Retriever,
    expander: QueryExpander,
    generator: AnswerGenerator,
}

impl ChatPipeline {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        retriever: Retriever,
        llm: Arc<dyn CompletionBackend>,
    ) -> Self {
        let locks = Arc::new(SessionLocks::new());
        let expander = QueryExpander::new(llm.clone(), store.clone(), locks.clone());
        let generator = AnswerGenerator::new(llm, store.clone(), locks);
        Self {
            store,
            retriever,
            expander,
            generator,
        }
    }

    /// Handle one streaming chat request. Events arrive on the returned
    /// channel in protocol order; the channel closes when the stream is done
    /// or when an upstream failure terminates it.
    pub fn stream_chat(self: &Arc<Self>, session_id: String, query: String) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.run_stream(&session_id, &query, &tx).await {
                tracing::error!(session_id, error = %e, "chat stream terminated");
            }
        });
        rx
    }

    async fn run_stream(
        &self,
        session_id: &str,
        query: &str,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<()> {
        // Expanding: a format mismatch degrades to no expansions instead of
        // failing the request.
        let queries = self.expand_or_empty(session_id, query).await?;

        // Retrieving: fan out, collect survivors, fuse. No expansions means
        // no retrieval at all; generation then runs with empty context.
        let fused = self.retrieve_and_fuse(&queries, session_id).await;

        // Emitting-Metadata: stripped provenance only, never chunk text.
        let provenance: Vec<Map<String, Value>> =
            fused.iter().map(|hit| hit.payload.provenance()).collect();
        self.emit(
            tx,
            StreamEvent::Metadata {
                queries: queries.clone(),
                metadata: provenance.clone(),
            },
        )
        .await;

        // Generating-Answer: context joins the unstripped text fields.
        let context_text = fused
            .iter()
            .map(|hit| hit.payload.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let messages = self
            .generator
            .build_messages(session_id, query, &context_text)
            .await
            .map_err(CallsightError::Store)?;
        let mut tokens = self
            .generator
            .generate_streaming(&messages)
            .await
            .map_err(CallsightError::Llm)?;

        // Emitting-Tokens: forward each fragment immediately, in emission
        // order, while accumulating the full text.
        let mut accumulated = String::new();
        while let Some(item) = tokens.recv().await {
            match item {
                Ok(token) => {
                    accumulated.push_str(&token);
                    self.emit(tx, StreamEvent::Token { token }).await;
                }
                Err(e) => return Err(CallsightError::Llm(e)),
            }
        }

        // The exchange is persisted even if the client has disconnected;
        // history consistency outranks output suppression.
        self.generator
            .record_exchange(session_id, query, &accumulated)
            .await
            .map_err(CallsightError::Store)?;

        // Finalizing: re-read the store; the latest assistant turn is the
        // system of record for the final answer.
        let conversation = self
            .store
            .load(session_id)
            .await
            .map_err(CallsightError::Store)?;
        let final_answer = conversation
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        self.emit(
            tx,
            StreamEvent::Done {
                answer: final_answer,
                metadata: provenance,
            },
        )
        .await;
        Ok(())
    }

    /// Handle one blocking chat request: same expansion and retrieval steps,
    /// then a non-streaming completion. A two-section parse failure degrades
    /// to the raw response text.
    pub async fn answer(&self, session_id: &str, query: &str) -> Result<String> {
        let queries = self.expand_or_empty(session_id, query).await?;
        let fused = self.retrieve_and_fuse(&queries, session_id).await;

        let context_text = fused
            .iter()
            .map(|hit| hit.payload.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let messages = self
            .generator
            .build_messages(session_id, query, &context_text)
            .await
            .map_err(CallsightError::Store)?;

        let answer = match self.generator.generate_blocking(&messages).await {
            Ok((_reasoning, answer)) => answer,
            Err(GenerateError::Format { source, raw }) => {
                tracing::warn!(error = %source, "answer format mismatch; keeping raw text");
                raw
            }
            Err(GenerateError::Llm(e)) => return Err(CallsightError::Llm(e)),
            Err(GenerateError::Store(e)) => return Err(CallsightError::Store(e)),
        };

        self.generator
            .record_exchange(session_id, query, &answer)
            .await
            .map_err(CallsightError::Store)?;
        Ok(answer)
    }

    async fn expand_or_empty(&self, session_id: &str, query: &str) -> Result<Vec<String>> {
        match self.expander.expand(session_id, query).await {
            Ok(queries) => Ok(queries),
            Err(ExpandError::Format(e)) => {
                tracing::warn!(session_id, error = %e, "expansion unparseable; continuing without sub-queries");
                Ok(Vec::new())
            }
            Err(ExpandError::Llm(e)) => Err(CallsightError::Llm(e)),
            Err(ExpandError::Store(e)) => Err(CallsightError::Store(e)),
        }
    }

    async fn retrieve_and_fuse(&self, queries: &[String], owner_id: &str) -> Vec<SearchHit> {
        if queries.is_empty() {
            return Vec::new();
        }

        let results = self.retriever.search_many(queries, owner_id).await;
        let mut result_sets = Vec::with_capacity(results.len());
        for (query, result) in queries.iter().zip(results) {
            match result {
                Ok(hits) => result_sets.push(hits),
                Err(e) => {
                    tracing::warn!(query, error = %e, "sub-query search failed; excluded from fusion");
                }
            }
        }
        fuse_top_k(result_sets, FUSED_TOP_K)
    }

    /// Send one event to the client. A closed channel means the client went
    /// away; emission stops silently but the pipeline keeps running so store
    /// writes still land.
    async fn emit(&self, tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) {
        if tx.send(event).await.is_err() {
            tracing::debug!("client disconnected; event dropped");
        }
    }
}
