//! Query expansion via one blocking model call
//!
//! Keeps its own conversation history under the derived
//! `{session}_q_breakdown` key so future expansions see prior phrasing. The
//! raw model response is stored verbatim, not the parsed queries, and the
//! appends happen before parsing so a malformed response is still retained.

use crate::llm::{extract_numbered_queries, CompletionBackend, LlmError, ParseError};
use crate::pipeline::SessionLocks;
use crate::prompts;
use crate::store::{expansion_key, ConversationStore, Message, Role, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// Fixed cap on expansions per request.
pub const MAX_EXPANSIONS: usize = 3;

#[derive(Error, Debug)]
pub enum ExpandError {
    #[error(transparent)]
    Format(#[from] ParseError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct QueryExpander {
    llm: Arc<dyn CompletionBackend>,
    store: Arc<dyn ConversationStore>,
    locks: Arc<SessionLocks>,
}

impl QueryExpander {
    pub fn new(
        llm: Arc<dyn CompletionBackend>,
        store: Arc<dyn ConversationStore>,
        locks: Arc<SessionLocks>,
    ) -> Self {
        Self { llm, store, locks }
    }

    /// Expand one user query into up to [`MAX_EXPANSIONS`] sub-queries, in the
    /// order the model listed them.
    pub async fn expand(
        &self,
        session_key: &str,
        user_query: &str,
    ) -> Result<Vec<String>, ExpandError> {
        let history_key = expansion_key(session_key);
        let history = self.store.load(&history_key).await?;

        let mut messages = vec![Message::system(prompts::EXPANSION_SYSTEM_PROMPT)];
        messages.extend(history);
        messages.push(Message::user(prompts::expansion_user_prompt(user_query)));

        let response = self.llm.complete(&messages).await?;

        {
            let _guard = self.locks.acquire(&history_key).await;
            self.store
                .append(&history_key, Role::User, user_query)
                .await?;
            self.store
                .append(&history_key, Role::Assistant, &response)
                .await?;
        }

        let mut queries = extract_numbered_queries(&response)?;
        queries.truncate(MAX_EXPANSIONS);
        tracing::debug!(session_key, expansions = queries.len(), "query expanded");
        Ok(queries)
    }
}
