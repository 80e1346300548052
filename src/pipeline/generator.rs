//! Answer generation over conversation history and retrieved context
//!
//! Message construction is shared between the blocking and streaming call
//! shapes. Blocking mode parses the fixed two-section response format;
//! streaming mode hands fragments straight through and the verbatim
//! accumulated text is what gets persisted as the assistant turn.

use crate::llm::{split_reasoning_answer, CompletionBackend, LlmError, ParseError, TokenStream};
use crate::pipeline::SessionLocks;
use crate::prompts;
use crate::store::{ConversationStore, Message, Role, StoreError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerateError {
    /// The response did not match the two-section format. Carries the raw
    /// response so callers can degrade to it instead of failing.
    #[error("Response format mismatch: {source}")]
    Format {
        source: ParseError,
        raw: String,
    },

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct AnswerGenerator {
    llm: Arc<dyn CompletionBackend>,
    store: Arc<dyn ConversationStore>,
    locks: Arc<SessionLocks>,
}

impl AnswerGenerator {
    pub fn new(
        llm: Arc<dyn CompletionBackend>,
        store: Arc<dyn ConversationStore>,
        locks: Arc<SessionLocks>,
    ) -> Self {
        Self { llm, store, locks }
    }

    /// Build the completion message list: system prompt, full prior history
    /// for the session, then the new user turn embedding the query and the
    /// joined context text (empty string when nothing was retrieved).
    pub async fn build_messages(
        &self,
        session_key: &str,
        user_query: &str,
        context_text: &str,
    ) -> Result<Vec<Message>, StoreError> {
        let history = self.store.load(session_key).await?;

        let mut messages = vec![Message::system(prompts::ANSWER_SYSTEM_PROMPT)];
        messages.extend(history);
        messages.push(Message::user(prompts::answer_user_prompt(
            user_query,
            context_text,
        )));
        Ok(messages)
    }

    /// One non-streaming call, parsed into (reasoning, answer).
    pub async fn generate_blocking(
        &self,
        messages: &[Message],
    ) -> Result<(String, String), GenerateError> {
        let raw = self.llm.complete(messages).await?;
        split_reasoning_answer(&raw).map_err(|source| GenerateError::Format { source, raw })
    }

    /// One streaming call. The caller accumulates the fragments; no section
    /// parsing is attempted on streamed output.
    pub async fn generate_streaming(&self, messages: &[Message]) -> Result<TokenStream, LlmError> {
        self.llm.complete_stream(messages).await
    }

    /// Persist one completed exchange: the user turn, then the assistant
    /// turn, serialized per session key so concurrent requests cannot
    /// interleave their read-modify-write appends.
    pub async fn record_exchange(
        &self,
        session_key: &str,
        user_query: &str,
        assistant_text: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.locks.acquire(session_key).await;
        self.store
            .append(session_key, Role::User, user_query)
            .await?;
        self.store
            .append(session_key, Role::Assistant, assistant_text)
            .await
    }
}
