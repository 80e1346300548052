//! Completion backend interface and OpenAI-compatible client
//!
//! Two call shapes are supported: one blocking completion returning the full
//! message, and one streaming completion delivering content fragments through
//! a single-producer single-consumer channel that closes when the model is
//! done. Response-format parsing lives in [`parse`].

mod openai;
pub mod parse;

pub use openai::OpenAiClient;
pub use parse::{extract_numbered_queries, split_reasoning_answer, ParseError};

use crate::store::Message;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Completion request failed: {0}")]
    Request(String),

    #[error("Completion API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("Completion stream error: {0}")]
    Stream(String),

    #[error("Missing API key: environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("Completion request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

/// Finite, non-restartable sequence of content fragments in model emission
/// order. The channel closes after the final fragment; a mid-stream failure
/// is delivered as one `Err` item and then the channel closes.
pub type TokenStream = tokio::sync::mpsc::Receiver<Result<String, LlmError>>;

/// Chat-completion backend interface
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// One non-streaming call returning the full assistant message.
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// One streaming call yielding content fragments as the model emits them.
    async fn complete_stream(&self, messages: &[Message]) -> Result<TokenStream, LlmError>;
}
