//! Callsight - Streaming retrieval-augmented Q&A over earnings-call transcripts
//!
//! One chat request flows through query expansion, concurrent owner-scoped
//! hybrid retrieval, top-K fusion, and a streamed model answer, with bounded
//! conversation history persisted per session and a three-event wire protocol
//! (metadata, token, done) delivered over server-sent events.

pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod retrieval;
pub mod server;
pub mod store;

pub use error::{CallsightError, Result};
