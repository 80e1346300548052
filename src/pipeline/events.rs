//! Client-facing stream event protocol
//!
//! Every completed stream carries exactly one `metadata` event, zero or more
//! `token` events, and exactly one terminal `done` event, in that order. The
//! `metadata` entries are stripped payloads (no `text` field); the `done`
//! event repeats the same entries byte-for-byte.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tagged event union sent over the SSE wire as `data: <JSON>\n\n` frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Emitted once, before any tokens: the expanded queries and the stripped
    /// provenance of the fused retrieval results.
    Metadata {
        queries: Vec<String>,
        metadata: Vec<Map<String, Value>>,
    },
    /// One model-emitted content fragment, in emission order.
    Token { token: String },
    /// Emitted once, after all tokens: the canonical final answer and the
    /// same stripped metadata as the opening event.
    Done {
        answer: String,
        metadata: Vec<Map<String, Value>>,
    },
}
