//! Conversation storage
//!
//! A conversation is an ordered, bounded log of role-tagged messages addressed
//! by an opaque session key. The store owns truncation: `save` keeps only the
//! most recent `limit` messages, so a conversation can never grow past the
//! configured bound regardless of how many appends it receives.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Failed to decode stored conversation: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<::redis::RedisError> for StoreError {
    fn from(e: ::redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn in a conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Key-value conversation store interface
///
/// `append` is read-modify-write over `load`/`save`; callers that may race on
/// the same key are expected to serialize through
/// [`crate::pipeline::SessionLocks`].
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load the conversation for a session key, empty if none exists.
    async fn load(&self, key: &str) -> Result<Vec<Message>, StoreError>;

    /// Persist a conversation, truncating to the most recent `limit` messages.
    async fn save(&self, key: &str, conversation: Vec<Message>) -> Result<(), StoreError>;

    /// Remove a conversation entirely.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Append one message to the conversation for `key`.
    async fn append(&self, key: &str, role: Role, content: &str) -> Result<(), StoreError> {
        let mut conversation = self.load(key).await?;
        conversation.push(Message::new(role, content));
        self.save(key, conversation).await
    }
}

/// Derived session key holding query-expansion history, kept separate from the
/// main answer conversation.
pub fn expansion_key(session_key: &str) -> String {
    format!("{session_key}_q_breakdown")
}

/// Truncation policy shared by store implementations: keep the newest `limit`
/// messages in original relative order.
pub(crate) fn truncate_to_limit(conversation: &mut Vec<Message>, limit: usize) {
    if conversation.len() > limit {
        let excess = conversation.len() - limit;
        conversation.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expansion_key_derivation() {
        assert_eq!(expansion_key("alice"), "alice_q_breakdown");
    }

    #[test]
    fn test_truncate_keeps_newest_in_order() {
        let mut conversation: Vec<Message> = (0..7)
            .map(|i| Message::user(format!("turn {i}")))
            .collect();
        truncate_to_limit(&mut conversation, 4);

        assert_eq!(conversation.len(), 4);
        assert_eq!(conversation[0].content, "turn 3");
        assert_eq!(conversation[3].content, "turn 6");
    }

    #[test]
    fn test_truncate_noop_under_limit() {
        let mut conversation = vec![Message::user("only one")];
        truncate_to_limit(&mut conversation, 10);
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = Message::assistant("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
