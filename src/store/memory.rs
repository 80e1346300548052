//! In-memory conversation store, used by tests.

use super::{truncate_to_limit, ConversationStore, Message, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

pub struct MemoryStore {
    conversations: Mutex<HashMap<String, Vec<Message>>>,
    limit: usize,
}

impl MemoryStore {
    pub fn new(limit: usize) -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            limit,
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Vec<Message>, StoreError> {
        let conversations = self.conversations.lock().await;
        Ok(conversations.get(key).cloned().unwrap_or_default())
    }

    async fn save(&self, key: &str, mut conversation: Vec<Message>) -> Result<(), StoreError> {
        truncate_to_limit(&mut conversation, self.limit);
        let mut conversations = self.conversations.lock().await;
        conversations.insert(key.to_string(), conversation);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conversations = self.conversations.lock().await;
        conversations.remove(key);
        Ok(())
    }
}
