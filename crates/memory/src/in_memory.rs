//! In-memory store: useful for testing and single-shot sessions.

use std::collections::HashMap;

use async_trait::async_trait;
use counsel_core::error::StoreError;
use counsel_core::{ConversationId, ConversationStore, Message};
use tokio::sync::RwLock;

/// Keeps every session's history in a map. Nothing survives the process.
#[derive(Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with at least one message.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, session: &ConversationId, message: &Message) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .entry(session.0.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn append_all(
        &self,
        session: &ConversationId,
        messages: &[Message],
    ) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }
        self.sessions
            .write()
            .await
            .entry(session.0.clone())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }

    async fn read_all(&self, session: &ConversationId) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(&session.0)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear(&self, session: &ConversationId) -> Result<(), StoreError> {
        self.sessions.write().await.remove(&session.0);
        Ok(())
    }
}
