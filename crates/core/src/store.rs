//! ConversationStore trait: the persistence sink for chat history.
//!
//! Implementations: in-memory (tests, one-shot CLI runs) and JSON lines on
//! disk, one file per session.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::{ConversationId, Message};

/// Append-only message log keyed by session.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "memory", "jsonl").
    fn name(&self) -> &str;

    /// Append one message to the session's history.
    async fn append(
        &self,
        session: &ConversationId,
        message: &Message,
    ) -> std::result::Result<(), StoreError>;

    /// Append several messages, in order.
    async fn append_all(
        &self,
        session: &ConversationId,
        messages: &[Message],
    ) -> std::result::Result<(), StoreError> {
        for message in messages {
            self.append(session, message).await?;
        }
        Ok(())
    }

    /// Every stored message for the session, oldest first. Unknown sessions
    /// have an empty history.
    async fn read_all(
        &self,
        session: &ConversationId,
    ) -> std::result::Result<Vec<Message>, StoreError>;

    /// Forget the session's history.
    async fn clear(&self, session: &ConversationId) -> std::result::Result<(), StoreError>;
}
