//! Delivery channel abstraction.
//!
//! The orchestrator talks to a [`ChannelAdapter`] and never to a concrete
//! channel. The only implementation today is the in-app inbox; SMS/chat/email
//! adapters slot in behind the same trait without orchestrator changes.

pub mod inapp;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use pulsey_core::domain::conversation::ConversationId;
use pulsey_core::domain::instance::ChannelKind;
use pulsey_core::domain::message::{Message, MessageId};
use pulsey_db::repositories::{ConversationRepository, MessageRepository, RepositoryError};

pub use inapp::InAppInbox;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
    #[error(transparent)]
    Persistence(#[from] RepositoryError),
}

/// The capability set every delivery channel provides.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Delivers agent-authored content into a conversation and persists it.
    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<Message, ChannelError>;

    async fn mark_as_read(&self, message_ids: &[MessageId]) -> Result<(), ChannelError>;
}

/// Selects the adapter for a channel identifier. Unrecognized identifiers do
/// not exist (`ChannelKind` is closed), so this defaults to in-app.
pub fn channel_for(
    kind: ChannelKind,
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
) -> Arc<dyn ChannelAdapter> {
    match kind {
        ChannelKind::InApp => Arc::new(InAppInbox::new(conversations, messages)),
    }
}
