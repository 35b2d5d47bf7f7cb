use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use pulsey_core::domain::conversation::ConversationId;
use pulsey_core::domain::instance::ChannelKind;
use pulsey_core::domain::message::{ContentType, Message, MessageId, MessageSender, NewMessage};
use pulsey_db::repositories::{ConversationRepository, MessageRepository};

use crate::{ChannelAdapter, ChannelError};

/// The in-app inbox: persists the message as agent-sent and keeps the
/// conversation's counters and last-message timestamp current.
pub struct InAppInbox {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
}

impl InAppInbox {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
    ) -> Self {
        Self { conversations, messages }
    }
}

#[async_trait]
impl ChannelAdapter for InAppInbox {
    fn kind(&self) -> ChannelKind {
        ChannelKind::InApp
    }

    async fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<Message, ChannelError> {
        let mut conversation = self
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| ChannelError::ConversationNotFound(conversation_id.0.clone()))?;

        let message = self
            .messages
            .append(NewMessage {
                conversation_id: conversation_id.clone(),
                sender: MessageSender::Agent,
                content: content.to_string(),
                content_type: ContentType::Text,
                metadata,
            })
            .await?;

        conversation.record_message(MessageSender::Agent, message.created_at);
        self.conversations.update(&conversation).await?;

        info!(
            event_name = "channel.inapp.message_sent",
            conversation_id = %conversation_id.0,
            message_id = %message.id.0,
            "agent message delivered to in-app inbox"
        );

        Ok(message)
    }

    async fn mark_as_read(&self, message_ids: &[MessageId]) -> Result<(), ChannelError> {
        self.messages.mark_read(message_ids).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pulsey_core::chrono::Utc;
    use pulsey_core::domain::conversation::{
        Conversation, ConversationId, ConversationMetadata, ConversationStatus,
    };
    use pulsey_core::domain::instance::AgentInstanceId;
    use pulsey_core::domain::message::MessageSender;
    use pulsey_core::domain::roster::{EmployeeId, OrgId};
    use pulsey_db::repositories::{
        ConversationRepository, InMemoryConversationRepository, InMemoryMessageRepository,
        MessageRepository,
    };

    use crate::{ChannelAdapter, ChannelError, InAppInbox};

    fn conversation() -> Conversation {
        Conversation {
            id: ConversationId("conv-1".to_string()),
            org_id: OrgId("org-1".to_string()),
            instance_id: AgentInstanceId("inst-1".to_string()),
            participant_id: EmployeeId("emp-1".to_string()),
            status: ConversationStatus::Active,
            message_count: 0,
            unread_count: 0,
            last_message_at: None,
            metadata: ConversationMetadata::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn send_message_persists_and_updates_counters() {
        let conversations = Arc::new(InMemoryConversationRepository::default());
        let messages = Arc::new(InMemoryMessageRepository::default());
        conversations.create(conversation()).await.expect("create conversation");

        let inbox = InAppInbox::new(conversations.clone(), messages.clone());
        assert_eq!(inbox.kind(), pulsey_core::domain::instance::ChannelKind::InApp);
        let sent = inbox
            .send_message(
                &ConversationId("conv-1".to_string()),
                "How has your week been?",
                serde_json::Value::Null,
            )
            .await
            .expect("send message");

        assert_eq!(sent.sender, MessageSender::Agent);

        let stored = conversations
            .find_by_id(&ConversationId("conv-1".to_string()))
            .await
            .expect("find")
            .expect("conversation exists");
        assert_eq!(stored.message_count, 1);
        assert_eq!(stored.unread_count, 1);
        assert_eq!(stored.last_message_at, Some(sent.created_at));
    }

    #[tokio::test]
    async fn send_to_unknown_conversation_is_an_error() {
        let conversations = Arc::new(InMemoryConversationRepository::default());
        let messages = Arc::new(InMemoryMessageRepository::default());
        let inbox = InAppInbox::new(conversations, messages);

        let result = inbox
            .send_message(
                &ConversationId("missing".to_string()),
                "hello",
                serde_json::Value::Null,
            )
            .await;

        assert!(matches!(result, Err(ChannelError::ConversationNotFound(_))));
    }

    #[tokio::test]
    async fn mark_as_read_flips_flags() {
        let conversations = Arc::new(InMemoryConversationRepository::default());
        let messages = Arc::new(InMemoryMessageRepository::default());
        conversations.create(conversation()).await.expect("create conversation");

        let inbox = InAppInbox::new(conversations, messages.clone());
        let sent = inbox
            .send_message(&ConversationId("conv-1".to_string()), "hi", serde_json::Value::Null)
            .await
            .expect("send");

        inbox.mark_as_read(&[sent.id.clone()]).await.expect("mark read");

        let recent = messages
            .list_recent(&ConversationId("conv-1".to_string()), 10)
            .await
            .expect("list");
        assert!(recent[0].is_read);
    }
}
