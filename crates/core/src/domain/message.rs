use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    Employee,
    Agent,
    System,
}

impl MessageSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "employee" => Some(Self::Employee),
            "agent" => Some(Self::Agent),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    /// Label used when formatting history for a generation prompt.
    pub fn prompt_label(&self) -> &'static str {
        match self {
            Self::Employee => "Employee",
            Self::Agent => "Agent",
            Self::System => "System",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Text,
    Markdown,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }
}

/// One message in a conversation. Immutable once created except for the
/// `is_read` flag; ordering is causal by `created_at`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: MessageSender,
    pub content: String,
    pub content_type: ContentType,
    pub metadata: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Creation input for a message; the repository assigns id and timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender: MessageSender,
    pub content: String,
    pub content_type: ContentType,
    pub metadata: serde_json::Value,
}

impl NewMessage {
    pub fn text(
        conversation_id: ConversationId,
        sender: MessageSender,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id,
            sender,
            content: content.into(),
            content_type: ContentType::Text,
            metadata: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ContentType, MessageSender, NewMessage};
    use crate::domain::conversation::ConversationId;

    #[test]
    fn sender_string_forms_round_trip() {
        for sender in [MessageSender::Employee, MessageSender::Agent, MessageSender::System] {
            assert_eq!(MessageSender::parse(sender.as_str()), Some(sender));
        }
        assert_eq!(MessageSender::parse("manager"), None);
    }

    #[test]
    fn text_constructor_defaults_metadata() {
        let message = NewMessage::text(
            ConversationId("conv-1".to_string()),
            MessageSender::Agent,
            "How has your week been?",
        );

        assert_eq!(message.content_type, ContentType::Text);
        assert!(message.metadata.is_null());
    }
}
