use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::instance::AgentInstanceId;
use crate::domain::message::MessageSender;
use crate::domain::roster::{EmployeeId, OrgId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Paused,
    Escalated,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Escalated => "escalated",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "escalated" => Some(Self::Escalated),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// The conversation's metadata bag. Only the nudge counter is engine-owned;
/// unknown keys written by the dashboard survive a round trip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    #[serde(default)]
    pub nudge_count: u32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The unit of interaction between one agent instance and one participant.
/// Created lazily on first contact; history is append-only. Escalated status
/// is set by the engine and only a human resolution path leaves it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub org_id: OrgId,
    pub instance_id: AgentInstanceId,
    pub participant_id: EmployeeId,
    pub status: ConversationStatus,
    pub message_count: u32,
    pub unread_count: u32,
    pub last_message_at: Option<DateTime<Utc>>,
    pub metadata: ConversationMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn can_transition_to(&self, next: ConversationStatus) -> bool {
        matches!(
            (self.status, next),
            (ConversationStatus::Active, ConversationStatus::Paused)
                | (ConversationStatus::Active, ConversationStatus::Escalated)
                | (ConversationStatus::Active, ConversationStatus::Closed)
                | (ConversationStatus::Paused, ConversationStatus::Active)
                | (ConversationStatus::Paused, ConversationStatus::Closed)
                | (ConversationStatus::Escalated, ConversationStatus::Closed)
        )
    }

    pub fn transition_to(&mut self, next: ConversationStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidConversationTransition { from: self.status, to: next })
    }

    /// Bookkeeping applied when a message lands in this conversation.
    pub fn record_message(&mut self, sender: MessageSender, at: DateTime<Utc>) {
        self.message_count += 1;
        if sender == MessageSender::Agent {
            self.unread_count += 1;
        }
        self.last_message_at = Some(at);
        self.updated_at = at;
    }
}
