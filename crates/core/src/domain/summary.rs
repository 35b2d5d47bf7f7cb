use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationId;
use crate::domain::message::MessageId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedbackSummaryId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Mixed,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Mixed => "mixed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    Low,
    Medium,
    High,
}

impl ActionPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    RetentionRisk,
    Workload,
    ManagerRelationship,
    Compensation,
    Growth,
    Tooling,
}

impl ActionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetentionRisk => "retention_risk",
            Self::Workload => "workload",
            Self::ManagerRelationship => "manager_relationship",
            Self::Compensation => "compensation",
            Self::Growth => "growth",
            Self::Tooling => "tooling",
        }
    }
}

/// A follow-up synthesized from a conversation, for the HR dashboard's
/// action queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub category: ActionCategory,
    pub description: String,
    pub priority: ActionPriority,
    pub confidence: f64,
}

/// One observation in a conversation's append-only insight history. Each
/// summary points at the summary it was compared against; the chain per
/// conversation is acyclic and strictly time-ordered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub id: FeedbackSummaryId,
    pub conversation_id: ConversationId,
    pub sentiment: Sentiment,
    pub score: f64,
    pub topics: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub key_quotes: Vec<String>,
    pub summary_text: String,
    pub delta_notes: Option<String>,
    pub previous_summary_id: Option<FeedbackSummaryId>,
    pub first_message_id: Option<MessageId>,
    pub last_message_id: Option<MessageId>,
    pub message_count: u32,
    pub created_at: DateTime<Utc>,
}
