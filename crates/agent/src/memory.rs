//! Context assembly for the orchestrator: conversations, recent history,
//! the latest summary, audience resolution, staleness, and the nudge
//! counter. Makes no delivery or generation decisions itself.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use pulsey_core::domain::conversation::{
    Conversation, ConversationId, ConversationMetadata, ConversationStatus,
};
use pulsey_core::domain::instance::{AgentInstanceId, AudienceConfig};
use pulsey_core::domain::message::Message;
use pulsey_core::domain::roster::{EmployeeId, OrgId, OrgMember};
use pulsey_core::domain::summary::FeedbackSummary;
use pulsey_db::repositories::{
    ConversationRepository, MessageRepository, RosterRepository, SummaryRepository,
};

use crate::EngineError;

/// How many trailing messages a generation prompt carries.
const PROMPT_HISTORY_LIMIT: usize = 10;

#[derive(Clone, Debug)]
pub struct ConversationContext {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    pub latest_summary: Option<FeedbackSummary>,
    pub participant_name: String,
    pub participant_email: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StalenessCheck {
    pub is_stale: bool,
    pub days_since_last_message: i64,
    pub nudge_count: u32,
}

pub struct MemoryStore {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    summaries: Arc<dyn SummaryRepository>,
    roster: Arc<dyn RosterRepository>,
}

impl MemoryStore {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        summaries: Arc<dyn SummaryRepository>,
        roster: Arc<dyn RosterRepository>,
    ) -> Self {
        Self { conversations, messages, summaries, roster }
    }

    /// Everything reply handling needs in one fetch. `None` when the
    /// conversation does not exist.
    pub async fn conversation_context(
        &self,
        conversation_id: &ConversationId,
        message_limit: u32,
    ) -> Result<Option<ConversationContext>, EngineError> {
        let Some(conversation) = self.conversations.find_by_id(conversation_id).await? else {
            return Ok(None);
        };

        let messages = self.messages.list_recent(conversation_id, message_limit).await?;
        let latest_summary = self.summaries.latest_for_conversation(conversation_id).await?;
        let member = self
            .roster
            .find_member(&conversation.org_id, &conversation.participant_id)
            .await?;

        let (participant_name, participant_email) = match member {
            Some(member) => (member.name, member.email),
            None => (conversation.participant_id.0.clone(), String::new()),
        };

        Ok(Some(ConversationContext {
            conversation,
            messages,
            latest_summary,
            participant_name,
            participant_email,
        }))
    }

    /// Idempotent: the existing conversation for (instance, participant)
    /// wins over a freshly-minted one.
    pub async fn get_or_create_conversation(
        &self,
        org_id: &OrgId,
        instance_id: &AgentInstanceId,
        participant_id: &EmployeeId,
    ) -> Result<Conversation, EngineError> {
        if let Some(existing) =
            self.conversations.find_by_participant(instance_id, participant_id).await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let conversation = self
            .conversations
            .create(Conversation {
                id: ConversationId(format!("conv-{}", Uuid::new_v4())),
                org_id: org_id.clone(),
                instance_id: instance_id.clone(),
                participant_id: participant_id.clone(),
                status: ConversationStatus::Active,
                message_count: 0,
                unread_count: 0,
                last_message_at: None,
                metadata: ConversationMetadata::default(),
                created_at: now,
                updated_at: now,
            })
            .await?;

        Ok(conversation)
    }

    pub async fn active_conversations(
        &self,
        instance_id: &AgentInstanceId,
    ) -> Result<Vec<Conversation>, EngineError> {
        Ok(self.conversations.list_active_for_instance(instance_id).await?)
    }

    /// Resolves the audience selector against the active roster.
    pub async fn target_employees(
        &self,
        org_id: &OrgId,
        audience: &AudienceConfig,
    ) -> Result<Vec<OrgMember>, EngineError> {
        Ok(self.roster.list_audience(org_id, audience).await?)
    }

    /// Builds the generation-ready transcript: an optional prior-summary
    /// preamble followed by the last ten messages labeled by sender.
    pub fn format_for_prompt(
        messages: &[Message],
        latest_summary: Option<&FeedbackSummary>,
        participant_name: &str,
    ) -> String {
        let mut prompt = String::new();

        if let Some(summary) = latest_summary {
            prompt.push_str(&format!("Previous summary: {}\n", summary.summary_text));
            if !summary.topics.is_empty() {
                prompt.push_str(&format!("Known topics: {}\n", summary.topics.join(", ")));
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!("Conversation with {participant_name}:\n"));
        let skip = messages.len().saturating_sub(PROMPT_HISTORY_LIMIT);
        for message in &messages[skip..] {
            prompt.push_str(&format!(
                "{}: {}\n",
                message.sender.prompt_label(),
                message.content
            ));
        }

        prompt
    }

    /// Stale iff the days since the last message reach `stale_days`; a
    /// conversation that never had a message reports zero days and is not
    /// stale.
    pub async fn check_staleness(
        &self,
        conversation_id: &ConversationId,
        stale_days: u32,
    ) -> Result<StalenessCheck, EngineError> {
        let conversation = self
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| EngineError::ConversationNotFound(conversation_id.0.clone()))?;

        let nudge_count = conversation.metadata.nudge_count;
        let Some(last_message_at) = conversation.last_message_at else {
            return Ok(StalenessCheck {
                is_stale: false,
                days_since_last_message: 0,
                nudge_count,
            });
        };

        let days_since_last_message = (Utc::now() - last_message_at).num_days();
        Ok(StalenessCheck {
            is_stale: days_since_last_message >= i64::from(stale_days),
            days_since_last_message,
            nudge_count,
        })
    }

    /// Read-modify-write on the metadata bag; callers serialize per
    /// conversation.
    pub async fn increment_nudge_count(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<u32, EngineError> {
        let mut conversation = self
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| EngineError::ConversationNotFound(conversation_id.0.clone()))?;

        conversation.metadata.nudge_count += 1;
        self.conversations.update(&conversation).await?;
        Ok(conversation.metadata.nudge_count)
    }
}
