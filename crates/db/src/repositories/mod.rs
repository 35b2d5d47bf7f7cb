use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use pulsey_core::domain::conversation::{Conversation, ConversationId};
use pulsey_core::domain::escalation::Escalation;
use pulsey_core::domain::instance::{AgentInstance, AgentInstanceId, AgentSchedule, AudienceConfig};
use pulsey_core::domain::message::{Message, MessageId, NewMessage};
use pulsey_core::domain::refresh::{RefreshJobId, SummaryRefreshJob};
use pulsey_core::domain::roster::{EmployeeId, OrgId, OrgMember};
use pulsey_core::domain::run::{AgentRun, AgentRunId};
use pulsey_core::domain::summary::{FeedbackSummary, FeedbackSummaryId};
use pulsey_core::domain::template::{AgentTemplate, AgentTemplateId};

pub mod conversation;
pub mod escalation;
pub mod instance;
pub mod memory;
pub mod message;
pub mod refresh_queue;
pub mod roster;
pub mod run;
pub mod summary;

pub use conversation::SqlConversationRepository;
pub use escalation::SqlEscalationRepository;
pub use instance::SqlInstanceRepository;
pub use memory::{
    InMemoryConversationRepository, InMemoryEscalationRepository, InMemoryInstanceRepository,
    InMemoryMessageRepository, InMemoryRefreshJobRepository, InMemoryRosterRepository,
    InMemoryRunRepository, InMemorySummaryRepository,
};
pub use message::SqlMessageRepository;
pub use refresh_queue::SqlRefreshJobRepository;
pub use roster::SqlRosterRepository;
pub use run::SqlRunRepository;
pub use summary::SqlSummaryRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Inserts unless a conversation already exists for the (instance,
    /// participant) pair; returns the stored row either way.
    async fn create(&self, conversation: Conversation) -> Result<Conversation, RepositoryError>;

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    async fn find_by_participant(
        &self,
        instance_id: &AgentInstanceId,
        participant_id: &EmployeeId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError>;

    async fn list_active_for_instance(
        &self,
        instance_id: &AgentInstanceId,
    ) -> Result<Vec<Conversation>, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Assigns id and timestamp; history is append-only.
    async fn append(&self, message: NewMessage) -> Result<Message, RepositoryError>;

    /// The most recent `limit` messages, in ascending creation order.
    async fn list_recent(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;

    async fn mark_read(&self, message_ids: &[MessageId]) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn create(&self, run: AgentRun) -> Result<(), RepositoryError>;
    async fn update(&self, run: &AgentRun) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &AgentRunId) -> Result<Option<AgentRun>, RepositoryError>;
}

#[async_trait]
pub trait SummaryRepository: Send + Sync {
    async fn append(&self, summary: FeedbackSummary) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        id: &FeedbackSummaryId,
    ) -> Result<Option<FeedbackSummary>, RepositoryError>;

    async fn latest_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<FeedbackSummary>, RepositoryError>;

    /// Read-side projection input: every summary written for the org since
    /// the given instant, ascending by creation time.
    async fn list_for_org_since(
        &self,
        org_id: &OrgId,
        since: DateTime<Utc>,
    ) -> Result<Vec<FeedbackSummary>, RepositoryError>;
}

#[async_trait]
pub trait EscalationRepository: Send + Sync {
    /// Inserts unless the triggering message already has an escalation;
    /// returns the stored row either way.
    async fn create(&self, escalation: Escalation) -> Result<Escalation, RepositoryError>;

    async fn list_open_for_org(&self, org_id: &OrgId) -> Result<Vec<Escalation>, RepositoryError>;
}

#[async_trait]
pub trait InstanceRepository: Send + Sync {
    async fn create_template(&self, template: AgentTemplate) -> Result<(), RepositoryError>;
    async fn find_template(
        &self,
        id: &AgentTemplateId,
    ) -> Result<Option<AgentTemplate>, RepositoryError>;

    async fn create_instance(&self, instance: AgentInstance) -> Result<(), RepositoryError>;
    async fn find_instance(
        &self,
        id: &AgentInstanceId,
    ) -> Result<Option<AgentInstance>, RepositoryError>;
    async fn update_instance(&self, instance: &AgentInstance) -> Result<(), RepositoryError>;

    async fn create_schedule(&self, schedule: AgentSchedule) -> Result<(), RepositoryError>;
    async fn find_schedule(
        &self,
        instance_id: &AgentInstanceId,
    ) -> Result<Option<AgentSchedule>, RepositoryError>;
    async fn update_schedule(&self, schedule: &AgentSchedule) -> Result<(), RepositoryError>;

    /// Schedules whose `next_run_at` has passed, oldest first.
    async fn list_due_schedules(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AgentSchedule>, RepositoryError>;
}

#[async_trait]
pub trait RosterRepository: Send + Sync {
    async fn upsert_member(&self, member: OrgMember) -> Result<(), RepositoryError>;

    async fn find_member(
        &self,
        org_id: &OrgId,
        id: &EmployeeId,
    ) -> Result<Option<OrgMember>, RepositoryError>;

    /// Resolves an audience selector against the active roster.
    async fn list_audience(
        &self,
        org_id: &OrgId,
        audience: &AudienceConfig,
    ) -> Result<Vec<OrgMember>, RepositoryError>;
}

#[async_trait]
pub trait RefreshJobRepository: Send + Sync {
    async fn enqueue(&self, job: SummaryRefreshJob) -> Result<(), RepositoryError>;

    /// Claims the oldest due queued or retryable job, marking it running and
    /// counting the attempt. Returns `None` when nothing is due.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<SummaryRefreshJob>, RepositoryError>;

    async fn complete(&self, id: &RefreshJobId) -> Result<(), RepositoryError>;

    async fn reschedule(
        &self,
        id: &RefreshJobId,
        available_at: DateTime<Utc>,
        error: String,
    ) -> Result<(), RepositoryError>;

    async fn park(&self, id: &RefreshJobId, error: String) -> Result<(), RepositoryError>;
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp in `{column}`: {e}")))
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|ts| parse_timestamp(column, ts)).transpose()
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    column: &str,
    value: String,
) -> Result<T, RepositoryError> {
    serde_json::from_str(&value)
        .map_err(|e| RepositoryError::Decode(format!("invalid json in `{column}`: {e}")))
}
