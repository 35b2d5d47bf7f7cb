//! In-memory repository fakes used across the workspace's tests.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use pulsey_core::domain::conversation::{Conversation, ConversationId};
use pulsey_core::domain::escalation::Escalation;
use pulsey_core::domain::instance::{AgentInstance, AgentInstanceId, AgentSchedule, AudienceConfig};
use pulsey_core::domain::message::{Message, MessageId, NewMessage};
use pulsey_core::domain::refresh::{RefreshJobId, RefreshJobState, SummaryRefreshJob};
use pulsey_core::domain::roster::{EmployeeId, OrgId, OrgMember};
use pulsey_core::domain::run::{AgentRun, AgentRunId};
use pulsey_core::domain::summary::{FeedbackSummary, FeedbackSummaryId};
use pulsey_core::domain::template::{AgentTemplate, AgentTemplateId};

use super::{
    ConversationRepository, EscalationRepository, InstanceRepository, MessageRepository,
    RefreshJobRepository, RepositoryError, RosterRepository, RunRepository, SummaryRepository,
};

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<String, Conversation>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn create(&self, conversation: Conversation) -> Result<Conversation, RepositoryError> {
        let mut conversations = self.conversations.write().await;
        let existing = conversations.values().find(|candidate| {
            candidate.instance_id == conversation.instance_id
                && candidate.participant_id == conversation.participant_id
        });
        if let Some(existing) = existing {
            return Ok(existing.clone());
        }

        conversations.insert(conversation.id.0.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(&id.0).cloned())
    }

    async fn find_by_participant(
        &self,
        instance_id: &AgentInstanceId,
        participant_id: &EmployeeId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .values()
            .find(|candidate| {
                candidate.instance_id == *instance_id
                    && candidate.participant_id == *participant_id
            })
            .cloned())
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.id.0.clone(), conversation.clone());
        Ok(())
    }

    async fn list_active_for_instance(
        &self,
        instance_id: &AgentInstanceId,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        let mut active: Vec<Conversation> = conversations
            .values()
            .filter(|candidate| {
                candidate.instance_id == *instance_id
                    && candidate.status
                        == pulsey_core::domain::conversation::ConversationStatus::Active
            })
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(active)
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<Message>>,
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let stored = Message {
            id: MessageId(format!("msg-{}", uuid::Uuid::new_v4())),
            conversation_id: message.conversation_id,
            sender: message.sender,
            content: message.content,
            content_type: message.content_type,
            metadata: message.metadata,
            is_read: false,
            created_at: Utc::now(),
        };

        let mut messages = self.messages.write().await;
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_recent(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let matching: Vec<Message> = messages
            .iter()
            .filter(|message| message.conversation_id == *conversation_id)
            .cloned()
            .collect();

        let skip = matching.len().saturating_sub(limit as usize);
        Ok(matching.into_iter().skip(skip).collect())
    }

    async fn mark_read(&self, message_ids: &[MessageId]) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        for message in messages.iter_mut() {
            if message_ids.contains(&message.id) {
                message.is_read = true;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRunRepository {
    runs: RwLock<HashMap<String, AgentRun>>,
}

#[async_trait::async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn create(&self, run: AgentRun) -> Result<(), RepositoryError> {
        let mut runs = self.runs.write().await;
        runs.insert(run.id.0.clone(), run);
        Ok(())
    }

    async fn update(&self, run: &AgentRun) -> Result<(), RepositoryError> {
        let mut runs = self.runs.write().await;
        runs.insert(run.id.0.clone(), run.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &AgentRunId) -> Result<Option<AgentRun>, RepositoryError> {
        let runs = self.runs.read().await;
        Ok(runs.get(&id.0).cloned())
    }
}

/// Needs the conversation fake to resolve each summary's org for
/// `list_for_org_since`, mirroring the SQL join.
pub struct InMemorySummaryRepository {
    summaries: RwLock<Vec<FeedbackSummary>>,
    conversations: Arc<InMemoryConversationRepository>,
}

impl InMemorySummaryRepository {
    pub fn new(conversations: Arc<InMemoryConversationRepository>) -> Self {
        Self { summaries: RwLock::new(Vec::new()), conversations }
    }
}

#[async_trait::async_trait]
impl SummaryRepository for InMemorySummaryRepository {
    async fn append(&self, summary: FeedbackSummary) -> Result<(), RepositoryError> {
        let mut summaries = self.summaries.write().await;
        summaries.push(summary);
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &FeedbackSummaryId,
    ) -> Result<Option<FeedbackSummary>, RepositoryError> {
        let summaries = self.summaries.read().await;
        Ok(summaries.iter().find(|summary| summary.id == *id).cloned())
    }

    async fn latest_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<FeedbackSummary>, RepositoryError> {
        let summaries = self.summaries.read().await;
        Ok(summaries
            .iter()
            .rev()
            .find(|summary| summary.conversation_id == *conversation_id)
            .cloned())
    }

    async fn list_for_org_since(
        &self,
        org_id: &OrgId,
        since: DateTime<Utc>,
    ) -> Result<Vec<FeedbackSummary>, RepositoryError> {
        let summaries = self.summaries.read().await;
        let mut matching = Vec::new();
        for summary in summaries.iter() {
            if summary.created_at < since {
                continue;
            }
            let conversation =
                self.conversations.find_by_id(&summary.conversation_id).await?;
            if conversation.map(|conversation| conversation.org_id == *org_id).unwrap_or(false) {
                matching.push(summary.clone());
            }
        }
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryEscalationRepository {
    escalations: RwLock<HashMap<String, Escalation>>,
}

#[async_trait::async_trait]
impl EscalationRepository for InMemoryEscalationRepository {
    async fn create(&self, escalation: Escalation) -> Result<Escalation, RepositoryError> {
        let mut escalations = self.escalations.write().await;
        let stored = escalations
            .entry(escalation.message_id.0.clone())
            .or_insert_with(|| escalation.clone());
        Ok(stored.clone())
    }

    async fn list_open_for_org(&self, org_id: &OrgId) -> Result<Vec<Escalation>, RepositoryError> {
        let escalations = self.escalations.read().await;
        let mut open: Vec<Escalation> = escalations
            .values()
            .filter(|escalation| {
                escalation.org_id == *org_id
                    && escalation.status
                        == pulsey_core::domain::escalation::EscalationStatus::Open
            })
            .cloned()
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(open)
    }
}

#[derive(Default)]
pub struct InMemoryInstanceRepository {
    templates: RwLock<HashMap<String, AgentTemplate>>,
    instances: RwLock<HashMap<String, AgentInstance>>,
    schedules: RwLock<HashMap<String, AgentSchedule>>,
}

#[async_trait::async_trait]
impl InstanceRepository for InMemoryInstanceRepository {
    async fn create_template(&self, template: AgentTemplate) -> Result<(), RepositoryError> {
        let mut templates = self.templates.write().await;
        templates.insert(template.id.0.clone(), template);
        Ok(())
    }

    async fn find_template(
        &self,
        id: &AgentTemplateId,
    ) -> Result<Option<AgentTemplate>, RepositoryError> {
        let templates = self.templates.read().await;
        Ok(templates.get(&id.0).cloned())
    }

    async fn create_instance(&self, instance: AgentInstance) -> Result<(), RepositoryError> {
        let mut instances = self.instances.write().await;
        instances.insert(instance.id.0.clone(), instance);
        Ok(())
    }

    async fn find_instance(
        &self,
        id: &AgentInstanceId,
    ) -> Result<Option<AgentInstance>, RepositoryError> {
        let instances = self.instances.read().await;
        Ok(instances.get(&id.0).cloned())
    }

    async fn update_instance(&self, instance: &AgentInstance) -> Result<(), RepositoryError> {
        let mut instances = self.instances.write().await;
        instances.insert(instance.id.0.clone(), instance.clone());
        Ok(())
    }

    async fn create_schedule(&self, schedule: AgentSchedule) -> Result<(), RepositoryError> {
        let mut schedules = self.schedules.write().await;
        schedules.insert(schedule.instance_id.0.clone(), schedule);
        Ok(())
    }

    async fn find_schedule(
        &self,
        instance_id: &AgentInstanceId,
    ) -> Result<Option<AgentSchedule>, RepositoryError> {
        let schedules = self.schedules.read().await;
        Ok(schedules.get(&instance_id.0).cloned())
    }

    async fn update_schedule(&self, schedule: &AgentSchedule) -> Result<(), RepositoryError> {
        let mut schedules = self.schedules.write().await;
        schedules.insert(schedule.instance_id.0.clone(), schedule.clone());
        Ok(())
    }

    async fn list_due_schedules(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AgentSchedule>, RepositoryError> {
        let schedules = self.schedules.read().await;
        let mut due: Vec<AgentSchedule> = schedules
            .values()
            .filter(|schedule| {
                schedule.next_run_at.map(|next_run| next_run <= now).unwrap_or(false)
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| a.next_run_at.cmp(&b.next_run_at));
        Ok(due)
    }
}

#[derive(Default)]
pub struct InMemoryRosterRepository {
    members: RwLock<HashMap<(String, String), OrgMember>>,
}

#[async_trait::async_trait]
impl RosterRepository for InMemoryRosterRepository {
    async fn upsert_member(&self, member: OrgMember) -> Result<(), RepositoryError> {
        let mut members = self.members.write().await;
        members.insert((member.org_id.0.clone(), member.id.0.clone()), member);
        Ok(())
    }

    async fn find_member(
        &self,
        org_id: &OrgId,
        id: &EmployeeId,
    ) -> Result<Option<OrgMember>, RepositoryError> {
        let members = self.members.read().await;
        Ok(members.get(&(org_id.0.clone(), id.0.clone())).cloned())
    }

    async fn list_audience(
        &self,
        org_id: &OrgId,
        audience: &AudienceConfig,
    ) -> Result<Vec<OrgMember>, RepositoryError> {
        let members = self.members.read().await;
        let mut matching: Vec<OrgMember> = members
            .values()
            .filter(|member| member.org_id == *org_id && member.active)
            .filter(|member| match audience {
                AudienceConfig::CompanyWide => true,
                AudienceConfig::Departments { departments } => member
                    .department
                    .as_ref()
                    .map(|department| departments.contains(department))
                    .unwrap_or(false),
                AudienceConfig::Employees { employee_ids } => employee_ids.contains(&member.id),
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryRefreshJobRepository {
    jobs: RwLock<HashMap<String, SummaryRefreshJob>>,
}

#[async_trait::async_trait]
impl RefreshJobRepository for InMemoryRefreshJobRepository {
    async fn enqueue(&self, job: SummaryRefreshJob) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id.0.clone(), job);
        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<SummaryRefreshJob>, RepositoryError> {
        let mut jobs = self.jobs.write().await;
        let candidate = jobs
            .values()
            .filter(|job| {
                matches!(
                    job.state,
                    RefreshJobState::Queued | RefreshJobState::RetryableFailed
                ) && job.available_at <= now
            })
            .min_by_key(|job| job.available_at)
            .map(|job| job.id.clone());

        let Some(id) = candidate else {
            return Ok(None);
        };
        let job = jobs.get_mut(&id.0).ok_or_else(|| {
            RepositoryError::Decode(format!("refresh job vanished during claim: {}", id.0))
        })?;
        job.state = RefreshJobState::Running;
        job.attempt_count += 1;
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn complete(&self, id: &RefreshJobId) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id.0) {
            job.state = RefreshJobState::Completed;
            job.last_error = None;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reschedule(
        &self,
        id: &RefreshJobId,
        available_at: DateTime<Utc>,
        error: String,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id.0) {
            job.state = RefreshJobState::RetryableFailed;
            job.available_at = available_at;
            job.last_error = Some(error);
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn park(&self, id: &RefreshJobId, error: String) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id.0) {
            job.state = RefreshJobState::FailedTerminal;
            job.last_error = Some(error);
            job.updated_at = Utc::now();
        }
        Ok(())
    }
}
