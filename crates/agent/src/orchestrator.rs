//! The coordinator: batch fan-out with per-participant failure isolation,
//! the message-generation policy, and inbound reply handling with the
//! escalation short-circuit.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pulsey_core::config::EngineConfig;
use pulsey_core::domain::conversation::{Conversation, ConversationId, ConversationStatus};
use pulsey_core::domain::escalation::{
    Escalation, EscalationId, EscalationStatus, EscalationType, Severity,
};
use pulsey_core::domain::instance::{AgentInstance, AgentInstanceId};
use pulsey_core::domain::message::{Message, MessageSender, NewMessage};
use pulsey_core::domain::roster::{EmployeeId, OrgMember};
use pulsey_core::domain::run::{AgentRun, AgentRunId, RunStatus, RunType};
use pulsey_core::domain::template::AgentKind;
use pulsey_core::policy::guard::PolicyGuard;
use pulsey_db::repositories::{
    ConversationRepository, EscalationRepository, InstanceRepository, MessageRepository,
    RefreshJobRepository, RosterRepository, RunRepository, SummaryRepository,
};
use pulsey_inbox::channel_for;

use crate::generate::{
    fallback_reply, follow_up_message, nudge_message, opening_message, GeneratedReply,
    TextGenerator, VariantPicker,
};
use crate::memory::MemoryStore;
use crate::refresh::enqueue_refresh;
use crate::EngineError;

/// Every store the engine touches, behind trait objects so tests can swap
/// in fakes.
#[derive(Clone)]
pub struct EngineStores {
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub runs: Arc<dyn RunRepository>,
    pub summaries: Arc<dyn SummaryRepository>,
    pub escalations: Arc<dyn EscalationRepository>,
    pub instances: Arc<dyn InstanceRepository>,
    pub roster: Arc<dyn RosterRepository>,
    pub refresh_jobs: Arc<dyn RefreshJobRepository>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: AgentRunId,
    pub messages_sent: u32,
    pub conversations_touched: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyOutcome {
    pub response: Option<String>,
    pub escalated: bool,
}

enum ContactOutcome {
    Sent,
    Held,
    Skipped,
}

/// Serializes mutations of a single conversation's counters and metadata
/// across concurrent replies and nudge passes.
#[derive(Default)]
struct ConversationLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationLocks {
    async fn acquire(&self, conversation_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(conversation_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Explicitly constructed service object; created once at process start and
/// handed to request handlers by reference.
pub struct AgentOrchestrator {
    stores: EngineStores,
    memory: MemoryStore,
    guard: PolicyGuard,
    generator: Arc<dyn TextGenerator>,
    picker: Arc<dyn VariantPicker>,
    engine: EngineConfig,
    locks: ConversationLocks,
}

impl AgentOrchestrator {
    pub fn new(
        stores: EngineStores,
        generator: Arc<dyn TextGenerator>,
        picker: Arc<dyn VariantPicker>,
        engine: EngineConfig,
    ) -> Self {
        let memory = MemoryStore::new(
            stores.conversations.clone(),
            stores.messages.clone(),
            stores.summaries.clone(),
            stores.roster.clone(),
        );

        Self {
            stores,
            memory,
            guard: PolicyGuard::new(),
            generator,
            picker,
            engine,
            locks: ConversationLocks::default(),
        }
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Runs one batch over the instance's audience. Per-participant failures
    /// are logged and isolated; only a failure in the run's own control flow
    /// marks the run failed and propagates.
    pub async fn trigger_run(
        &self,
        instance_id: &AgentInstanceId,
        run_type: RunType,
        target_ids: Option<Vec<EmployeeId>>,
    ) -> Result<RunOutcome, EngineError> {
        let instance = self
            .stores
            .instances
            .find_instance(instance_id)
            .await?
            .ok_or_else(|| EngineError::InstanceNotFound(instance_id.0.clone()))?;
        if instance.status != pulsey_core::domain::instance::InstanceStatus::Active {
            return Err(EngineError::InstanceNotActive(instance_id.0.clone()));
        }

        let agent_kind = match self.stores.instances.find_template(&instance.template_id).await? {
            Some(template) => template.kind,
            None => {
                warn!(
                    event_name = "agent.run.template_missing",
                    instance_id = %instance.id.0,
                    template_id = %instance.template_id.0,
                    "template not found; defaulting to check-in phrasing"
                );
                AgentKind::CheckIn
            }
        };

        let mut run = AgentRun {
            id: AgentRunId(format!("run-{}", Uuid::new_v4())),
            instance_id: instance.id.clone(),
            run_type,
            status: RunStatus::Running,
            messages_sent: 0,
            conversations_touched: 0,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.stores.runs.create(run.clone()).await?;

        info!(
            event_name = "agent.run.started",
            run_id = %run.id.0,
            instance_id = %instance.id.0,
            run_type = run_type.as_str(),
            "agent run started"
        );

        match self.run_batch(&instance, agent_kind, run_type, target_ids, &mut run).await {
            Ok(()) => {
                run.transition_to(RunStatus::Completed)?;
                run.completed_at = Some(Utc::now());
                self.stores.runs.update(&run).await?;

                info!(
                    event_name = "agent.run.completed",
                    run_id = %run.id.0,
                    instance_id = %instance.id.0,
                    messages_sent = run.messages_sent,
                    conversations_touched = run.conversations_touched,
                    "agent run completed"
                );

                Ok(RunOutcome {
                    run_id: run.id,
                    messages_sent: run.messages_sent,
                    conversations_touched: run.conversations_touched,
                })
            }
            Err(batch_error) => {
                if let Err(transition_error) = run.transition_to(RunStatus::Failed) {
                    error!(
                        event_name = "agent.run.finalize_failed",
                        run_id = %run.id.0,
                        error = %transition_error,
                        "run was not in a failable state"
                    );
                }
                run.error = Some(batch_error.to_string());
                run.completed_at = Some(Utc::now());
                if let Err(update_error) = self.stores.runs.update(&run).await {
                    error!(
                        event_name = "agent.run.finalize_failed",
                        run_id = %run.id.0,
                        error = %update_error,
                        "could not record run failure"
                    );
                }

                error!(
                    event_name = "agent.run.failed",
                    run_id = %run.id.0,
                    instance_id = %instance.id.0,
                    error = %batch_error,
                    "agent run failed"
                );

                Err(batch_error)
            }
        }
    }

    async fn run_batch(
        &self,
        instance: &AgentInstance,
        agent_kind: AgentKind,
        run_type: RunType,
        target_ids: Option<Vec<EmployeeId>>,
        run: &mut AgentRun,
    ) -> Result<(), EngineError> {
        let audience = match target_ids {
            Some(ids) => {
                let mut members = Vec::with_capacity(ids.len());
                for id in ids {
                    match self.stores.roster.find_member(&instance.org_id, &id).await? {
                        Some(member) => members.push(member),
                        None => warn!(
                            event_name = "agent.run.unknown_target",
                            run_id = %run.id.0,
                            participant_id = %id.0,
                            "explicit target is not on the roster; skipping"
                        ),
                    }
                }
                members
            }
            None => {
                self.memory.target_employees(&instance.org_id, &instance.config.audience).await?
            }
        };

        for member in audience {
            match self.contact_participant(instance, agent_kind, run_type, run, &member).await {
                Ok(ContactOutcome::Sent) => {
                    run.messages_sent += 1;
                    run.conversations_touched += 1;
                }
                Ok(ContactOutcome::Held) => {
                    run.conversations_touched += 1;
                }
                Ok(ContactOutcome::Skipped) => {}
                Err(participant_error) => {
                    warn!(
                        event_name = "agent.run.participant_failed",
                        run_id = %run.id.0,
                        instance_id = %instance.id.0,
                        participant_id = %member.id.0,
                        error = %participant_error,
                        "participant failed; continuing batch"
                    );
                }
            }
        }

        Ok(())
    }

    async fn contact_participant(
        &self,
        instance: &AgentInstance,
        agent_kind: AgentKind,
        run_type: RunType,
        run: &AgentRun,
        member: &OrgMember,
    ) -> Result<ContactOutcome, EngineError> {
        let conversation = self
            .memory
            .get_or_create_conversation(&instance.org_id, &instance.id, &member.id)
            .await?;
        let _guard = self.locks.acquire(&conversation.id.0).await;

        let stale_days = instance.config.stale_days.unwrap_or(self.engine.stale_days);
        let staleness = self.memory.check_staleness(&conversation.id, stale_days).await?;
        if staleness.is_stale && staleness.nudge_count >= self.engine.nudge_limit {
            debug!(
                event_name = "agent.run.nudge_budget_exhausted",
                run_id = %run.id.0,
                conversation_id = %conversation.id.0,
                nudge_count = staleness.nudge_count,
                "stale conversation has used its nudge budget; skipping"
            );
            return Ok(ContactOutcome::Skipped);
        }

        let history = self.stores.messages.list_recent(&conversation.id, 1).await?;
        let Some(draft) = self
            .draft_outbound(instance, agent_kind, run_type, member, &conversation, &history)
            .await?
        else {
            return Ok(ContactOutcome::Held);
        };

        let check = self.guard.check_agent_message(&draft);
        for violation in &check.violations {
            debug!(
                event_name = "agent.run.draft_violation",
                run_id = %run.id.0,
                conversation_id = %conversation.id.0,
                kind = violation.kind.as_str(),
                severity = violation.severity.as_str(),
                "outbound draft flagged"
            );
        }
        if !check.allowed {
            warn!(
                event_name = "agent.run.draft_blocked",
                run_id = %run.id.0,
                conversation_id = %conversation.id.0,
                "outbound draft blocked by policy; abandoning"
            );
            return Ok(ContactOutcome::Held);
        }

        let channel = channel_for(
            instance.config.channel,
            self.stores.conversations.clone(),
            self.stores.messages.clone(),
        );
        channel
            .send_message(
                &conversation.id,
                &draft,
                serde_json::json!({
                    "origin": "agent_run",
                    "run_id": run.id.0,
                    "run_type": run_type.as_str(),
                }),
            )
            .await?;

        if run_type.is_nudge() {
            self.memory.increment_nudge_count(&conversation.id).await?;
        }

        Ok(ContactOutcome::Sent)
    }

    /// The message-generation policy, in order: opening for an empty
    /// conversation; nothing while awaiting a reply (outside nudge passes);
    /// a gentle reminder on nudge passes; else a contextual follow-up.
    async fn draft_outbound(
        &self,
        instance: &AgentInstance,
        agent_kind: AgentKind,
        run_type: RunType,
        member: &OrgMember,
        conversation: &Conversation,
        history: &[Message],
    ) -> Result<Option<String>, EngineError> {
        let last_message = history.last();

        if last_message.is_none() {
            if self.generator.is_configured() {
                match self
                    .generator
                    .generate_initial_message(&member.name, agent_kind, instance.config.tone)
                    .await
                {
                    Ok(content) => return Ok(Some(content)),
                    Err(generation_error) => warn!(
                        event_name = "agent.run.generator_fallback",
                        conversation_id = %conversation.id.0,
                        error = %generation_error,
                        "generator unavailable for opening; using canned variant"
                    ),
                }
            }
            return Ok(Some(opening_message(agent_kind, &member.name, self.picker.as_ref())));
        }

        let awaiting_reply =
            last_message.map(|message| message.sender == MessageSender::Agent).unwrap_or(false);
        if awaiting_reply && !run_type.is_nudge() {
            return Ok(None);
        }

        if run_type.is_nudge() {
            return Ok(Some(nudge_message(self.picker.as_ref())));
        }

        let latest_summary =
            self.stores.summaries.latest_for_conversation(&conversation.id).await?;
        let topics = latest_summary.map(|summary| summary.topics).unwrap_or_default();
        Ok(Some(follow_up_message(&topics, self.picker.as_ref())))
    }

    /// Handles one inbound employee message: persist, screen, short-circuit
    /// to escalation when required, otherwise reply and queue a summary
    /// refresh that never blocks or fails the reply.
    pub async fn handle_reply(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        sender_id: &EmployeeId,
    ) -> Result<ReplyOutcome, EngineError> {
        let _guard = self.locks.acquire(&conversation_id.0).await;

        let mut conversation = self
            .stores
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| EngineError::ConversationNotFound(conversation_id.0.clone()))?;
        if conversation.participant_id != *sender_id {
            warn!(
                event_name = "agent.reply.sender_mismatch",
                conversation_id = %conversation_id.0,
                sender_id = %sender_id.0,
                participant_id = %conversation.participant_id.0,
                "reply sender does not match the conversation participant"
            );
        }

        let instance = self
            .stores
            .instances
            .find_instance(&conversation.instance_id)
            .await?
            .ok_or_else(|| EngineError::InstanceNotFound(conversation.instance_id.0.clone()))?;
        let agent_kind = self
            .stores
            .instances
            .find_template(&instance.template_id)
            .await?
            .map(|template| template.kind)
            .unwrap_or(AgentKind::CheckIn);

        let inbound = self
            .stores
            .messages
            .append(NewMessage::text(conversation_id.clone(), MessageSender::Employee, content))
            .await?;
        conversation.record_message(MessageSender::Employee, inbound.created_at);
        self.stores.conversations.update(&conversation).await?;

        let check = self.guard.check_employee_message(content);
        if check.requires_escalation {
            let escalation_type = check.escalation_type.unwrap_or(EscalationType::Urgent);
            return self
                .escalate(&instance, &mut conversation, &inbound, escalation_type, content)
                .await;
        }

        let reply = self.draft_reply(&instance, agent_kind, conversation_id, content).await?;
        if reply.should_escalate {
            let escalation_type = reply.escalation_type.unwrap_or(EscalationType::Urgent);
            return self
                .escalate(&instance, &mut conversation, &inbound, escalation_type, content)
                .await;
        }

        let reply_check = self.guard.check_agent_message(&reply.content);
        for violation in &reply_check.violations {
            debug!(
                event_name = "agent.reply.draft_violation",
                conversation_id = %conversation_id.0,
                kind = violation.kind.as_str(),
                severity = violation.severity.as_str(),
                "reply draft flagged"
            );
        }
        if !reply_check.allowed {
            warn!(
                event_name = "agent.reply.blocked",
                conversation_id = %conversation_id.0,
                "generated reply blocked by policy; returning no response"
            );
            self.queue_refresh(conversation_id).await;
            return Ok(ReplyOutcome { response: None, escalated: false });
        }

        let channel = channel_for(
            instance.config.channel,
            self.stores.conversations.clone(),
            self.stores.messages.clone(),
        );
        channel
            .send_message(
                conversation_id,
                &reply.content,
                serde_json::json!({ "origin": "reply", "in_reply_to": inbound.id.0 }),
            )
            .await?;

        self.queue_refresh(conversation_id).await;

        Ok(ReplyOutcome { response: Some(reply.content), escalated: false })
    }

    async fn draft_reply(
        &self,
        instance: &AgentInstance,
        agent_kind: AgentKind,
        conversation_id: &ConversationId,
        inbound: &str,
    ) -> Result<GeneratedReply, EngineError> {
        if self.generator.is_configured() {
            let context = self
                .memory
                .conversation_context(conversation_id, self.engine.context_message_limit)
                .await?;
            if let Some(context) = context {
                let history = MemoryStore::format_for_prompt(
                    &context.messages,
                    context.latest_summary.as_ref(),
                    &context.participant_name,
                );
                match self
                    .generator
                    .generate_agent_response(
                        &context.participant_name,
                        agent_kind,
                        instance.config.tone,
                        &history,
                    )
                    .await
                {
                    Ok(reply) => return Ok(reply),
                    Err(generation_error) => warn!(
                        event_name = "agent.reply.generator_fallback",
                        conversation_id = %conversation_id.0,
                        error = %generation_error,
                        "generator unavailable for reply; using keyword fallback"
                    ),
                }
            }
        }

        Ok(fallback_reply(inbound))
    }

    async fn escalate(
        &self,
        instance: &AgentInstance,
        conversation: &mut Conversation,
        trigger: &Message,
        escalation_type: EscalationType,
        content: &str,
    ) -> Result<ReplyOutcome, EngineError> {
        let severity = match escalation_type {
            EscalationType::Safety => Severity::Critical,
            _ => Severity::High,
        };
        let redacted_excerpt: String = self.guard.redact(content).chars().take(160).collect();

        let escalation = self
            .stores
            .escalations
            .create(Escalation {
                id: EscalationId(format!("esc-{}", Uuid::new_v4())),
                org_id: conversation.org_id.clone(),
                conversation_id: conversation.id.clone(),
                message_id: trigger.id.clone(),
                escalation_type,
                severity,
                status: EscalationStatus::Open,
                description: format!(
                    "{} content detected in employee message: \"{redacted_excerpt}\"",
                    escalation_type.as_str()
                ),
                created_at: Utc::now(),
            })
            .await?;

        if conversation.can_transition_to(ConversationStatus::Escalated) {
            conversation.transition_to(ConversationStatus::Escalated)?;
            self.stores.conversations.update(conversation).await?;
        }

        let participant_name = self
            .stores
            .roster
            .find_member(&conversation.org_id, &conversation.participant_id)
            .await?
            .map(|member| member.name)
            .unwrap_or_else(|| conversation.participant_id.0.clone());
        let acknowledgment =
            self.guard.escalation_acknowledgment(escalation_type, &participant_name);

        // The acknowledgment is a fixed, pre-vetted string; it is not run
        // through the agent-message screen so a crisis response cannot be
        // dropped.
        let channel = channel_for(
            instance.config.channel,
            self.stores.conversations.clone(),
            self.stores.messages.clone(),
        );
        channel
            .send_message(
                &conversation.id,
                &acknowledgment,
                serde_json::json!({ "origin": "escalation_ack", "escalation_id": escalation.id.0 }),
            )
            .await?;

        info!(
            event_name = "agent.reply.escalated",
            conversation_id = %conversation.id.0,
            escalation_id = %escalation.id.0,
            escalation_type = escalation_type.as_str(),
            severity = severity.as_str(),
            "conversation escalated to a human"
        );

        Ok(ReplyOutcome { response: Some(acknowledgment), escalated: true })
    }

    /// Best-effort enqueue of the at-least-once refresh job; failure is
    /// logged and never surfaces into the reply path.
    async fn queue_refresh(&self, conversation_id: &ConversationId) {
        if let Err(enqueue_error) = enqueue_refresh(
            self.stores.refresh_jobs.as_ref(),
            conversation_id,
            self.engine.refresh_max_attempts,
        )
        .await
        {
            warn!(
                event_name = "agent.reply.refresh_enqueue_failed",
                conversation_id = %conversation_id.0,
                error = %enqueue_error,
                "could not enqueue summary refresh"
            );
        }
    }

    /// Triggers a scheduled run for every due schedule, advancing each
    /// schedule's bookkeeping. Individual instance failures do not stop the
    /// sweep.
    pub async fn run_due_schedules(&self) -> Result<u32, EngineError> {
        let now = Utc::now();
        let due = self.stores.instances.list_due_schedules(now).await?;
        let mut triggered = 0;

        for mut schedule in due {
            match self.trigger_run(&schedule.instance_id, RunType::Scheduled, None).await {
                Ok(outcome) => {
                    triggered += 1;
                    debug!(
                        event_name = "agent.schedule.run_triggered",
                        instance_id = %schedule.instance_id.0,
                        run_id = %outcome.run_id.0,
                        messages_sent = outcome.messages_sent,
                        "scheduled run triggered"
                    );
                }
                Err(schedule_error) => warn!(
                    event_name = "agent.schedule.run_failed",
                    instance_id = %schedule.instance_id.0,
                    error = %schedule_error,
                    "scheduled run failed; schedule advances anyway"
                ),
            }

            schedule.last_run_at = Some(now);
            schedule.next_run_at = Some(schedule.cadence.next_from(now));
            self.stores.instances.update_schedule(&schedule).await?;
        }

        Ok(triggered)
    }
}
