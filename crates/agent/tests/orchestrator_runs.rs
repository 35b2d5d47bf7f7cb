//! End-to-end orchestrator behavior over the in-memory stores: batch
//! fan-out with failure isolation, the message-generation policy, reply
//! handling with escalation, and the refresh queue.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use pulsey_agent::{
    AgentOrchestrator, EngineError, EngineStores, FixedVariantPicker, GeneratedReply,
    GenerationError, NoopTextGenerator, SummaryRefreshWorker, TextGenerator,
};
use pulsey_core::config::EngineConfig;
use pulsey_core::domain::conversation::ConversationStatus;
use pulsey_core::domain::escalation::EscalationType;
use pulsey_core::domain::instance::{
    AgentInstance, AgentInstanceConfig, AgentInstanceId, AudienceConfig, ChannelKind,
    GuardrailFlags, InstanceStatus, TonePreset,
};
use pulsey_core::domain::message::{Message, MessageId, MessageSender, NewMessage};
use pulsey_core::domain::roster::{EmployeeId, OrgId, OrgMember};
use pulsey_core::domain::run::{RunStatus, RunType};
use pulsey_core::domain::summary::Sentiment;
use pulsey_core::domain::template::{AgentKind, AgentTemplate, AgentTemplateId};
use pulsey_core::insight::classifier::{Classifier, KeywordClassifier};
use pulsey_core::domain::conversation::ConversationId;
use pulsey_db::repositories::{
    ConversationRepository, EscalationRepository, InMemoryConversationRepository,
    InMemoryEscalationRepository, InMemoryInstanceRepository, InMemoryMessageRepository,
    InMemoryRefreshJobRepository, InMemoryRosterRepository, InMemoryRunRepository,
    InMemorySummaryRepository, InstanceRepository, MessageRepository, RepositoryError,
    RosterRepository, RunRepository, SummaryRepository,
};

/// Fails any append whose content mentions the configured marker, to
/// exercise per-participant failure isolation.
struct FlakyMessageRepository {
    inner: Arc<InMemoryMessageRepository>,
    poison: &'static str,
}

#[async_trait]
impl MessageRepository for FlakyMessageRepository {
    async fn append(
        &self,
        message: NewMessage,
    ) -> Result<Message, RepositoryError> {
        if message.content.contains(self.poison) {
            return Err(RepositoryError::Decode("injected append failure".to_string()));
        }
        self.inner.append(message).await
    }

    async fn list_recent(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        self.inner.list_recent(conversation_id, limit).await
    }

    async fn mark_read(&self, message_ids: &[MessageId]) -> Result<(), RepositoryError> {
        self.inner.mark_read(message_ids).await
    }
}

/// Scripted generator that always returns the same reply.
struct ScriptedGenerator {
    reply: String,
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn is_configured(&self) -> bool {
        true
    }

    async fn generate_initial_message(
        &self,
        participant_name: &str,
        _agent_kind: AgentKind,
        _tone: TonePreset,
    ) -> Result<String, GenerationError> {
        Ok(format!("Hello {participant_name}, generated opening."))
    }

    async fn generate_agent_response(
        &self,
        _participant_name: &str,
        _agent_kind: AgentKind,
        _tone: TonePreset,
        _history: &str,
    ) -> Result<GeneratedReply, GenerationError> {
        Ok(GeneratedReply {
            content: self.reply.clone(),
            should_escalate: false,
            escalation_type: None,
        })
    }
}

struct Harness {
    stores: EngineStores,
    orchestrator: AgentOrchestrator,
    instance_id: AgentInstanceId,
    org_id: OrgId,
}

fn engine_config() -> EngineConfig {
    EngineConfig {
        stale_days: 7,
        nudge_limit: 2,
        context_message_limit: 20,
        refresh_max_attempts: 3,
        refresh_poll_secs: 1,
    }
}

fn stores_with_messages(messages: Arc<dyn MessageRepository>) -> EngineStores {
    let conversations = Arc::new(InMemoryConversationRepository::default());
    EngineStores {
        conversations: conversations.clone(),
        messages,
        runs: Arc::new(InMemoryRunRepository::default()),
        summaries: Arc::new(InMemorySummaryRepository::new(conversations)),
        escalations: Arc::new(InMemoryEscalationRepository::default()),
        instances: Arc::new(InMemoryInstanceRepository::default()),
        roster: Arc::new(InMemoryRosterRepository::default()),
        refresh_jobs: Arc::new(InMemoryRefreshJobRepository::default()),
    }
}

async fn seed(stores: &EngineStores, participants: &[&str]) -> (OrgId, AgentInstanceId) {
    let org_id = OrgId("org-1".to_string());
    let template_id = AgentTemplateId("tmpl-1".to_string());
    let instance_id = AgentInstanceId("inst-1".to_string());

    let config = AgentInstanceConfig {
        tone: TonePreset::Warm,
        audience: AudienceConfig::CompanyWide,
        guardrails: GuardrailFlags::default(),
        channel: ChannelKind::InApp,
        stale_days: None,
    };

    stores
        .instances
        .create_template(AgentTemplate {
            id: template_id.clone(),
            kind: AgentKind::CheckIn,
            name: "Weekly check-in".to_string(),
            base_prompt: "You are a supportive HR check-in assistant.".to_string(),
            default_config: config.clone(),
            published_at: Some(Utc::now()),
            created_at: Utc::now(),
        })
        .await
        .expect("create template");

    stores
        .instances
        .create_instance(AgentInstance {
            id: instance_id.clone(),
            org_id: org_id.clone(),
            template_id,
            name: "Engineering weekly".to_string(),
            config,
            status: InstanceStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await
        .expect("create instance");

    for name in participants {
        stores
            .roster
            .upsert_member(OrgMember {
                id: EmployeeId(format!("emp-{}", name.to_ascii_lowercase())),
                org_id: org_id.clone(),
                name: (*name).to_string(),
                email: format!("{}@example.com", name.to_ascii_lowercase()),
                department: Some("Engineering".to_string()),
                active: true,
            })
            .await
            .expect("upsert member");
    }

    (org_id, instance_id)
}

async fn harness(participants: &[&str]) -> Harness {
    harness_with(participants, Arc::new(InMemoryMessageRepository::default()), None).await
}

async fn harness_with(
    participants: &[&str],
    messages: Arc<dyn MessageRepository>,
    generator: Option<Arc<dyn TextGenerator>>,
) -> Harness {
    let stores = stores_with_messages(messages);
    let (org_id, instance_id) = seed(&stores, participants).await;

    let orchestrator = AgentOrchestrator::new(
        stores.clone(),
        generator.unwrap_or_else(|| Arc::new(NoopTextGenerator)),
        Arc::new(FixedVariantPicker(0)),
        engine_config(),
    );

    Harness { stores, orchestrator, instance_id, org_id }
}

#[tokio::test]
async fn first_run_opens_a_conversation_per_participant() {
    let harness = harness(&["Alex", "Robin"]).await;

    let outcome = harness
        .orchestrator
        .trigger_run(&harness.instance_id, RunType::Manual, None)
        .await
        .expect("trigger run");

    assert_eq!(outcome.messages_sent, 2);
    assert_eq!(outcome.conversations_touched, 2);

    let conversations = harness
        .stores
        .conversations
        .list_active_for_instance(&harness.instance_id)
        .await
        .expect("list conversations");
    assert_eq!(conversations.len(), 2);

    for conversation in &conversations {
        let history = harness
            .stores
            .messages
            .list_recent(&conversation.id, 10)
            .await
            .expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sender, MessageSender::Agent);
        assert!(history[0].content.contains("checking in"));
    }
}

#[tokio::test]
async fn failing_participant_does_not_abort_the_batch() {
    let inner = Arc::new(InMemoryMessageRepository::default());
    // The canned opening contains the participant's name, so poisoning on
    // "Robin" fails exactly the second participant's delivery.
    let flaky = Arc::new(FlakyMessageRepository { inner, poison: "Robin" });
    let harness = harness_with(&["Alex", "Robin", "Sam"], flaky, None).await;

    let outcome = harness
        .orchestrator
        .trigger_run(&harness.instance_id, RunType::Manual, None)
        .await
        .expect("run completes despite the failing participant");

    assert_eq!(outcome.messages_sent, 2);
    assert_eq!(outcome.conversations_touched, 2);

    let run = harness
        .stores
        .runs
        .find_by_id(&outcome.run_id)
        .await
        .expect("find run")
        .expect("run exists");
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.error.is_none());
}

#[tokio::test]
async fn missing_instance_aborts_before_a_run_starts() {
    let harness = harness(&["Alex"]).await;

    let result = harness
        .orchestrator
        .trigger_run(&AgentInstanceId("missing".to_string()), RunType::Manual, None)
        .await;

    assert!(matches!(result, Err(EngineError::InstanceNotFound(_))));
}

#[tokio::test]
async fn second_run_waits_for_a_reply() {
    let harness = harness(&["Alex"]).await;

    harness
        .orchestrator
        .trigger_run(&harness.instance_id, RunType::Manual, None)
        .await
        .expect("first run");
    let second = harness
        .orchestrator
        .trigger_run(&harness.instance_id, RunType::Manual, None)
        .await
        .expect("second run");

    assert_eq!(second.messages_sent, 0, "awaiting a reply; nothing to send");
    assert_eq!(second.conversations_touched, 1);
}

#[tokio::test]
async fn nudges_are_budgeted_to_two_per_conversation() {
    let harness = harness(&["Alex"]).await;

    harness
        .orchestrator
        .trigger_run(&harness.instance_id, RunType::Manual, None)
        .await
        .expect("opening run");

    let conversation = harness
        .stores
        .conversations
        .find_by_participant(&harness.instance_id, &EmployeeId("emp-alex".to_string()))
        .await
        .expect("find conversation")
        .expect("conversation exists");

    let age_conversation = |days: i64| {
        let conversations = harness.stores.conversations.clone();
        let id = conversation.id.clone();
        async move {
            let mut stale = conversations
                .find_by_id(&id)
                .await
                .expect("find")
                .expect("exists");
            stale.last_message_at = Some(Utc::now() - Duration::days(days));
            conversations.update(&stale).await.expect("age conversation");
        }
    };

    for expected_nudges in 1..=2u32 {
        age_conversation(8).await;
        let outcome = harness
            .orchestrator
            .trigger_run(&harness.instance_id, RunType::Nudge, None)
            .await
            .expect("nudge run");
        assert_eq!(outcome.messages_sent, 1, "nudge {expected_nudges} should send");

        let refreshed = harness
            .stores
            .conversations
            .find_by_id(&conversation.id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(refreshed.metadata.nudge_count, expected_nudges);
    }

    // Budget exhausted: a third nudge pass skips the conversation entirely.
    age_conversation(8).await;
    let third = harness
        .orchestrator
        .trigger_run(&harness.instance_id, RunType::Nudge, None)
        .await
        .expect("third nudge run");
    assert_eq!(third.messages_sent, 0);
    assert_eq!(third.conversations_touched, 0);
}

#[tokio::test]
async fn explicit_target_ids_limit_the_audience() {
    let harness = harness(&["Alex", "Robin"]).await;

    let outcome = harness
        .orchestrator
        .trigger_run(
            &harness.instance_id,
            RunType::Manual,
            Some(vec![
                EmployeeId("emp-alex".to_string()),
                EmployeeId("emp-ghost".to_string()),
            ]),
        )
        .await
        .expect("targeted run");

    assert_eq!(outcome.messages_sent, 1, "unknown targets are skipped");
    assert_eq!(outcome.conversations_touched, 1);
}

#[tokio::test]
async fn reply_gets_a_deterministic_fallback_response() {
    let harness = harness(&["Alex"]).await;
    harness
        .orchestrator
        .trigger_run(&harness.instance_id, RunType::Manual, None)
        .await
        .expect("opening run");

    let conversation = harness
        .stores
        .conversations
        .find_by_participant(&harness.instance_id, &EmployeeId("emp-alex".to_string()))
        .await
        .expect("find conversation")
        .expect("conversation exists");

    let outcome = harness
        .orchestrator
        .handle_reply(
            &conversation.id,
            "My workload has been overwhelming lately",
            &EmployeeId("emp-alex".to_string()),
        )
        .await
        .expect("handle reply");

    assert!(!outcome.escalated);
    let response = outcome.response.expect("reply content");
    assert!(response.contains("workload"));

    let history = harness
        .stores
        .messages
        .list_recent(&conversation.id, 10)
        .await
        .expect("history");
    assert_eq!(history.len(), 3, "opening, inbound, and reply");
    assert_eq!(history[1].sender, MessageSender::Employee);
    assert_eq!(history[2].sender, MessageSender::Agent);
}

#[tokio::test]
async fn safety_reply_escalates_and_acknowledges() {
    let harness = harness(&["Alex"]).await;
    harness
        .orchestrator
        .trigger_run(&harness.instance_id, RunType::Manual, None)
        .await
        .expect("opening run");

    let conversation = harness
        .stores
        .conversations
        .find_by_participant(&harness.instance_id, &EmployeeId("emp-alex".to_string()))
        .await
        .expect("find conversation")
        .expect("conversation exists");

    let outcome = harness
        .orchestrator
        .handle_reply(
            &conversation.id,
            "I don't want to live anymore",
            &EmployeeId("emp-alex".to_string()),
        )
        .await
        .expect("handle reply");

    assert!(outcome.escalated);
    let acknowledgment = outcome.response.expect("acknowledgment");
    assert!(acknowledgment.contains("988"), "safety ack references crisis resources");
    assert!(acknowledgment.contains("Alex"));

    let escalations = harness
        .stores
        .escalations
        .list_open_for_org(&harness.org_id)
        .await
        .expect("open escalations");
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].escalation_type, EscalationType::Safety);

    let escalated = harness
        .stores
        .conversations
        .find_by_id(&conversation.id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(escalated.status, ConversationStatus::Escalated);
}

#[tokio::test]
async fn blocked_generated_reply_returns_no_response() {
    let generator: Arc<dyn TextGenerator> = Arc::new(ScriptedGenerator {
        reply: "Before we continue, what's your SSN?".to_string(),
    });
    let harness = harness_with(
        &["Alex"],
        Arc::new(InMemoryMessageRepository::default()),
        Some(generator),
    )
    .await;
    harness
        .orchestrator
        .trigger_run(&harness.instance_id, RunType::Manual, None)
        .await
        .expect("opening run");

    let conversation = harness
        .stores
        .conversations
        .find_by_participant(&harness.instance_id, &EmployeeId("emp-alex".to_string()))
        .await
        .expect("find conversation")
        .expect("conversation exists");

    let outcome = harness
        .orchestrator
        .handle_reply(&conversation.id, "All fine here", &EmployeeId("emp-alex".to_string()))
        .await
        .expect("handle reply");

    assert!(!outcome.escalated);
    assert!(outcome.response.is_none(), "a policy-blocked reply is silently dropped");

    let history = harness
        .stores
        .messages
        .list_recent(&conversation.id, 10)
        .await
        .expect("history");
    assert_eq!(history.len(), 2, "the blocked draft was never delivered");
}

#[tokio::test]
async fn replies_enqueue_refreshes_and_the_worker_builds_the_summary_chain() {
    let harness = harness(&["Alex"]).await;
    harness
        .orchestrator
        .trigger_run(&harness.instance_id, RunType::Manual, None)
        .await
        .expect("opening run");

    let conversation = harness
        .stores
        .conversations
        .find_by_participant(&harness.instance_id, &EmployeeId("emp-alex".to_string()))
        .await
        .expect("find conversation")
        .expect("conversation exists");
    let employee = EmployeeId("emp-alex".to_string());

    let classifier: Arc<dyn Classifier> = Arc::new(KeywordClassifier::new());
    let worker = SummaryRefreshWorker::new(
        harness.stores.clone(),
        classifier,
        std::time::Duration::from_millis(10),
    );

    harness
        .orchestrator
        .handle_reply(
            &conversation.id,
            "I'm overwhelmed with my workload this week, deadlines keep piling up",
            &employee,
        )
        .await
        .expect("first reply");
    assert!(worker.tick().await.expect("first tick"), "one job should be claimable");

    let first_summary = harness
        .stores
        .summaries
        .latest_for_conversation(&conversation.id)
        .await
        .expect("latest")
        .expect("summary written");
    assert_eq!(first_summary.sentiment, Sentiment::Negative);
    assert!(first_summary.topics.contains(&"workload".to_string()));
    assert!(first_summary.previous_summary_id.is_none());
    assert!(first_summary.delta_notes.is_none());

    harness
        .orchestrator
        .handle_reply(
            &conversation.id,
            "Actually feeling grateful and motivated, my manager helped me reprioritize, \
             things are improving and much better now",
            &employee,
        )
        .await
        .expect("second reply");
    assert!(worker.tick().await.expect("second tick"));

    let second_summary = harness
        .stores
        .summaries
        .latest_for_conversation(&conversation.id)
        .await
        .expect("latest")
        .expect("second summary written");
    assert_eq!(second_summary.previous_summary_id, Some(first_summary.id.clone()));
    let delta = second_summary.delta_notes.expect("delta notes");
    assert!(delta.contains("improved"));
    assert!(delta.contains("manager"));

    assert!(!worker.tick().await.expect("drained"), "queue should be empty");
}

#[tokio::test]
async fn reply_to_unknown_conversation_is_not_found() {
    let harness = harness(&["Alex"]).await;

    let result = harness
        .orchestrator
        .handle_reply(
            &ConversationId("missing".to_string()),
            "hello",
            &EmployeeId("emp-alex".to_string()),
        )
        .await;

    assert!(matches!(result, Err(EngineError::ConversationNotFound(_))));
}
