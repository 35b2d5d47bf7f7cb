//! Contract tests for the SQL repositories against an in-memory SQLite
//! database with migrations applied.

use chrono::{Duration, Utc};

use pulsey_core::domain::conversation::{
    Conversation, ConversationId, ConversationMetadata, ConversationStatus,
};
use pulsey_core::domain::escalation::{
    Escalation, EscalationId, EscalationStatus, EscalationType, Severity,
};
use pulsey_core::domain::instance::{
    AgentInstance, AgentInstanceConfig, AgentInstanceId, AgentSchedule, AudienceConfig,
    ChannelKind, GuardrailFlags, InstanceStatus, ScheduleCadence, TonePreset,
};
use pulsey_core::domain::message::{MessageSender, NewMessage};
use pulsey_core::domain::refresh::{RefreshJobId, RefreshJobState, SummaryRefreshJob};
use pulsey_core::domain::roster::{EmployeeId, OrgId, OrgMember};
use pulsey_core::domain::summary::{FeedbackSummary, FeedbackSummaryId, Sentiment};
use pulsey_core::domain::template::{AgentKind, AgentTemplate, AgentTemplateId};

use pulsey_core::domain::run::{AgentRun, AgentRunId, RunStatus, RunType};
use pulsey_db::repositories::{
    ConversationRepository, EscalationRepository, InstanceRepository, MessageRepository,
    RefreshJobRepository, RosterRepository, RunRepository, SqlConversationRepository,
    SqlEscalationRepository, SqlInstanceRepository, SqlMessageRepository, SqlRefreshJobRepository,
    SqlRosterRepository, SqlRunRepository, SqlSummaryRepository, SummaryRepository,
};
use pulsey_db::{connect_with_settings, migrations, DbPool};

async fn setup_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    pool
}

fn instance_config() -> AgentInstanceConfig {
    AgentInstanceConfig {
        tone: TonePreset::Warm,
        audience: AudienceConfig::CompanyWide,
        guardrails: GuardrailFlags::default(),
        channel: ChannelKind::InApp,
        stale_days: None,
    }
}

async fn seed_instance(pool: &DbPool, instance_id: &str) {
    let repo = SqlInstanceRepository::new(pool.clone());
    let template_id = AgentTemplateId(format!("tmpl-{instance_id}"));

    repo.create_template(AgentTemplate {
        id: template_id.clone(),
        kind: AgentKind::CheckIn,
        name: "Weekly check-in".to_string(),
        base_prompt: "You are a supportive HR check-in assistant.".to_string(),
        default_config: instance_config(),
        published_at: Some(Utc::now()),
        created_at: Utc::now(),
    })
    .await
    .expect("create template");

    repo.create_instance(AgentInstance {
        id: AgentInstanceId(instance_id.to_string()),
        org_id: OrgId("org-1".to_string()),
        template_id,
        name: "Engineering weekly".to_string(),
        config: instance_config(),
        status: InstanceStatus::Active,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    })
    .await
    .expect("create instance");
}

fn conversation(id: &str, instance_id: &str, participant: &str) -> Conversation {
    Conversation {
        id: ConversationId(id.to_string()),
        org_id: OrgId("org-1".to_string()),
        instance_id: AgentInstanceId(instance_id.to_string()),
        participant_id: EmployeeId(participant.to_string()),
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
async fn conversation_create_converges_on_one_row_per_participant() {
    let pool = setup_pool().await;
    seed_instance(&pool, "inst-1").await;
    let repo = SqlConversationRepository::new(pool.clone());

    let first = repo.create(conversation("conv-a", "inst-1", "emp-1")).await.expect("create");
    let second = repo.create(conversation("conv-b", "inst-1", "emp-1")).await.expect("recreate");

    assert_eq!(first.id, second.id);
    assert_eq!(first.id.0, "conv-a");
}

#[tokio::test]
async fn conversation_metadata_round_trips_nudge_count() {
    let pool = setup_pool().await;
    seed_instance(&pool, "inst-1").await;
    let repo = SqlConversationRepository::new(pool.clone());

    let mut stored = repo.create(conversation("conv-a", "inst-1", "emp-1")).await.expect("create");
    stored.metadata.nudge_count = 2;
    stored.status = ConversationStatus::Escalated;
    repo.update(&stored).await.expect("update");

    let found = repo
        .find_by_id(&stored.id)
        .await
        .expect("find")
        .expect("conversation exists");
    assert_eq!(found.metadata.nudge_count, 2);
    assert_eq!(found.status, ConversationStatus::Escalated);
}

#[tokio::test]
async fn messages_list_recent_is_ascending_tail() {
    let pool = setup_pool().await;
    seed_instance(&pool, "inst-1").await;
    let conversations = SqlConversationRepository::new(pool.clone());
    let stored =
        conversations.create(conversation("conv-a", "inst-1", "emp-1")).await.expect("create");

    let messages = SqlMessageRepository::new(pool.clone());
    for index in 0..4 {
        messages
            .append(NewMessage::text(
                stored.id.clone(),
                MessageSender::Employee,
                format!("message {index}"),
            ))
            .await
            .expect("append");
    }

    let recent = messages.list_recent(&stored.id, 2).await.expect("list recent");
    let contents: Vec<_> = recent.iter().map(|message| message.content.as_str()).collect();
    assert_eq!(contents, vec!["message 2", "message 3"]);
}

#[tokio::test]
async fn mark_read_flips_only_named_messages() {
    let pool = setup_pool().await;
    seed_instance(&pool, "inst-1").await;
    let conversations = SqlConversationRepository::new(pool.clone());
    let stored =
        conversations.create(conversation("conv-a", "inst-1", "emp-1")).await.expect("create");

    let messages = SqlMessageRepository::new(pool.clone());
    let first = messages
        .append(NewMessage::text(stored.id.clone(), MessageSender::Agent, "first"))
        .await
        .expect("append first");
    let _second = messages
        .append(NewMessage::text(stored.id.clone(), MessageSender::Agent, "second"))
        .await
        .expect("append second");

    messages.mark_read(&[first.id.clone()]).await.expect("mark read");

    let all = messages.list_recent(&stored.id, 10).await.expect("list");
    let read_flags: Vec<_> = all.iter().map(|message| message.is_read).collect();
    assert_eq!(read_flags, vec![true, false]);
}

#[tokio::test]
async fn escalations_are_unique_per_triggering_message() {
    let pool = setup_pool().await;
    seed_instance(&pool, "inst-1").await;
    let conversations = SqlConversationRepository::new(pool.clone());
    let stored =
        conversations.create(conversation("conv-a", "inst-1", "emp-1")).await.expect("create");
    let messages = SqlMessageRepository::new(pool.clone());
    let trigger = messages
        .append(NewMessage::text(stored.id.clone(), MessageSender::Employee, "trigger"))
        .await
        .expect("append");

    let escalations = SqlEscalationRepository::new(pool.clone());
    let escalation = Escalation {
        id: EscalationId("esc-a".to_string()),
        org_id: OrgId("org-1".to_string()),
        conversation_id: stored.id.clone(),
        message_id: trigger.id.clone(),
        escalation_type: EscalationType::Safety,
        severity: Severity::Critical,
        status: EscalationStatus::Open,
        description: "safety trigger".to_string(),
        created_at: Utc::now(),
    };

    let first = escalations.create(escalation.clone()).await.expect("create first");
    let second = escalations
        .create(Escalation { id: EscalationId("esc-b".to_string()), ..escalation })
        .await
        .expect("create duplicate");

    assert_eq!(first.id, second.id, "one escalation per triggering message");

    let open = escalations.list_open_for_org(&OrgId("org-1".to_string())).await.expect("open");
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn summaries_chain_and_project_by_org_window() {
    let pool = setup_pool().await;
    seed_instance(&pool, "inst-1").await;
    let conversations = SqlConversationRepository::new(pool.clone());
    let stored =
        conversations.create(conversation("conv-a", "inst-1", "emp-1")).await.expect("create");

    let summaries = SqlSummaryRepository::new(pool.clone());
    let base = Utc::now() - Duration::days(1);

    let first = FeedbackSummary {
        id: FeedbackSummaryId("sum-1".to_string()),
        conversation_id: stored.id.clone(),
        sentiment: Sentiment::Negative,
        score: -1.0,
        topics: vec!["workload".to_string()],
        action_items: vec![],
        key_quotes: vec![],
        summary_text: "Dana is expressing concerns about workload.".to_string(),
        delta_notes: None,
        previous_summary_id: None,
        first_message_id: None,
        last_message_id: None,
        message_count: 2,
        created_at: base,
    };
    summaries.append(first.clone()).await.expect("append first");

    let second = FeedbackSummary {
        id: FeedbackSummaryId("sum-2".to_string()),
        sentiment: Sentiment::Positive,
        score: 1.0,
        topics: vec!["manager".to_string()],
        delta_notes: Some("Sentiment has improved since the previous check-in.".to_string()),
        previous_summary_id: Some(first.id.clone()),
        created_at: base + Duration::hours(6),
        ..first.clone()
    };
    summaries.append(second.clone()).await.expect("append second");

    let latest = summaries
        .latest_for_conversation(&stored.id)
        .await
        .expect("latest")
        .expect("summary exists");
    assert_eq!(latest.id.0, "sum-2");
    assert_eq!(latest.previous_summary_id, Some(first.id.clone()));

    // The chain is walkable through the previous-summary pointer.
    let previous = summaries
        .find_by_id(latest.previous_summary_id.as_ref().expect("pointer"))
        .await
        .expect("find previous")
        .expect("previous exists");
    assert_eq!(previous.id, first.id);
    assert!(previous.previous_summary_id.is_none());

    let window = summaries
        .list_for_org_since(&OrgId("org-1".to_string()), base - Duration::hours(1))
        .await
        .expect("window");
    assert_eq!(window.len(), 2);
    assert_eq!(window[0].id.0, "sum-1");

    let narrow = summaries
        .list_for_org_since(&OrgId("org-1".to_string()), base + Duration::hours(1))
        .await
        .expect("narrow window");
    assert_eq!(narrow.len(), 1);
}

#[tokio::test]
async fn roster_resolves_each_audience_selector() {
    let pool = setup_pool().await;
    let roster = SqlRosterRepository::new(pool.clone());
    let org_id = OrgId("org-1".to_string());

    for (id, department, active) in [
        ("emp-1", "Engineering", true),
        ("emp-2", "Design", true),
        ("emp-3", "Engineering", false),
    ] {
        roster
            .upsert_member(OrgMember {
                id: EmployeeId(id.to_string()),
                org_id: org_id.clone(),
                name: id.to_string(),
                email: format!("{id}@example.com"),
                department: Some(department.to_string()),
                active,
            })
            .await
            .expect("upsert member");
    }

    let company = roster.list_audience(&org_id, &AudienceConfig::CompanyWide).await.expect("all");
    assert_eq!(company.len(), 2, "inactive members are excluded");

    let engineering = roster
        .list_audience(
            &org_id,
            &AudienceConfig::Departments { departments: vec!["Engineering".to_string()] },
        )
        .await
        .expect("by department");
    assert_eq!(engineering.len(), 1);
    assert_eq!(engineering[0].id.0, "emp-1");

    let explicit = roster
        .list_audience(
            &org_id,
            &AudienceConfig::Employees {
                employee_ids: vec![EmployeeId("emp-2".to_string())],
            },
        )
        .await
        .expect("explicit ids");
    assert_eq!(explicit.len(), 1);
    assert_eq!(explicit[0].id.0, "emp-2");
}

#[tokio::test]
async fn schedules_report_due_instances() {
    let pool = setup_pool().await;
    seed_instance(&pool, "inst-due").await;
    seed_instance(&pool, "inst-later").await;
    let repo = SqlInstanceRepository::new(pool.clone());
    let now = Utc::now();

    repo.create_schedule(AgentSchedule {
        instance_id: AgentInstanceId("inst-due".to_string()),
        cadence: ScheduleCadence::Weekly,
        next_run_at: Some(now - Duration::minutes(1)),
        last_run_at: None,
    })
    .await
    .expect("due schedule");
    repo.create_schedule(AgentSchedule {
        instance_id: AgentInstanceId("inst-later".to_string()),
        cadence: ScheduleCadence::Weekly,
        next_run_at: Some(now + Duration::days(1)),
        last_run_at: None,
    })
    .await
    .expect("future schedule");

    let due = repo.list_due_schedules(now).await.expect("due");
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].instance_id.0, "inst-due");

    let schedule = repo
        .find_schedule(&AgentInstanceId("inst-later".to_string()))
        .await
        .expect("find schedule")
        .expect("schedule exists");
    assert_eq!(schedule.cadence, ScheduleCadence::Weekly);
}

#[tokio::test]
async fn runs_round_trip_through_their_lifecycle() {
    let pool = setup_pool().await;
    seed_instance(&pool, "inst-1").await;
    let runs = SqlRunRepository::new(pool.clone());

    let mut run = AgentRun {
        id: AgentRunId("run-1".to_string()),
        instance_id: AgentInstanceId("inst-1".to_string()),
        run_type: RunType::Manual,
        status: RunStatus::Running,
        messages_sent: 0,
        conversations_touched: 0,
        error: None,
        started_at: Utc::now(),
        completed_at: None,
    };
    runs.create(run.clone()).await.expect("create run");

    run.transition_to(RunStatus::Completed).expect("running -> completed");
    run.messages_sent = 3;
    run.conversations_touched = 4;
    run.completed_at = Some(Utc::now());
    runs.update(&run).await.expect("update run");

    let found = runs
        .find_by_id(&run.id)
        .await
        .expect("find run")
        .expect("run exists");
    assert_eq!(found.status, RunStatus::Completed);
    assert_eq!(found.messages_sent, 3);
    assert_eq!(found.conversations_touched, 4);
    assert!(found.completed_at.is_some());
    assert!(found.error.is_none());
}

#[tokio::test]
async fn refresh_queue_claims_retries_and_parks() {
    let pool = setup_pool().await;
    seed_instance(&pool, "inst-1").await;
    let conversations = SqlConversationRepository::new(pool.clone());
    let stored =
        conversations.create(conversation("conv-a", "inst-1", "emp-1")).await.expect("create");

    let queue = SqlRefreshJobRepository::new(pool.clone());
    let now = Utc::now();
    queue
        .enqueue(SummaryRefreshJob {
            id: RefreshJobId("job-1".to_string()),
            conversation_id: stored.id.clone(),
            state: RefreshJobState::Queued,
            attempt_count: 0,
            max_attempts: 3,
            available_at: now,
            last_error: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("enqueue");

    let claimed = queue.claim_due(now).await.expect("claim").expect("job due");
    assert_eq!(claimed.state, RefreshJobState::Running);
    assert_eq!(claimed.attempt_count, 1);
    assert!(queue.claim_due(now).await.expect("claim again").is_none());

    queue
        .reschedule(&claimed.id, now + Duration::seconds(30), "store timeout".to_string())
        .await
        .expect("reschedule");
    assert!(queue.claim_due(now).await.expect("not yet due").is_none());

    let retried = queue
        .claim_due(now + Duration::minutes(1))
        .await
        .expect("claim retry")
        .expect("retry due");
    assert_eq!(retried.attempt_count, 2);

    queue.park(&retried.id, "store down".to_string()).await.expect("park");
    assert!(queue.claim_due(now + Duration::hours(1)).await.expect("parked").is_none());
}
