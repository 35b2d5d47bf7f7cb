//! Dashboard-facing JSON API.
//!
//! Endpoints:
//! - `POST /api/instances/{id}/trigger`      — manually trigger a batch run
//! - `POST /api/conversations/{id}/reply`    — submit an inbound employee reply
//! - `GET  /api/orgs/{id}/insights?days=N`   — read-side insight projection
//!
//! The insights endpoint is a projection over FeedbackSummary and Escalation
//! records; it computes nothing the engine has not already extracted.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use pulsey_agent::{AgentOrchestrator, EngineError, EngineStores};
use pulsey_core::domain::conversation::ConversationId;
use pulsey_core::domain::instance::AgentInstanceId;
use pulsey_core::domain::roster::{EmployeeId, OrgId};
use pulsey_core::domain::run::RunType;
use pulsey_core::domain::summary::ActionItem;

const DEFAULT_INSIGHTS_WINDOW_DAYS: u32 = 7;
const TOP_TOPIC_LIMIT: usize = 10;
const DELTA_HIGHLIGHT_LIMIT: usize = 10;

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<AgentOrchestrator>,
    pub stores: EngineStores,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/instances/{id}/trigger", post(trigger_run))
        .route("/api/conversations/{id}/reply", post(handle_reply))
        .route("/api/orgs/{id}/insights", get(org_insights))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct TriggerRequest {
    pub run_type: Option<String>,
    pub target_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub run_id: String,
    pub messages_sent: u32,
    pub conversations_touched: u32,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub content: String,
    pub sender_id: String,
}

#[derive(Debug, Serialize)]
pub struct ReplyResponse {
    pub response: Option<String>,
    pub escalated: bool,
}

#[derive(Debug, Deserialize)]
pub struct InsightsQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: u32,
}

#[derive(Debug, Serialize)]
pub struct OpenEscalation {
    pub id: String,
    pub conversation_id: String,
    pub escalation_type: String,
    pub severity: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct InsightsResponse {
    pub org_id: String,
    pub window_days: u32,
    pub conversations_analyzed: usize,
    pub sentiment_distribution: BTreeMap<String, u32>,
    pub top_topics: Vec<TopicCount>,
    pub action_items: Vec<ActionItem>,
    pub open_escalations: Vec<OpenEscalation>,
    pub delta_highlights: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: message.into() }))
}

fn engine_error(error: EngineError) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        EngineError::InstanceNotFound(_)
        | EngineError::InstanceNotActive(_)
        | EngineError::ConversationNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Persistence(_) | EngineError::Channel(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Domain(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiError { error: error.to_string() }))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn trigger_run(
    State(state): State<ApiState>,
    Path(instance_id): Path<String>,
    body: Option<Json<TriggerRequest>>,
) -> ApiResult<TriggerResponse> {
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let run_type = match request.run_type.as_deref() {
        None => RunType::Manual,
        Some(raw) => RunType::parse(raw)
            .ok_or_else(|| bad_request(format!("unsupported run_type `{raw}`")))?,
    };
    let target_ids = request
        .target_ids
        .map(|ids| ids.into_iter().map(EmployeeId).collect::<Vec<_>>());

    let outcome = state
        .orchestrator
        .trigger_run(&AgentInstanceId(instance_id.clone()), run_type, target_ids)
        .await
        .map_err(engine_error)?;

    info!(
        event_name = "api.trigger.completed",
        instance_id = %instance_id,
        run_id = %outcome.run_id.0,
        messages_sent = outcome.messages_sent,
        "manual trigger completed"
    );

    Ok(Json(TriggerResponse {
        run_id: outcome.run_id.0,
        messages_sent: outcome.messages_sent,
        conversations_touched: outcome.conversations_touched,
    }))
}

async fn handle_reply(
    State(state): State<ApiState>,
    Path(conversation_id): Path<String>,
    Json(request): Json<ReplyRequest>,
) -> ApiResult<ReplyResponse> {
    if request.content.trim().is_empty() {
        return Err(bad_request("reply content must not be empty"));
    }

    let outcome = state
        .orchestrator
        .handle_reply(
            &ConversationId(conversation_id),
            &request.content,
            &EmployeeId(request.sender_id),
        )
        .await
        .map_err(engine_error)?;

    Ok(Json(ReplyResponse { response: outcome.response, escalated: outcome.escalated }))
}

async fn org_insights(
    State(state): State<ApiState>,
    Path(org_id): Path<String>,
    Query(query): Query<InsightsQuery>,
) -> ApiResult<InsightsResponse> {
    let window_days = query.days.unwrap_or(DEFAULT_INSIGHTS_WINDOW_DAYS).max(1);
    let org_id = OrgId(org_id);
    let since = Utc::now() - Duration::days(i64::from(window_days));

    let summaries = state
        .stores
        .summaries
        .list_for_org_since(&org_id, since)
        .await
        .map_err(|e| engine_error(EngineError::Persistence(e)))?;

    // Ascending order means the last summary per conversation wins, so the
    // distribution reflects each conversation's latest observation.
    let mut latest_per_conversation = HashMap::new();
    let mut delta_highlights = Vec::new();
    for summary in &summaries {
        if let Some(delta) = &summary.delta_notes {
            if !delta.starts_with("No significant changes") {
                delta_highlights.push(delta.clone());
            }
        }
        latest_per_conversation.insert(summary.conversation_id.0.clone(), summary);
    }
    if delta_highlights.len() > DELTA_HIGHLIGHT_LIMIT {
        delta_highlights.drain(..delta_highlights.len() - DELTA_HIGHLIGHT_LIMIT);
    }

    let mut sentiment_distribution: BTreeMap<String, u32> = BTreeMap::new();
    let mut topic_counts: BTreeMap<String, u32> = BTreeMap::new();
    let mut action_items: Vec<ActionItem> = Vec::new();
    for summary in latest_per_conversation.values() {
        *sentiment_distribution.entry(summary.sentiment.as_str().to_string()).or_default() += 1;
        for topic in &summary.topics {
            *topic_counts.entry(topic.clone()).or_default() += 1;
        }
        action_items.extend(summary.action_items.iter().cloned());
    }

    let mut top_topics: Vec<TopicCount> = topic_counts
        .into_iter()
        .map(|(topic, count)| TopicCount { topic, count })
        .collect();
    top_topics.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.topic.cmp(&b.topic)));
    top_topics.truncate(TOP_TOPIC_LIMIT);

    let open_escalations = state
        .stores
        .escalations
        .list_open_for_org(&org_id)
        .await
        .map_err(|e| engine_error(EngineError::Persistence(e)))?
        .into_iter()
        .map(|escalation| OpenEscalation {
            id: escalation.id.0,
            conversation_id: escalation.conversation_id.0,
            escalation_type: escalation.escalation_type.as_str().to_string(),
            severity: escalation.severity.as_str().to_string(),
            created_at: escalation.created_at.to_rfc3339(),
        })
        .collect();

    Ok(Json(InsightsResponse {
        org_id: org_id.0,
        window_days,
        conversations_analyzed: latest_per_conversation.len(),
        sentiment_distribution,
        top_topics,
        action_items,
        open_escalations,
        delta_highlights,
    }))
}
