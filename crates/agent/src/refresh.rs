//! At-least-once summary refresh.
//!
//! Replies enqueue a job row instead of analyzing inline; this worker claims
//! due jobs, runs the extractor against the latest prior summary, and
//! appends the new summary. Transient failures reschedule with backoff; a
//! job that exhausts its attempts parks as failed-terminal for operator
//! attention.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pulsey_core::domain::conversation::ConversationId;
use pulsey_core::domain::refresh::{RefreshJobId, RefreshJobState, SummaryRefreshJob};
use pulsey_core::insight::classifier::Classifier;
use pulsey_core::insight::extractor::InsightExtractor;
use pulsey_db::repositories::{RefreshJobRepository, RepositoryError};

use crate::memory::MemoryStore;
use crate::orchestrator::EngineStores;
use crate::EngineError;

/// How many trailing messages one refresh analyzes.
const REFRESH_MESSAGE_LIMIT: u32 = 50;

/// A refresh is skipped until the conversation has at least this many
/// messages.
const MIN_MESSAGES_FOR_SUMMARY: usize = 2;

/// Creates a queued job, due immediately.
pub async fn enqueue_refresh(
    jobs: &dyn RefreshJobRepository,
    conversation_id: &ConversationId,
    max_attempts: u32,
) -> Result<(), RepositoryError> {
    let now = Utc::now();
    jobs.enqueue(SummaryRefreshJob {
        id: RefreshJobId(format!("job-{}", Uuid::new_v4())),
        conversation_id: conversation_id.clone(),
        state: RefreshJobState::Queued,
        attempt_count: 0,
        max_attempts,
        available_at: now,
        last_error: None,
        created_at: now,
        updated_at: now,
    })
    .await
}

pub struct SummaryRefreshWorker {
    stores: EngineStores,
    memory: MemoryStore,
    extractor: InsightExtractor<Arc<dyn Classifier>>,
    poll_interval: std::time::Duration,
}

impl SummaryRefreshWorker {
    pub fn new(
        stores: EngineStores,
        classifier: Arc<dyn Classifier>,
        poll_interval: std::time::Duration,
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
            extractor: InsightExtractor::with_classifier(classifier),
            poll_interval,
        }
    }

    /// Polls the queue forever. Spawn this on its own task; abort the task
    /// to stop the worker.
    pub async fn run(&self) {
        loop {
            match self.tick().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.poll_interval).await,
                Err(tick_error) => {
                    warn!(
                        event_name = "refresh.worker.tick_failed",
                        error = %tick_error,
                        "refresh tick failed; backing off"
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Claims and processes at most one due job. Returns whether a job was
    /// claimed, so callers can drain without sleeping.
    pub async fn tick(&self) -> Result<bool, EngineError> {
        let Some(job) = self.stores.refresh_jobs.claim_due(Utc::now()).await? else {
            return Ok(false);
        };

        match self.refresh(&job).await {
            Ok(()) => {
                self.stores.refresh_jobs.complete(&job.id).await?;
                Ok(true)
            }
            Err(refresh_error) => {
                if job.attempts_exhausted() {
                    warn!(
                        event_name = "refresh.job.parked",
                        job_id = %job.id.0,
                        conversation_id = %job.conversation_id.0,
                        attempts = job.attempt_count,
                        error = %refresh_error,
                        "refresh attempts exhausted; parking job"
                    );
                    self.stores
                        .refresh_jobs
                        .park(&job.id, refresh_error.to_string())
                        .await?;
                } else {
                    let retry_at = Utc::now() + job.retry_backoff();
                    warn!(
                        event_name = "refresh.job.rescheduled",
                        job_id = %job.id.0,
                        conversation_id = %job.conversation_id.0,
                        attempts = job.attempt_count,
                        error = %refresh_error,
                        "refresh failed; rescheduling"
                    );
                    self.stores
                        .refresh_jobs
                        .reschedule(&job.id, retry_at, refresh_error.to_string())
                        .await?;
                }
                Ok(true)
            }
        }
    }

    async fn refresh(&self, job: &SummaryRefreshJob) -> Result<(), EngineError> {
        let context = self
            .memory
            .conversation_context(&job.conversation_id, REFRESH_MESSAGE_LIMIT)
            .await?
            .ok_or_else(|| EngineError::ConversationNotFound(job.conversation_id.0.clone()))?;

        if context.messages.len() < MIN_MESSAGES_FOR_SUMMARY {
            debug!(
                event_name = "refresh.job.skipped_short",
                conversation_id = %job.conversation_id.0,
                messages = context.messages.len(),
                "not enough messages to summarize yet"
            );
            return Ok(());
        }

        let summary = self.extractor.analyze(
            &job.conversation_id,
            &context.messages,
            &context.participant_name,
            context.latest_summary.as_ref(),
        );
        let summary_id = summary.id.clone();
        self.stores.summaries.append(summary).await?;

        info!(
            event_name = "refresh.job.summary_appended",
            conversation_id = %job.conversation_id.0,
            summary_id = %summary_id.0,
            "feedback summary appended"
        );

        Ok(())
    }
}
