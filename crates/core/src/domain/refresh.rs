use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefreshJobId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshJobState {
    Queued,
    Running,
    Completed,
    RetryableFailed,
    FailedTerminal,
}

impl RefreshJobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::RetryableFailed => "retryable_failed",
            Self::FailedTerminal => "failed_terminal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "retryable_failed" => Some(Self::RetryableFailed),
            "failed_terminal" => Some(Self::FailedTerminal),
            _ => None,
        }
    }
}

/// One queued summary-refresh for a conversation. Replies enqueue a job
/// rather than refreshing inline, so a transient failure retries instead of
/// silently dropping the summary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryRefreshJob {
    pub id: RefreshJobId,
    pub conversation_id: ConversationId,
    pub state: RefreshJobState,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub available_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SummaryRefreshJob {
    pub fn attempts_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }

    /// Delay before the next attempt: 30s, then 2m, then 10m.
    pub fn retry_backoff(&self) -> Duration {
        match self.attempt_count {
            0 | 1 => Duration::seconds(30),
            2 => Duration::minutes(2),
            _ => Duration::minutes(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::domain::conversation::ConversationId;

    use super::{RefreshJobId, RefreshJobState, SummaryRefreshJob};

    fn job(attempt_count: u32) -> SummaryRefreshJob {
        SummaryRefreshJob {
            id: RefreshJobId("job-1".to_string()),
            conversation_id: ConversationId("conv-1".to_string()),
            state: RefreshJobState::Queued,
            attempt_count,
            max_attempts: 3,
            available_at: Utc::now(),
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn backoff_grows_with_attempts() {
        assert_eq!(job(1).retry_backoff(), Duration::seconds(30));
        assert_eq!(job(2).retry_backoff(), Duration::minutes(2));
        assert_eq!(job(3).retry_backoff(), Duration::minutes(10));
    }

    #[test]
    fn attempts_exhaust_at_max() {
        assert!(!job(2).attempts_exhausted());
        assert!(job(3).attempts_exhausted());
    }

    #[test]
    fn state_string_forms_round_trip() {
        for state in [
            RefreshJobState::Queued,
            RefreshJobState::Running,
            RefreshJobState::Completed,
            RefreshJobState::RetryableFailed,
            RefreshJobState::FailedTerminal,
        ] {
            assert_eq!(RefreshJobState::parse(state.as_str()), Some(state));
        }
    }
}
