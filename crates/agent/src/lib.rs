//! Agent Engine - scheduled check-in conversations with policy screening
//!
//! This crate is the conversational core of pulsey:
//! - Runs scheduled/manual batch fan-out over an instance's audience
//! - Decides what message (if any) each participant receives
//! - Screens inbound and outbound content through the policy guard
//! - Escalates risk signals to a human and acknowledges the participant
//! - Keeps the per-conversation insight history fresh via a retryable
//!   refresh queue
//!
//! # Architecture
//!
//! The engine follows a constrained loop:
//! 1. **Context Assembly** (`memory`) - conversations, history, staleness
//! 2. **Generation** (`generate`) - TextGenerator with deterministic fallback
//! 3. **Policy Screening** (`pulsey_core::policy`) - both directions
//! 4. **Delivery** (`pulsey_inbox`) - channel adapter selected per instance
//! 5. **Insight Refresh** (`refresh`) - at-least-once summary jobs
//!
//! # Key Types
//!
//! - `AgentOrchestrator` - the only component with cross-cutting control flow
//! - `TextGenerator` - pluggable phrasing service; absence never stalls
//!   delivery
//! - `SummaryRefreshWorker` - background queue consumer
//!
//! # Safety Principle
//!
//! The generator is strictly a phrasing service. Escalation decisions,
//! nudge budgets, and policy outcomes are deterministic decisions made by
//! the engine.

pub mod generate;
pub mod memory;
pub mod orchestrator;
pub mod refresh;

use thiserror::Error;

use pulsey_core::errors::DomainError;
use pulsey_db::repositories::RepositoryError;
use pulsey_inbox::ChannelError;

pub use generate::{
    FixedVariantPicker, GeneratedReply, GenerationError, HttpTextGenerator, NoopTextGenerator,
    RandomVariantPicker, TextGenerator, VariantPicker,
};
pub use memory::{ConversationContext, MemoryStore, StalenessCheck};
pub use orchestrator::{AgentOrchestrator, EngineStores, ReplyOutcome, RunOutcome};
pub use refresh::{enqueue_refresh, SummaryRefreshWorker};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("agent instance not found: {0}")]
    InstanceNotFound(String),
    #[error("agent instance is not active: {0}")]
    InstanceNotActive(String),
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
    #[error(transparent)]
    Persistence(#[from] RepositoryError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}
