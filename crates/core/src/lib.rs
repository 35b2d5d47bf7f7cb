pub mod config;
pub mod domain;
pub mod errors;
pub mod insight;
pub mod policy;

pub use domain::conversation::{
    Conversation, ConversationId, ConversationMetadata, ConversationStatus,
};
pub use domain::escalation::{
    Escalation, EscalationId, EscalationStatus, EscalationType, Severity,
};
pub use domain::instance::{
    AgentInstance, AgentInstanceConfig, AgentInstanceId, AgentSchedule, AudienceConfig,
    ChannelKind, GuardrailFlags, InstanceStatus, ScheduleCadence, TonePreset,
};
pub use domain::message::{ContentType, Message, MessageId, MessageSender, NewMessage};
pub use domain::refresh::{RefreshJobId, RefreshJobState, SummaryRefreshJob};
pub use domain::roster::{EmployeeId, OrgId, OrgMember};
pub use domain::run::{AgentRun, AgentRunId, RunStatus, RunType};
pub use domain::summary::{
    ActionCategory, ActionItem, ActionPriority, FeedbackSummary, FeedbackSummaryId, Sentiment,
};
pub use domain::template::{AgentKind, AgentTemplate, AgentTemplateId};
pub use errors::DomainError;
pub use insight::classifier::{Classifier, KeywordClassifier, SentimentScore};
pub use insight::extractor::InsightExtractor;
pub use policy::guard::{
    AgentMessageCheck, EmployeeMessageCheck, PolicyGuard, Violation, ViolationKind,
};

pub use chrono;
