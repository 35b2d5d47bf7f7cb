use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::instance::AgentInstanceConfig;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentTemplateId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    CheckIn,
    Onboarding,
    Exit,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckIn => "check_in",
            Self::Onboarding => "onboarding",
            Self::Exit => "exit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "check_in" => Some(Self::CheckIn),
            "onboarding" => Some(Self::Onboarding),
            "exit" => Some(Self::Exit),
            _ => None,
        }
    }
}

/// A reusable agent definition. Templates are immutable once published and
/// the engine only ever reads them; authoring lives in the dashboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentTemplate {
    pub id: AgentTemplateId,
    pub kind: AgentKind,
    pub name: String,
    pub base_prompt: String,
    pub default_config: AgentInstanceConfig,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AgentTemplate {
    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }
}
