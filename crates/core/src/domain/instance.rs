use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::roster::{EmployeeId, OrgId};
use crate::domain::template::AgentTemplateId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentInstanceId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Draft,
    Active,
    Paused,
    Archived,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TonePreset {
    Warm,
    Professional,
    Casual,
}

impl TonePreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warm => "warm",
            Self::Professional => "professional",
            Self::Casual => "casual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "warm" => Some(Self::Warm),
            "professional" => Some(Self::Professional),
            "casual" => Some(Self::Casual),
            _ => None,
        }
    }
}

/// Which employees an instance talks to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "selector", rename_all = "snake_case")]
pub enum AudienceConfig {
    CompanyWide,
    Departments { departments: Vec<String> },
    Employees { employee_ids: Vec<EmployeeId> },
}

/// Per-instance guardrail switches set by the operator. Persisted and
/// surfaced to the dashboard; PolicyGuard does not currently read them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailFlags {
    #[serde(default)]
    pub no_sensitive_topics: bool,
    #[serde(default)]
    pub no_medical_legal: bool,
    #[serde(default)]
    pub require_human_review: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    #[default]
    InApp,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InApp => "in_app",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in_app" => Some(Self::InApp),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentInstanceConfig {
    pub tone: TonePreset,
    pub audience: AudienceConfig,
    #[serde(default)]
    pub guardrails: GuardrailFlags,
    #[serde(default)]
    pub channel: ChannelKind,
    /// Per-instance override of the engine-wide staleness threshold.
    #[serde(default)]
    pub stale_days: Option<u32>,
}

/// A configured deployment of a template for one organization. Never
/// deleted; retired instances are archived.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentInstance {
    pub id: AgentInstanceId,
    pub org_id: OrgId,
    pub template_id: AgentTemplateId,
    pub name: String,
    pub config: AgentInstanceConfig,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentInstance {
    pub fn can_transition_to(&self, next: InstanceStatus) -> bool {
        matches!(
            (self.status, next),
            (InstanceStatus::Draft, InstanceStatus::Active)
                | (InstanceStatus::Active, InstanceStatus::Paused)
                | (InstanceStatus::Paused, InstanceStatus::Active)
                | (InstanceStatus::Draft, InstanceStatus::Archived)
                | (InstanceStatus::Active, InstanceStatus::Archived)
                | (InstanceStatus::Paused, InstanceStatus::Archived)
        )
    }

    pub fn transition_to(&mut self, next: InstanceStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidInstanceTransition { from: self.status, to: next })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleCadence {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl ScheduleCadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "biweekly" => Some(Self::Biweekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    /// The next fire time after a run at `from`.
    pub fn next_from(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        let days = match self {
            Self::Daily => 1,
            Self::Weekly => 7,
            Self::Biweekly => 14,
            Self::Monthly => 30,
        };
        from + chrono::Duration::days(days)
    }
}

/// Cadence and run bookkeeping for one instance; one-to-one with it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSchedule {
    pub instance_id: AgentInstanceId,
    pub cadence: ScheduleCadence,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::roster::OrgId;
    use crate::domain::template::AgentTemplateId;

    use super::{
        AgentInstance, AgentInstanceConfig, AgentInstanceId, AudienceConfig, ChannelKind,
        GuardrailFlags, InstanceStatus, TonePreset,
    };

    fn instance(status: InstanceStatus) -> AgentInstance {
        AgentInstance {
            id: AgentInstanceId("inst-1".to_string()),
            org_id: OrgId("org-1".to_string()),
            template_id: AgentTemplateId("tmpl-1".to_string()),
            name: "Weekly check-in".to_string(),
            config: AgentInstanceConfig {
                tone: TonePreset::Warm,
                audience: AudienceConfig::CompanyWide,
                guardrails: GuardrailFlags::default(),
                channel: ChannelKind::InApp,
                stale_days: None,
            },
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn draft_instances_activate() {
        let mut instance = instance(InstanceStatus::Draft);
        instance.transition_to(InstanceStatus::Active).expect("draft -> active");
        assert_eq!(instance.status, InstanceStatus::Active);
    }

    #[test]
    fn archived_is_terminal() {
        let mut instance = instance(InstanceStatus::Archived);
        let error = instance
            .transition_to(InstanceStatus::Active)
            .expect_err("archived -> active should fail");
        assert!(matches!(
            error,
            crate::errors::DomainError::InvalidInstanceTransition { .. }
        ));
    }

    #[test]
    fn paused_instances_resume() {
        let mut instance = instance(InstanceStatus::Active);
        instance.transition_to(InstanceStatus::Paused).expect("active -> paused");
        instance.transition_to(InstanceStatus::Active).expect("paused -> active");
        assert_eq!(instance.status, InstanceStatus::Active);
    }

    #[test]
    fn cadence_advances_by_its_period() {
        let from = Utc::now();
        assert_eq!(super::ScheduleCadence::Daily.next_from(from), from + chrono::Duration::days(1));
        assert_eq!(
            super::ScheduleCadence::Biweekly.next_from(from),
            from + chrono::Duration::days(14)
        );
    }

    #[test]
    fn audience_config_json_is_tagged() {
        let audience = AudienceConfig::Departments {
            departments: vec!["Engineering".to_string(), "Design".to_string()],
        };
        let json = serde_json::to_string(&audience).expect("serialize audience");
        assert!(json.contains("\"selector\":\"departments\""));

        let parsed: AudienceConfig = serde_json::from_str(&json).expect("deserialize audience");
        assert_eq!(parsed, audience);
    }

    #[test]
    fn instance_config_defaults_apply() {
        let config: AgentInstanceConfig = serde_json::from_str(
            r#"{"tone":"professional","audience":{"selector":"company_wide"}}"#,
        )
        .expect("deserialize minimal config");

        assert_eq!(config.stale_days, None);
        assert_eq!(config.channel, ChannelKind::InApp);
        assert!(!config.guardrails.no_sensitive_topics);
    }
}
