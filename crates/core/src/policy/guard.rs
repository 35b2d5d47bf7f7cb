use serde::{Deserialize, Serialize};

use crate::domain::escalation::{EscalationType, Severity};
use crate::policy::patterns::{
    any_match, ACCOUNT_PLACEHOLDER, ACCOUNT_REDACTION, CARD_PLACEHOLDER, CARD_REDACTION,
    DISCRIMINATION_PATTERNS, HARASSMENT_PATTERNS, MANIPULATION_PATTERNS, SAFETY_PATTERNS,
    SENSITIVE_REQUEST_PATTERNS, SSN_PLACEHOLDER, SSN_REDACTION,
};

/// Agent drafts longer than this are flagged (informational only).
const MAX_AGENT_MESSAGE_CHARS: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    SafetyRisk,
    Harassment,
    Discrimination,
    SsnRequest,
    BankAccountRequest,
    CreditCardRequest,
    MedicalStatusRequest,
    ImmigrationStatusRequest,
    ExcessiveLength,
    ManipulativePhrasing,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SafetyRisk => "safety_risk",
            Self::Harassment => "harassment",
            Self::Discrimination => "discrimination",
            Self::SsnRequest => "ssn_request",
            Self::BankAccountRequest => "bank_account_request",
            Self::CreditCardRequest => "credit_card_request",
            Self::MedicalStatusRequest => "medical_status_request",
            Self::ImmigrationStatusRequest => "immigration_status_request",
            Self::ExcessiveLength => "excessive_length",
            Self::ManipulativePhrasing => "manipulative_phrasing",
        }
    }

    /// The escalation category this violation routes to, if any.
    pub fn escalation_type(&self) -> Option<EscalationType> {
        match self {
            Self::SafetyRisk => Some(EscalationType::Safety),
            Self::Harassment => Some(EscalationType::Harassment),
            Self::Discrimination => Some(EscalationType::Discrimination),
            _ => None,
        }
    }

    fn sensitive_request(kind: &str) -> Option<Self> {
        match kind {
            "ssn_request" => Some(Self::SsnRequest),
            "bank_account_request" => Some(Self::BankAccountRequest),
            "credit_card_request" => Some(Self::CreditCardRequest),
            "medical_status_request" => Some(Self::MedicalStatusRequest),
            "immigration_status_request" => Some(Self::ImmigrationStatusRequest),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
}

/// Result of screening an inbound employee message. Employee messages are
/// never blocked, only flagged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmployeeMessageCheck {
    pub allowed: bool,
    pub violations: Vec<Violation>,
    pub requires_escalation: bool,
    pub escalation_type: Option<EscalationType>,
}

/// Result of screening an outbound agent draft. Agent drafts never escalate;
/// they are either sendable or not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentMessageCheck {
    pub allowed: bool,
    pub violations: Vec<Violation>,
    pub requires_escalation: bool,
}

/// Stateless two-directional content filter. Inbound employee text is
/// screened for escalation triggers; outbound agent text is screened for
/// policy violations before delivery.
#[derive(Clone, Copy, Debug, Default)]
pub struct PolicyGuard;

impl PolicyGuard {
    pub fn new() -> Self {
        Self
    }

    /// Categories are evaluated in a fixed order (safety, harassment,
    /// discrimination); the first match becomes the escalation type, so
    /// safety always dominates co-occurring content.
    pub fn check_employee_message(&self, text: &str) -> EmployeeMessageCheck {
        let mut violations = Vec::new();
        let mut escalation_type = None;

        let categories: [(&[regex::Regex], ViolationKind, Severity); 3] = [
            (&SAFETY_PATTERNS, ViolationKind::SafetyRisk, Severity::Critical),
            (&HARASSMENT_PATTERNS, ViolationKind::Harassment, Severity::High),
            (&DISCRIMINATION_PATTERNS, ViolationKind::Discrimination, Severity::High),
        ];

        for (patterns, kind, severity) in categories {
            if any_match(patterns, text) {
                violations.push(Violation { kind, severity });
                if escalation_type.is_none() {
                    escalation_type = kind.escalation_type();
                }
            }
        }

        EmployeeMessageCheck {
            allowed: true,
            requires_escalation: escalation_type.is_some(),
            escalation_type,
            violations,
        }
    }

    pub fn check_agent_message(&self, text: &str) -> AgentMessageCheck {
        let mut violations = Vec::new();

        for (kind, patterns) in SENSITIVE_REQUEST_PATTERNS.iter() {
            if any_match(patterns, text) {
                if let Some(kind) = ViolationKind::sensitive_request(kind) {
                    violations.push(Violation { kind, severity: Severity::High });
                }
            }
        }

        if text.chars().count() > MAX_AGENT_MESSAGE_CHARS {
            violations
                .push(Violation { kind: ViolationKind::ExcessiveLength, severity: Severity::Low });
        }

        if any_match(&MANIPULATION_PATTERNS, text) {
            violations.push(Violation {
                kind: ViolationKind::ManipulativePhrasing,
                severity: Severity::Medium,
            });
        }

        let allowed = !violations.iter().any(|violation| violation.severity.is_blocking());

        AgentMessageCheck { allowed, violations, requires_escalation: false }
    }

    /// Replaces SSNs, card numbers, and labeled account/routing numbers with
    /// fixed placeholders. Placeholders contain no digits, so the operation
    /// is idempotent.
    pub fn redact(&self, text: &str) -> String {
        let redacted = SSN_REDACTION.replace_all(text, SSN_PLACEHOLDER);
        let redacted = ACCOUNT_REDACTION.replace_all(&redacted, ACCOUNT_PLACEHOLDER);
        CARD_REDACTION.replace_all(&redacted, CARD_PLACEHOLDER).into_owned()
    }

    /// Fixed acknowledgment sent when a conversation escalates. Deterministic
    /// for a given type and name.
    pub fn escalation_acknowledgment(
        &self,
        escalation_type: EscalationType,
        participant_name: &str,
    ) -> String {
        match escalation_type {
            EscalationType::Safety => format!(
                "{participant_name}, thank you for trusting me with this. What you're going \
                 through matters, and a member of the HR team is being notified right now so a \
                 person can support you directly. If you are in immediate danger, please contact \
                 emergency services, or reach the 988 Suicide & Crisis Lifeline by calling or \
                 texting 988."
            ),
            EscalationType::Harassment => format!(
                "{participant_name}, I'm sorry you're dealing with this. What you've described \
                 is serious, and I've flagged it for the HR team so a person can follow up with \
                 you confidentially. You don't have to handle this alone."
            ),
            EscalationType::Discrimination => format!(
                "{participant_name}, thank you for sharing this. Treating people differently for \
                 who they are isn't acceptable, and I've routed your message to the HR team for \
                 a confidential follow-up with you."
            ),
            EscalationType::Urgent => format!(
                "{participant_name}, I've marked this as urgent and notified the HR team so \
                 someone can get back to you as soon as possible."
            ),
        }
    }

    /// True when any violation is critical or belongs to an escalation
    /// category.
    pub fn should_route_to_human(&self, violations: &[Violation]) -> bool {
        violations.iter().any(|violation| {
            violation.severity == Severity::Critical || violation.kind.escalation_type().is_some()
        })
    }
}
