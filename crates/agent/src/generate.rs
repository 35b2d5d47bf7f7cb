//! Message generation: the optional TextGenerator collaborator plus the
//! deterministic canned catalogs every generation call site falls back to.

use async_trait::async_trait;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pulsey_core::config::{GeneratorConfig, GeneratorProvider};
use pulsey_core::domain::escalation::EscalationType;
use pulsey_core::domain::instance::TonePreset;
use pulsey_core::domain::template::AgentKind;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("text generator is not configured")]
    NotConfigured,
    #[error("generation request failed: {0}")]
    Request(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedReply {
    pub content: String,
    pub should_escalate: bool,
    pub escalation_type: Option<EscalationType>,
}

/// Optional natural-language phrasing service. Absence or failure must never
/// stall delivery; every call site has a deterministic fallback.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn generate_initial_message(
        &self,
        participant_name: &str,
        agent_kind: AgentKind,
        tone: TonePreset,
    ) -> Result<String, GenerationError>;

    async fn generate_agent_response(
        &self,
        participant_name: &str,
        agent_kind: AgentKind,
        tone: TonePreset,
        history: &str,
    ) -> Result<GeneratedReply, GenerationError>;
}

/// Stand-in when no generator is configured; callers route to the canned
/// catalogs.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTextGenerator;

#[async_trait]
impl TextGenerator for NoopTextGenerator {
    fn is_configured(&self) -> bool {
        false
    }

    async fn generate_initial_message(
        &self,
        _participant_name: &str,
        _agent_kind: AgentKind,
        _tone: TonePreset,
    ) -> Result<String, GenerationError> {
        Err(GenerationError::NotConfigured)
    }

    async fn generate_agent_response(
        &self,
        _participant_name: &str,
        _agent_kind: AgentKind,
        _tone: TonePreset,
        _history: &str,
    ) -> Result<GeneratedReply, GenerationError> {
        Err(GenerationError::NotConfigured)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequestBody<'a> {
    model: &'a str,
    task: &'a str,
    participant_name: &'a str,
    agent_kind: &'a str,
    tone: &'a str,
    history: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponseBody {
    content: String,
    #[serde(default)]
    should_escalate: bool,
    #[serde(default)]
    escalation_type: Option<String>,
}

/// HTTP-backed generator for deployments that run a phrasing model.
pub struct HttpTextGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl HttpTextGenerator {
    /// Returns `None` unless the config selects the http provider with a
    /// base URL and key (validation guarantees both when it does).
    pub fn from_config(config: &GeneratorConfig) -> Option<Self> {
        if config.provider != GeneratorProvider::Http {
            return None;
        }
        let base_url = config.base_url.clone()?;
        let api_key = config.api_key.clone()?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .ok()?;

        Some(Self { client, base_url, model: config.model.clone(), api_key })
    }

    async fn call(
        &self,
        body: GenerateRequestBody<'_>,
    ) -> Result<GenerateResponseBody, GenerationError> {
        let url = format!("{}/v1/generate", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let response = response
            .error_for_status()
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        response
            .json::<GenerateResponseBody>()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    fn is_configured(&self) -> bool {
        true
    }

    async fn generate_initial_message(
        &self,
        participant_name: &str,
        agent_kind: AgentKind,
        tone: TonePreset,
    ) -> Result<String, GenerationError> {
        let body = GenerateRequestBody {
            model: &self.model,
            task: "initial_message",
            participant_name,
            agent_kind: agent_kind.as_str(),
            tone: tone.as_str(),
            history: None,
        };
        Ok(self.call(body).await?.content)
    }

    async fn generate_agent_response(
        &self,
        participant_name: &str,
        agent_kind: AgentKind,
        tone: TonePreset,
        history: &str,
    ) -> Result<GeneratedReply, GenerationError> {
        let body = GenerateRequestBody {
            model: &self.model,
            task: "agent_response",
            participant_name,
            agent_kind: agent_kind.as_str(),
            tone: tone.as_str(),
            history: Some(history),
        };
        let response = self.call(body).await?;

        Ok(GeneratedReply {
            content: response.content,
            should_escalate: response.should_escalate,
            escalation_type: response
                .escalation_type
                .as_deref()
                .and_then(EscalationType::parse),
        })
    }
}

/// Injectable source of variant indices so canned-message selection is
/// deterministic in tests.
pub trait VariantPicker: Send + Sync {
    fn pick(&self, variants: usize) -> usize;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RandomVariantPicker;

impl VariantPicker for RandomVariantPicker {
    fn pick(&self, variants: usize) -> usize {
        if variants <= 1 {
            return 0;
        }
        rand::thread_rng().gen_range(0..variants)
    }
}

/// Always returns the same index (modulo the variant count).
#[derive(Clone, Copy, Debug)]
pub struct FixedVariantPicker(pub usize);

impl VariantPicker for FixedVariantPicker {
    fn pick(&self, variants: usize) -> usize {
        if variants == 0 {
            return 0;
        }
        self.0 % variants
    }
}

const CHECK_IN_OPENINGS: &[&str] = &[
    "Hi {name}! I'm checking in on how your week is going. How are you feeling about work right now?",
    "Hello {name}, it's time for a quick check-in. What's been on your mind at work lately?",
    "Hey {name}! Just a short check-in: how have things been going for you this week?",
];

const ONBOARDING_OPENINGS: &[&str] = &[
    "Welcome aboard, {name}! How has your first stretch been going so far?",
    "Hi {name}! Now that you've had some time to settle in, how is onboarding treating you?",
    "Hello {name}, checking in on your onboarding. Is there anything you're missing so far?",
];

const EXIT_OPENINGS: &[&str] = &[
    "Hi {name}, thank you for making time before your departure. How would you describe your experience here?",
    "Hello {name}, as part of your offboarding I'd love to hear your honest reflections. How has your time here been?",
];

const NUDGES: &[&str] = &[
    "Just a gentle reminder that I'm here whenever you'd like to share how things are going.",
    "No rush at all, but I'd still love to hear how your week has been when you have a minute.",
    "Checking in once more. Even a sentence or two about how work feels right now would help.",
];

const GENERIC_FOLLOW_UPS: &[&str] = &[
    "How has this week been for you overall?",
    "What's one thing that went well this week, and one thing that didn't?",
    "How are you feeling about your workload and energy this week?",
];

/// Opening line for a brand-new conversation, by agent kind.
pub fn opening_message(
    kind: AgentKind,
    participant_name: &str,
    picker: &dyn VariantPicker,
) -> String {
    let variants = match kind {
        AgentKind::CheckIn => CHECK_IN_OPENINGS,
        AgentKind::Onboarding => ONBOARDING_OPENINGS,
        AgentKind::Exit => EXIT_OPENINGS,
    };
    variants[picker.pick(variants.len())].replace("{name}", participant_name)
}

/// Gentle reminder for a stale conversation.
pub fn nudge_message(picker: &dyn VariantPicker) -> String {
    NUDGES[picker.pick(NUDGES.len())].to_string()
}

/// Contextual follow-up referencing the latest summary's topics when there
/// are any, else a generic weekly prompt.
pub fn follow_up_message(topics: &[String], picker: &dyn VariantPicker) -> String {
    match topics.first() {
        Some(topic) => format!(
            "Last time we spoke, {topic} came up. How has that been since, and is there anything \
             new you'd like to flag?"
        ),
        None => GENERIC_FOLLOW_UPS[picker.pick(GENERIC_FOLLOW_UPS.len())].to_string(),
    }
}

/// Deterministic reply used whenever the TextGenerator is absent or fails,
/// keyed on what the employee just said. Checked top to bottom; the first
/// matching rule wins.
pub fn fallback_reply(inbound: &str) -> GeneratedReply {
    let normalized = inbound.to_ascii_lowercase();

    let content = if normalized.contains("thank") {
        "You're very welcome. I'm here whenever you want to talk things through.".to_string()
    } else if ["overwhelmed", "workload", "too much", "deadline", "burnout", "burned out"]
        .iter()
        .any(|keyword| normalized.contains(keyword))
    {
        "That sounds like a lot to carry. Which part of the workload is weighing on you most \
         right now?"
            .to_string()
    } else if normalized.contains("manager") || normalized.contains("boss") {
        "Thanks for being open about that. How has the communication with your manager felt \
         lately?"
            .to_string()
    } else if ["stressed", "frustrated", "tired", "worried", "anxious", "unhappy"]
        .iter()
        .any(|keyword| normalized.contains(keyword))
    {
        "I'm sorry it's been feeling that way. What would make the biggest difference for you \
         this week?"
            .to_string()
    } else if ["great", "good", "happy", "excited", "well"]
        .iter()
        .any(|keyword| normalized.contains(keyword))
    {
        "That's really good to hear! Is there anything that would make things even better?"
            .to_string()
    } else {
        "Thanks for sharing that. Could you tell me a bit more about how that's been affecting \
         you?"
            .to_string()
    };

    GeneratedReply { content, should_escalate: false, escalation_type: None }
}

#[cfg(test)]
mod tests {
    use pulsey_core::domain::instance::TonePreset;
    use pulsey_core::domain::template::AgentKind;

    use super::{
        fallback_reply, follow_up_message, nudge_message, opening_message, FixedVariantPicker,
        NoopTextGenerator, RandomVariantPicker, TextGenerator, VariantPicker,
    };

    #[test]
    fn openings_are_deterministic_under_a_fixed_picker() {
        let picker = FixedVariantPicker(1);
        let first = opening_message(AgentKind::CheckIn, "Dana", &picker);
        let second = opening_message(AgentKind::CheckIn, "Dana", &picker);

        assert_eq!(first, second);
        assert!(first.contains("Dana"));
    }

    #[test]
    fn openings_differ_by_agent_kind() {
        let picker = FixedVariantPicker(0);
        let check_in = opening_message(AgentKind::CheckIn, "Dana", &picker);
        let exit = opening_message(AgentKind::Exit, "Dana", &picker);
        assert_ne!(check_in, exit);
    }

    #[test]
    fn random_picker_stays_in_bounds() {
        let picker = RandomVariantPicker;
        for _ in 0..50 {
            assert!(picker.pick(3) < 3);
        }
        assert_eq!(picker.pick(1), 0);
    }

    #[test]
    fn follow_up_references_first_topic() {
        let picker = FixedVariantPicker(0);
        let with_topic = follow_up_message(&["workload".to_string()], &picker);
        assert!(with_topic.contains("workload"));

        let generic = follow_up_message(&[], &picker);
        assert!(!generic.contains("workload"));
    }

    #[test]
    fn nudges_come_from_the_fixed_set() {
        let picker = FixedVariantPicker(2);
        let nudge = nudge_message(&picker);
        assert!(nudge.contains("Checking in once more"));
    }

    #[test]
    fn fallback_reply_table_is_keyed_on_inbound_text() {
        assert!(fallback_reply("thank you so much").content.contains("welcome"));
        assert!(fallback_reply("my workload is too much").content.contains("workload"));
        assert!(fallback_reply("my manager cancelled again").content.contains("manager"));
        assert!(fallback_reply("feeling stressed lately").content.contains("sorry"));
        assert!(fallback_reply("things are going great").content.contains("good to hear"));
        assert!(fallback_reply("the migration finished").content.contains("tell me a bit more"));
    }

    #[test]
    fn fallback_reply_never_escalates() {
        let reply = fallback_reply("feeling stressed about deadlines");
        assert!(!reply.should_escalate);
        assert!(reply.escalation_type.is_none());
    }

    #[tokio::test]
    async fn noop_generator_reports_unconfigured() {
        let generator = NoopTextGenerator;
        assert!(!generator.is_configured());
        assert!(generator
            .generate_initial_message("Dana", AgentKind::CheckIn, TonePreset::Warm)
            .await
            .is_err());
    }
}
