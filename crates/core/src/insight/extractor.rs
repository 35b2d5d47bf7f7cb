use std::collections::BTreeSet;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::conversation::ConversationId;
use crate::domain::message::{Message, MessageSender};
use crate::domain::summary::{
    ActionCategory, ActionItem, ActionPriority, FeedbackSummary, FeedbackSummaryId, Sentiment,
};
use crate::insight::classifier::{Classifier, KeywordClassifier, SentimentScore};

const MAX_KEY_QUOTES: usize = 3;
const MIN_QUOTE_CHARS: usize = 20;
const MAX_QUOTE_CHARS: usize = 300;
const SUMMARY_TOPIC_LIMIT: usize = 3;

/// Phrases that mark a retention risk regardless of detected topics.
const ATTRITION_PHRASES: &[&str] = &[
    "burnout",
    "burned out",
    "burnt out",
    "quit",
    "quitting",
    "resign",
    "leave the company",
    "leaving the company",
    "looking elsewhere",
    "another job",
    "job search",
];

/// Stateless analysis pipeline over a conversation's messages. Only
/// employee-sent messages feed the analysis; agent and system messages are
/// context, not signal.
#[derive(Clone, Debug)]
pub struct InsightExtractor<C = KeywordClassifier> {
    classifier: C,
}

impl InsightExtractor<KeywordClassifier> {
    pub fn new() -> Self {
        Self::with_classifier(KeywordClassifier::new())
    }
}

impl Default for InsightExtractor<KeywordClassifier> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> InsightExtractor<C>
where
    C: Classifier,
{
    pub fn with_classifier(classifier: C) -> Self {
        Self { classifier }
    }

    pub fn extract_topics(&self, messages: &[Message]) -> BTreeSet<String> {
        self.classifier.classify_topics(&employee_text(messages))
    }

    pub fn analyze_sentiment(&self, messages: &[Message]) -> SentimentScore {
        self.classifier.score_sentiment(&employee_text(messages))
    }

    /// Employee messages between 20 and 300 characters (exclusive), longest
    /// first, truncated to `max`. Deterministic given identical input.
    pub fn extract_key_quotes(&self, messages: &[Message], max: usize) -> Vec<String> {
        let mut quotes: Vec<&str> = messages
            .iter()
            .filter(|message| message.sender == MessageSender::Employee)
            .map(|message| message.content.as_str())
            .filter(|content| {
                let chars = content.chars().count();
                chars > MIN_QUOTE_CHARS && chars < MAX_QUOTE_CHARS
            })
            .collect();

        quotes.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
        quotes.truncate(max);
        quotes.into_iter().map(str::to_string).collect()
    }

    /// Fixed rule table; every rule whose condition holds fires
    /// independently.
    pub fn generate_action_items(
        &self,
        messages: &[Message],
        topics: &BTreeSet<String>,
        sentiment: Sentiment,
    ) -> Vec<ActionItem> {
        let text = employee_text(messages).to_ascii_lowercase();
        let mut items = Vec::new();

        if ATTRITION_PHRASES.iter().any(|phrase| text.contains(phrase)) {
            items.push(ActionItem {
                category: ActionCategory::RetentionRisk,
                description: "Burnout or attrition language detected; schedule a direct \
                              follow-up conversation."
                    .to_string(),
                priority: ActionPriority::High,
                confidence: 0.9,
            });
        }

        if topics.contains("workload") && sentiment != Sentiment::Positive {
            items.push(ActionItem {
                category: ActionCategory::Workload,
                description: "Workload concerns raised; review team capacity and priorities."
                    .to_string(),
                priority: ActionPriority::Medium,
                confidence: 0.7,
            });
        }

        if topics.contains("manager") && sentiment == Sentiment::Negative {
            items.push(ActionItem {
                category: ActionCategory::ManagerRelationship,
                description: "Negative sentiment around the manager relationship; consider a \
                              skip-level check-in."
                    .to_string(),
                priority: ActionPriority::Medium,
                confidence: 0.7,
            });
        }

        if topics.contains("compensation") {
            items.push(ActionItem {
                category: ActionCategory::Compensation,
                description: "Compensation mentioned; queue a compensation review.".to_string(),
                priority: ActionPriority::Medium,
                confidence: 0.6,
            });
        }

        if topics.contains("growth") && sentiment != Sentiment::Positive {
            items.push(ActionItem {
                category: ActionCategory::Growth,
                description: "Growth concerns raised; discuss a development plan.".to_string(),
                priority: ActionPriority::Medium,
                confidence: 0.6,
            });
        }

        if topics.contains("tooling") && sentiment == Sentiment::Negative {
            items.push(ActionItem {
                category: ActionCategory::Tooling,
                description: "Tooling friction reported; collect specifics for the platform \
                              team."
                    .to_string(),
                priority: ActionPriority::Low,
                confidence: 0.5,
            });
        }

        items
    }

    /// One templated sentence naming the participant, a sentiment phrase,
    /// and up to the first three topics.
    pub fn generate_summary(
        &self,
        messages: &[Message],
        topics: &BTreeSet<String>,
        sentiment: Sentiment,
        participant_name: &str,
    ) -> String {
        let employee_messages = messages
            .iter()
            .filter(|message| message.sender == MessageSender::Employee)
            .count();
        if employee_messages == 0 {
            return "No employee responses yet.".to_string();
        }

        let phrase = match sentiment {
            Sentiment::Positive => "is feeling positive",
            Sentiment::Negative => "is expressing concerns",
            Sentiment::Mixed => "has mixed feelings",
            Sentiment::Neutral => "is neutral",
        };

        let leading_topics: Vec<&str> =
            topics.iter().take(SUMMARY_TOPIC_LIMIT).map(String::as_str).collect();
        if leading_topics.is_empty() {
            format!("{participant_name} {phrase} in recent check-ins.")
        } else {
            format!("{participant_name} {phrase} about {}.", leading_topics.join(", "))
        }
    }

    /// Delta notes against the previous summary: a sentiment-shift note when
    /// sentiment crossed between negative and positive/neutral, plus topic
    /// set differences in both directions. `None` without a previous
    /// summary.
    pub fn compare_summaries(
        &self,
        previous: Option<&FeedbackSummary>,
        current_sentiment: Sentiment,
        current_topics: &BTreeSet<String>,
    ) -> Option<String> {
        let previous = previous?;
        let mut fragments = Vec::new();

        let improved = previous.sentiment == Sentiment::Negative
            && matches!(current_sentiment, Sentiment::Positive | Sentiment::Neutral);
        let declined = matches!(previous.sentiment, Sentiment::Positive | Sentiment::Neutral)
            && current_sentiment == Sentiment::Negative;
        if improved {
            fragments.push("Sentiment has improved since the previous check-in.".to_string());
        } else if declined {
            fragments.push("Sentiment has declined since the previous check-in.".to_string());
        }

        let previous_topics: BTreeSet<String> = previous.topics.iter().cloned().collect();
        let new_topics: Vec<&str> =
            current_topics.difference(&previous_topics).map(String::as_str).collect();
        if !new_topics.is_empty() {
            fragments.push(format!("New concerns: {}.", new_topics.join(", ")));
        }

        let dropped_topics: Vec<&str> =
            previous_topics.difference(current_topics).map(String::as_str).collect();
        if !dropped_topics.is_empty() {
            fragments.push(format!("No longer mentioned: {}.", dropped_topics.join(", ")));
        }

        if fragments.is_empty() {
            return Some("No significant changes since the previous summary.".to_string());
        }

        Some(fragments.join(" "))
    }

    /// Composes the full pipeline into one summary record stamped with the
    /// current time.
    pub fn analyze(
        &self,
        conversation_id: &ConversationId,
        messages: &[Message],
        participant_name: &str,
        previous: Option<&FeedbackSummary>,
    ) -> FeedbackSummary {
        let topics = self.extract_topics(messages);
        let SentimentScore { sentiment, score } = self.analyze_sentiment(messages);
        let action_items = self.generate_action_items(messages, &topics, sentiment);
        let key_quotes = self.extract_key_quotes(messages, MAX_KEY_QUOTES);
        let summary_text = self.generate_summary(messages, &topics, sentiment, participant_name);
        let delta_notes = self.compare_summaries(previous, sentiment, &topics);

        FeedbackSummary {
            id: FeedbackSummaryId(format!("sum-{}", Uuid::new_v4())),
            conversation_id: conversation_id.clone(),
            sentiment,
            score,
            topics: topics.into_iter().collect(),
            action_items,
            key_quotes,
            summary_text,
            delta_notes,
            previous_summary_id: previous.map(|summary| summary.id.clone()),
            first_message_id: messages.first().map(|message| message.id.clone()),
            last_message_id: messages.last().map(|message| message.id.clone()),
            message_count: messages.len() as u32,
            created_at: Utc::now(),
        }
    }
}

fn employee_text(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|message| message.sender == MessageSender::Employee)
        .map(|message| message.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;

    use crate::domain::conversation::ConversationId;
    use crate::domain::message::{ContentType, Message, MessageId, MessageSender};
    use crate::domain::summary::{
        ActionCategory, ActionPriority, FeedbackSummary, FeedbackSummaryId, Sentiment,
    };

    use super::InsightExtractor;

    fn message(sender: MessageSender, content: &str) -> Message {
        Message {
            id: MessageId(format!("msg-{content_len}", content_len = content.len())),
            conversation_id: ConversationId("conv-1".to_string()),
            sender,
            content: content.to_string(),
            content_type: ContentType::Text,
            metadata: serde_json::Value::Null,
            is_read: false,
            created_at: Utc::now(),
        }
    }

    fn summary(sentiment: Sentiment, topics: &[&str]) -> FeedbackSummary {
        FeedbackSummary {
            id: FeedbackSummaryId("sum-prev".to_string()),
            conversation_id: ConversationId("conv-1".to_string()),
            sentiment,
            score: 0.0,
            topics: topics.iter().map(|topic| (*topic).to_string()).collect(),
            action_items: Vec::new(),
            key_quotes: Vec::new(),
            summary_text: String::new(),
            delta_notes: None,
            previous_summary_id: None,
            first_message_id: None,
            last_message_id: None,
            message_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn overloaded_week_reads_as_negative_workload() {
        let extractor = InsightExtractor::new();
        let messages = vec![
            message(MessageSender::Agent, "How has your week been?"),
            message(MessageSender::Employee, "I'm overwhelmed with my workload this week"),
            message(MessageSender::Employee, "deadlines keep piling up"),
        ];

        let topics = extractor.extract_topics(&messages);
        assert!(topics.contains("workload"));

        let sentiment = extractor.analyze_sentiment(&messages);
        assert_eq!(sentiment.sentiment, Sentiment::Negative);
    }

    #[test]
    fn agent_messages_are_not_signal() {
        let extractor = InsightExtractor::new();
        let messages = vec![message(
            MessageSender::Agent,
            "Sorry to hear the workload feels overwhelming and stressful",
        )];

        assert!(extractor.extract_topics(&messages).is_empty());
        assert_eq!(extractor.analyze_sentiment(&messages).sentiment, Sentiment::Neutral);
    }

    #[test]
    fn key_quotes_rank_longest_first_with_bounds() {
        let extractor = InsightExtractor::new();
        let short = "too short";
        let mid = "a quote that is comfortably inside the range";
        let long = "a noticeably longer quote that should be ranked ahead of the mid one";
        let huge = "x".repeat(300);
        let messages = vec![
            message(MessageSender::Employee, short),
            message(MessageSender::Employee, mid),
            message(MessageSender::Employee, &huge),
            message(MessageSender::Employee, long),
            message(MessageSender::Agent, "agent text never becomes a quote, even this long one"),
        ];

        let quotes = extractor.extract_key_quotes(&messages, 3);
        assert_eq!(quotes, vec![long.to_string(), mid.to_string()]);
    }

    #[test]
    fn quote_limit_is_applied_after_ranking() {
        let extractor = InsightExtractor::new();
        let messages: Vec<_> = (0..5)
            .map(|index| {
                let content = format!("{}{}", "quote body padding ", "x".repeat(10 + index));
                message(MessageSender::Employee, &content)
            })
            .collect();

        let quotes = extractor.extract_key_quotes(&messages, 3);
        assert_eq!(quotes.len(), 3);
        assert!(quotes[0].len() >= quotes[1].len());
        assert!(quotes[1].len() >= quotes[2].len());
    }

    #[test]
    fn attrition_language_always_raises_retention_risk() {
        let extractor = InsightExtractor::new();
        let messages = vec![message(
            MessageSender::Employee,
            "honestly the launch went great, but I'm close to burnout",
        )];
        let topics = extractor.extract_topics(&messages);
        let sentiment = extractor.analyze_sentiment(&messages);

        let items = extractor.generate_action_items(&messages, &topics, sentiment.sentiment);
        let retention = items
            .iter()
            .find(|item| item.category == ActionCategory::RetentionRisk)
            .expect("retention risk item");
        assert_eq!(retention.priority, ActionPriority::High);
    }

    #[test]
    fn rules_fire_independently() {
        let extractor = InsightExtractor::new();
        let messages = vec![message(
            MessageSender::Employee,
            "I'm frustrated with my workload, my manager is not helping, and my salary is behind \
             the market",
        )];
        let topics = extractor.extract_topics(&messages);
        let sentiment = extractor.analyze_sentiment(&messages);
        assert_eq!(sentiment.sentiment, Sentiment::Negative);

        let items = extractor.generate_action_items(&messages, &topics, sentiment.sentiment);
        let categories: Vec<_> = items.iter().map(|item| item.category).collect();
        assert!(categories.contains(&ActionCategory::Workload));
        assert!(categories.contains(&ActionCategory::ManagerRelationship));
        assert!(categories.contains(&ActionCategory::Compensation));
    }

    #[test]
    fn summary_names_participant_and_topics() {
        let extractor = InsightExtractor::new();
        let messages =
            vec![message(MessageSender::Employee, "my workload is stressful and my manager knows")];
        let topics = extractor.extract_topics(&messages);
        let sentiment = extractor.analyze_sentiment(&messages);

        let text = extractor.generate_summary(&messages, &topics, sentiment.sentiment, "Dana");
        assert!(text.starts_with("Dana"));
        assert!(text.contains("workload"));
    }

    #[test]
    fn summary_without_employee_messages_is_fixed() {
        let extractor = InsightExtractor::new();
        let messages = vec![message(MessageSender::Agent, "Checking in!")];
        let text = extractor.generate_summary(
            &messages,
            &BTreeSet::new(),
            Sentiment::Neutral,
            "Dana",
        );
        assert_eq!(text, "No employee responses yet.");
    }

    #[test]
    fn compare_without_previous_is_none() {
        let extractor = InsightExtractor::new();
        assert_eq!(
            extractor.compare_summaries(None, Sentiment::Positive, &BTreeSet::new()),
            None
        );
    }

    #[test]
    fn compare_reports_improvement_and_topic_shift() {
        let extractor = InsightExtractor::new();
        let previous = summary(Sentiment::Negative, &["workload"]);
        let current_topics: BTreeSet<String> = ["manager".to_string()].into_iter().collect();

        let notes = extractor
            .compare_summaries(Some(&previous), Sentiment::Positive, &current_topics)
            .expect("delta notes");

        assert!(notes.contains("improved"));
        assert!(notes.contains("New concerns: manager."));
        assert!(notes.contains("No longer mentioned: workload."));
    }

    #[test]
    fn compare_reports_decline() {
        let extractor = InsightExtractor::new();
        let previous = summary(Sentiment::Neutral, &["tooling"]);
        let current_topics: BTreeSet<String> = ["tooling".to_string()].into_iter().collect();

        let notes = extractor
            .compare_summaries(Some(&previous), Sentiment::Negative, &current_topics)
            .expect("delta notes");
        assert!(notes.contains("declined"));
    }

    #[test]
    fn compare_with_no_movement_is_fixed_string() {
        let extractor = InsightExtractor::new();
        let previous = summary(Sentiment::Neutral, &["growth"]);
        let current_topics: BTreeSet<String> = ["growth".to_string()].into_iter().collect();

        let notes = extractor
            .compare_summaries(Some(&previous), Sentiment::Neutral, &current_topics)
            .expect("delta notes");
        assert_eq!(notes, "No significant changes since the previous summary.");
    }

    #[test]
    fn analyze_links_previous_summary_and_message_range() {
        let extractor = InsightExtractor::new();
        let previous = summary(Sentiment::Negative, &["workload"]);
        let messages = vec![
            message(MessageSender::Agent, "How are things?"),
            message(MessageSender::Employee, "feeling grateful, my manager has been supportive"),
        ];

        let analyzed = extractor.analyze(
            &ConversationId("conv-1".to_string()),
            &messages,
            "Dana",
            Some(&previous),
        );

        assert_eq!(analyzed.previous_summary_id, Some(previous.id.clone()));
        assert_eq!(analyzed.first_message_id, Some(messages[0].id.clone()));
        assert_eq!(analyzed.last_message_id, Some(messages[1].id.clone()));
        assert_eq!(analyzed.message_count, 2);
        assert_eq!(analyzed.sentiment, Sentiment::Positive);
        assert!(analyzed.delta_notes.expect("delta notes").contains("improved"));
    }
}
