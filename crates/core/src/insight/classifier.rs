use std::collections::BTreeSet;

use crate::domain::summary::Sentiment;

/// Topic and sentiment detection over employee text. The default is the
/// keyword table below; a statistical model can implement the same trait
/// without touching the extractor or its callers.
pub trait Classifier: Send + Sync {
    fn classify_topics(&self, text: &str) -> BTreeSet<String>;
    fn score_sentiment(&self, text: &str) -> SentimentScore;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SentimentScore {
    pub sentiment: Sentiment,
    pub score: f64,
}

impl SentimentScore {
    pub fn neutral() -> Self {
        Self { sentiment: Sentiment::Neutral, score: 0.0 }
    }
}

/// Topic name -> phrases that signal it. A topic is included when any of its
/// phrases occurs at least once; there is no frequency weighting.
const TOPIC_TABLE: &[(&str, &[&str])] = &[
    ("workload", &["workload", "overloaded", "overwhelmed", "too much work", "deadlines", "overtime", "burnout", "burned out", "burnt out", "capacity"]),
    ("manager", &["manager", "my boss", "supervisor", "leadership", "1:1", "one-on-one"]),
    ("compensation", &["compensation", "salary", "pay ", "paid", "raise", "bonus", "equity", "underpaid"]),
    ("culture", &["culture", "values", "morale", "toxic", "inclusive", "belonging"]),
    ("tooling", &["tooling", "tools", "laptop", "software", "build times", "ci ", "infrastructure", "equipment"]),
    ("growth", &["growth", "career", "promotion", "learning", "development", "mentorship", "stagnant", "stuck in my role"]),
    ("work-life balance", &["work-life", "work life", "balance", "hours", "weekends", "vacation", "pto", "time off", "flexibility"]),
    ("communication", &["communication", "unclear", "out of the loop", "transparency", "silo", "not informed"]),
    ("team dynamics", &["team dynamics", "teammates", "collaboration", "conflict", "friction", "my team"]),
    ("recognition", &["recognition", "recognized", "appreciated", "unappreciated", "credit", "acknowledged", "thankless"]),
];

const POSITIVE_INDICATORS: &[&str] = &[
    "great", "good", "happy", "excited", "enjoy", "love", "appreciate", "thankful", "grateful",
    "productive", "motivated", "supported", "proud", "fantastic", "better", "improving", "well",
];

const NEGATIVE_INDICATORS: &[&str] = &[
    "bad", "unhappy", "frustrated", "frustrating", "stressed", "stressful", "overwhelmed",
    "exhausted", "tired", "worried", "anxious", "difficult", "struggling", "burnout", "burned out",
    "worse", "hate", "annoyed", "disappointed", "piling up", "behind", "unfair",
];

/// Hand-rolled keyword classifier. Deterministic for identical input.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl Classifier for KeywordClassifier {
    fn classify_topics(&self, text: &str) -> BTreeSet<String> {
        let normalized = normalize(text);
        let mut topics = BTreeSet::new();

        for (topic, phrases) in TOPIC_TABLE {
            if phrases.iter().any(|phrase| normalized.contains(phrase)) {
                topics.insert((*topic).to_string());
            }
        }

        topics
    }

    fn score_sentiment(&self, text: &str) -> SentimentScore {
        let normalized = normalize(text);
        let positive = count_occurrences(&normalized, POSITIVE_INDICATORS);
        let negative = count_occurrences(&normalized, NEGATIVE_INDICATORS);

        if positive == 0 && negative == 0 {
            return SentimentScore::neutral();
        }

        let score = (positive as f64 - negative as f64) / (positive + negative) as f64;
        let sentiment = if score > 0.3 {
            Sentiment::Positive
        } else if score < -0.3 {
            Sentiment::Negative
        } else if positive > 0 && negative > 0 {
            Sentiment::Mixed
        } else {
            Sentiment::Neutral
        };

        SentimentScore { sentiment, score }
    }
}

impl<C> Classifier for std::sync::Arc<C>
where
    C: Classifier + ?Sized,
{
    fn classify_topics(&self, text: &str) -> BTreeSet<String> {
        (**self).classify_topics(text)
    }

    fn score_sentiment(&self, text: &str) -> SentimentScore {
        (**self).score_sentiment(text)
    }
}

fn normalize(text: &str) -> String {
    text.to_ascii_lowercase()
}

fn count_occurrences(normalized: &str, indicators: &[&str]) -> usize {
    indicators.iter().map(|indicator| normalized.matches(indicator).count()).sum()
}
