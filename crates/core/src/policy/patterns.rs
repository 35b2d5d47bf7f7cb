//! Pattern tables for the two-directional content filter.
//!
//! Each category is an ordered set of regular expressions; a category fires
//! when any of its patterns matches. The redaction placeholders contain no
//! digits, so redacting already-redacted text matches nothing.

use std::sync::LazyLock;

use regex::Regex;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|pattern| Regex::new(pattern).unwrap()).collect()
}

/// Self-harm and violence/weapon language in employee messages.
pub(crate) static SAFETY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\b(kill(ing)? myself|end(ing)? my life|suicidal?|suicide|self[- ]harm)\b",
        r"(?i)\b(hurt(ing)? myself|don'?t want to (live|be alive)|no reason to (live|go on)|want to die|better off without me)\b",
        r"(?i)\b(kill|hurt|shoot|stab|attack)\b.{0,24}\b(him|her|them|someone|everyone|people|my (boss|manager|coworker|team))\b",
        r"(?i)\b(gun|weapon|knife)\b.{0,24}\b(to work|to the office|tomorrow)\b",
    ])
});

/// Harassment reports or threats in employee messages.
pub(crate) static HARASSMENT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\b(harass(es|ed|ing|ment)?|bull(y|ies|ied|ying)|intimidat(e|es|ed|ing|ion))\b",
        r"(?i)\b(threaten(s|ed|ing)?|stalk(s|ed|ing)?)\b.{0,32}\b(me|her|him|them|us)\b",
        r"(?i)\b(unwanted|inappropriate)\b.{0,24}\b(touch(es|ed|ing)?|advances?|comments?|messages?|attention)\b",
        r"(?i)\bhostile\b.{0,16}\b(work(place)?|environment)\b",
    ])
});

/// Discriminatory-treatment language in employee messages.
pub(crate) static DISCRIMINATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\bdiscriminat(e|es|ed|ing|ion|ory)\b",
        r"(?i)\b(racist|sexist|ageist|homophobic|transphobic|xenophobic|ableist)\b",
        r"(?i)\b(because of|due to)\b.{0,24}\b(my|her|his|their)\b.{0,16}\b(race|gender|age|religion|disability|pregnancy|nationality|accent|orientation|skin)\b",
        r"(?i)\b(passed over|paid less|excluded|demoted)\b.{0,40}\b(race|gender|age|religion|disability|orientation|pregnan)",
    ])
});

/// Regulated-personal-data requests in agent drafts, by violation kind.
pub(crate) static SENSITIVE_REQUEST_PATTERNS: LazyLock<Vec<(&'static str, Vec<Regex>)>> =
    LazyLock::new(|| {
        vec![
            ("ssn_request", compile(&[r"(?i)\b(ssn|social security number|social security)\b"])),
            (
                "bank_account_request",
                compile(&[
                    r"(?i)\b(bank account|account number|routing number|iban|sort code)\b",
                    r"(?i)\bdirect deposit\b.{0,24}\b(details|info|number)\b",
                ]),
            ),
            (
                "credit_card_request",
                compile(&[r"(?i)\b(credit card|debit card|card number|cvv|cvc)\b"]),
            ),
            (
                "medical_status_request",
                compile(&[
                    r"(?i)\b(medical (history|condition|status|records?)|diagnos(is|es|ed)|medications?|disabilit(y|ies))\b",
                ]),
            ),
            (
                "immigration_status_request",
                compile(&[
                    r"(?i)\b(immigration status|visa status|work (permit|authorization)|citizenship|green card)\b",
                ]),
            ),
        ]
    });

/// Guilt-style or coercive phrasing in agent drafts.
pub(crate) static MANIPULATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\byou (have|need) to tell me\b",
        r"(?i)\bif you (really|truly) (care|valued)\b",
        r"(?i)\byou owe (me|it to)\b",
        r"(?i)\b(everyone else (already )?(told|shared|answered)|don'?t you trust me)\b",
        r"(?i)\b(it would be a shame|you wouldn'?t want .{0,24} to find out)\b",
    ])
});

pub(crate) static SSN_REDACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

pub(crate) static CARD_REDACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}[ -]?\d{4}[ -]?\d{4}[ -]?\d{3,4}\b").unwrap());

pub(crate) static ACCOUNT_REDACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(account|routing)\s*(number|no\.?|#)?\s*[:#]?\s*\d{6,17}\b").unwrap()
});

pub(crate) const SSN_PLACEHOLDER: &str = "[REDACTED-SSN]";
pub(crate) const CARD_PLACEHOLDER: &str = "[REDACTED-CARD]";
pub(crate) const ACCOUNT_PLACEHOLDER: &str = "[REDACTED-ACCOUNT]";

pub(crate) fn any_match(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|pattern| pattern.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::{
        any_match, DISCRIMINATION_PATTERNS, HARASSMENT_PATTERNS, MANIPULATION_PATTERNS,
        SAFETY_PATTERNS, SENSITIVE_REQUEST_PATTERNS,
    };

    #[test]
    fn safety_patterns_catch_self_harm_phrasings() {
        for text in [
            "I don't want to live anymore",
            "I've been thinking about ending my life",
            "sometimes I want to hurt myself",
            "feeling suicidal lately",
        ] {
            assert!(any_match(&SAFETY_PATTERNS, text), "expected safety match: {text}");
        }
    }

    #[test]
    fn safety_patterns_ignore_ordinary_venting() {
        for text in [
            "this sprint is killing me",
            "the deadline is brutal",
            "I could murder a coffee right now",
        ] {
            assert!(!any_match(&SAFETY_PATTERNS, text), "unexpected safety match: {text}");
        }
    }

    #[test]
    fn harassment_patterns_catch_reports() {
        assert!(any_match(&HARASSMENT_PATTERNS, "my teammate keeps harassing me in standup"));
        assert!(any_match(&HARASSMENT_PATTERNS, "he made inappropriate comments again"));
    }

    #[test]
    fn discrimination_patterns_catch_unequal_treatment() {
        assert!(any_match(
            &DISCRIMINATION_PATTERNS,
            "I was passed over for promotion because of my age"
        ));
        assert!(any_match(&DISCRIMINATION_PATTERNS, "the team lead made sexist remarks"));
    }

    #[test]
    fn sensitive_request_kinds_are_distinct() {
        let kinds: Vec<&str> =
            SENSITIVE_REQUEST_PATTERNS.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![
                "ssn_request",
                "bank_account_request",
                "credit_card_request",
                "medical_status_request",
                "immigration_status_request"
            ]
        );
    }

    #[test]
    fn manipulation_patterns_catch_guilt_phrasing() {
        assert!(any_match(&MANIPULATION_PATTERNS, "You have to tell me what happened"));
        assert!(any_match(&MANIPULATION_PATTERNS, "if you really care about the team, share it"));
    }
}
