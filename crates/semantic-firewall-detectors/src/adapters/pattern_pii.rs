//! Pattern-based PII detector (variant id `presidio`)
//!
//! Recognizes personal-data entities with weighted regexes and returns the
//! maximum weight across everything found. Credit-card candidates must pass
//! a Luhn check before they count.
//!
//! Entity weights: SSN / credit card 0.9, email 0.7, phone 0.6, person name
//! and date 0.5, anything else (IP, URL) 0.4.

use crate::ports::PiiDetector;
use regex::Regex;
use semantic_firewall_core::Result;
use std::sync::LazyLock;

static SSN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

static CREDIT_CARD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d{4}[-\s]?){3}\d{4}\b").unwrap());

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").unwrap());

static PERSON_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+\s+[A-Z][a-z]+\b").unwrap());

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{1,2}[-/]\d{1,2}[-/]\d{4}|\d{4}[-/]\d{1,2}[-/]\d{1,2})\b").unwrap()
});

static IP_ADDRESS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap());

/// Luhn checksum for credit-card candidates
fn validate_luhn(digits: &str) -> bool {
    let digits: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 13 {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}

/// Score text by its strongest PII entity, 0.0 when nothing is found
pub fn pattern_pii_score(text: &str) -> f32 {
    let mut score: f32 = 0.0;

    if SSN_PATTERN.is_match(text) {
        score = score.max(0.9);
    }

    for candidate in CREDIT_CARD_PATTERN.find_iter(text) {
        let digits: String = candidate
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        if validate_luhn(&digits) {
            score = score.max(0.9);
        }
    }

    if EMAIL_PATTERN.is_match(text) {
        score = score.max(0.7);
    }

    if PHONE_PATTERN.is_match(text) {
        score = score.max(0.6);
    }

    if PERSON_NAME_PATTERN.is_match(text) || DATE_PATTERN.is_match(text) {
        score = score.max(0.5);
    }

    if IP_ADDRESS_PATTERN.is_match(text) {
        score = score.max(0.4);
    }

    score.min(1.0)
}

/// Weighted-pattern PII detector
#[derive(Debug, Default)]
pub struct PatternPiiDetector;

impl PatternPiiDetector {
    pub fn new() -> Self {
        Self
    }
}

impl PiiDetector for PatternPiiDetector {
    fn name(&self) -> &str {
        "presidio"
    }

    fn detect(&self, text: &str) -> Result<f32> {
        Ok(pattern_pii_score(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssn_scores_high() {
        let score = pattern_pii_score("my SSN is 123-45-6789");
        assert!(score >= 0.9);
    }

    #[test]
    fn test_valid_credit_card() {
        // Passes Luhn
        let score = pattern_pii_score("card: 4532-0151-1283-0366");
        assert!(score >= 0.9);
    }

    #[test]
    fn test_invalid_credit_card_ignored() {
        let score = pattern_pii_score("card: 1234-5678-9012-3456");
        assert!(score < 0.9);
    }

    #[test]
    fn test_email() {
        assert_eq!(pattern_pii_score("reach me at alice@example.com"), 0.7);
    }

    #[test]
    fn test_phone() {
        assert_eq!(pattern_pii_score("call 555-867-5309 today"), 0.6);
    }

    #[test]
    fn test_person_name() {
        assert_eq!(pattern_pii_score("contact Jane Smith about this"), 0.5);
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(pattern_pii_score("the quick brown fox"), 0.0);
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(pattern_pii_score(""), 0.0);
    }

    #[test]
    fn test_max_across_entities() {
        // Email (0.7) and SSN (0.9) together score the max, not the sum
        let score = pattern_pii_score("alice@example.com SSN 123-45-6789");
        assert_eq!(score, 0.9);
    }

    #[test]
    fn test_luhn() {
        assert!(validate_luhn("4532015112830366"));
        assert!(!validate_luhn("1234567890123456"));
        assert!(!validate_luhn("123"));
    }

    #[test]
    fn test_detector_port() {
        let detector = PatternPiiDetector::new();
        assert_eq!(detector.name(), "presidio");
        assert!(detector.detect("email: a@b.co").unwrap() > 0.0);
    }
}
