//! Strategy extraction and relevance scoring shared by the local backends.
//!
//! When an event is appended, each configured strategy derives long-term
//! records from the user's messages and files them under its namespace.
//! Retrieval ranks those records by term overlap with the query.

use std::collections::HashSet;

use regex::Regex;

use crate::memory::core::strategy::StrategyKind;
use crate::memory::service::{EventMessage, MessageRole};

/// A pattern that marks a message as relevant to a strategy.
struct PatternRule {
    pattern: Regex,
    kind: StrategyKind,
}

/// Heuristic extractor turning user messages into strategy records.
pub struct StrategyExtractor {
    min_record_chars: usize,
    rules: Vec<PatternRule>,
}

impl StrategyExtractor {
    /// Minimum trimmed length for a message to become a record.
    pub const DEFAULT_MIN_RECORD_CHARS: usize = 20;

    /// Create an extractor with the built-in broker patterns.
    ///
    /// # Errors
    /// Returns an error if any regex pattern is invalid.
    pub fn new() -> Result<Self, regex::Error> {
        let rules = vec![
            // Stated likes, dislikes and choices
            PatternRule {
                pattern: Regex::new(r"(?i)\b(i|we)\s+(like|love|prefer|favou?r|avoid|dislike)\b")?,
                kind: StrategyKind::UserPreference,
            },
            // Risk appetite
            PatternRule {
                pattern: Regex::new(r"(?i)\b(risk\s+(tolerance|appetite|profile)|conservative|moderate|aggressive)\b")?,
                kind: StrategyKind::UserPreference,
            },
            // Areas of interest
            PatternRule {
                pattern: Regex::new(r"(?i)\b(interested in|focus(ed)? on|looking (for|at)|my clients?|investment style)\b")?,
                kind: StrategyKind::UserPreference,
            },
            // Explicit profile updates
            PatternRule {
                pattern: Regex::new(r"(?i)\b(update my (financial )?profile|preferences?)\b")?,
                kind: StrategyKind::UserPreference,
            },
        ];

        Ok(Self {
            min_record_chars: Self::DEFAULT_MIN_RECORD_CHARS,
            rules,
        })
    }

    /// Derive records for one strategy from an event's messages.
    #[must_use]
    pub fn extract(&self, kind: StrategyKind, messages: &[EventMessage]) -> Vec<String> {
        messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.text.trim())
            .filter(|text| text.chars().count() >= self.min_record_chars)
            .filter(|text| self.qualifies(kind, text))
            .map(str::to_string)
            .collect()
    }

    fn qualifies(&self, kind: StrategyKind, text: &str) -> bool {
        match kind {
            StrategyKind::UserPreference => self
                .rules
                .iter()
                .any(|rule| rule.kind == kind && rule.pattern.is_match(text)),
            StrategyKind::Semantic => true,
            // Summaries are rolled up per session, not per message.
            StrategyKind::Summary => false,
        }
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of query terms present in the record text.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn relevance(query: &str, text: &str) -> f64 {
    let query_terms = terms(query);
    if query_terms.is_empty() {
        return 0.0;
    }
    let text_terms = terms(text);
    let hits = query_terms.intersection(&text_terms).count();
    hits as f64 / query_terms.len() as f64
}

/// Rank `(text, seq)` candidates by relevance, newest first on ties.
#[must_use]
pub fn rank(query: &str, candidates: Vec<(String, i64)>, top_k: usize) -> Vec<(String, f64)> {
    let mut scored: Vec<(String, f64, i64)> = candidates
        .into_iter()
        .map(|(text, seq)| {
            let score = relevance(query, &text);
            (text, score, seq)
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(b.2.cmp(&a.2)));
    scored
        .into_iter()
        .take(top_k)
        .map(|(text, score, _)| (text, score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_records_need_a_cue() {
        let extractor = StrategyExtractor::new().unwrap();
        let messages = vec![
            EventMessage::user("I prefer large-cap tech with a moderate risk tolerance"),
            EventMessage::user("What is the weather like on Mars today?"),
            EventMessage::assistant("I prefer to answer market questions only, thanks."),
        ];
        let records = extractor.extract(StrategyKind::UserPreference, &messages);
        assert_eq!(
            records,
            vec!["I prefer large-cap tech with a moderate risk tolerance".to_string()]
        );
    }

    #[test]
    fn semantic_keeps_every_long_user_message() {
        let extractor = StrategyExtractor::new().unwrap();
        let messages = vec![
            EventMessage::user("short"),
            EventMessage::user("Our desk covers European banks and utilities."),
        ];
        assert_eq!(extractor.extract(StrategyKind::Semantic, &messages).len(), 1);
        assert!(extractor.extract(StrategyKind::Summary, &messages).is_empty());
    }

    #[test]
    fn ranking_prefers_overlap_then_recency() {
        let ranked = rank(
            "investment preferences risk tolerance",
            vec![
                ("likes golf".to_string(), 1),
                ("moderate risk tolerance".to_string(), 2),
                ("older unrelated note".to_string(), 0),
                ("newer unrelated note".to_string(), 3),
            ],
            3,
        );
        assert_eq!(ranked[0].0, "moderate risk tolerance");
        assert_eq!(ranked[1].0, "newer unrelated note");
        assert_eq!(ranked.len(), 3);
    }
}
