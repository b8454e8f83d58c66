//! Actor identity resolution.
//!
//! Maps free-text user messages to a stable actor key. First match wins:
//! 1. A `Name: <value>` field (broker card format).
//! 2. A self-introduction ("I'm ...", "My name is ...", "This is ...") of at
//!    most three words, ending at "from", "at", punctuation or end of text.
//! 3. A content hash of the lowercased message for anonymous users.
//!
//! The same exact message always resolves to the same key. Two different
//! anonymous phrasings from the same person do not.

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::memory::core::ids::ActorId;

/// Longest accepted introduction, in whitespace-separated words.
pub const MAX_NAME_WORDS: usize = 3;

/// Hex chars of the message hash kept for anonymous keys.
pub const HASH_PREFIX_LEN: usize = 8;

/// Deterministic, total resolver from message text to [`ActorId`].
pub struct ActorResolver {
    name_field: Regex,
    introductions: Vec<Regex>,
}

impl ActorResolver {
    /// Compile the resolver patterns.
    ///
    /// # Errors
    /// Returns an error if any regex pattern is invalid.
    pub fn new() -> Result<Self, regex::Error> {
        let name_field = Regex::new(r"(?i)Name:\s*([^\n]+)")?;
        let introductions = vec![
            Regex::new(r"(?i)\bI'?m\s+([A-Z][a-zA-Z\s]+?)(?:\s+from|\s+at|\s*[,.]|$)")?,
            Regex::new(r"(?i)\bMy name is\s+([A-Z][a-zA-Z\s]+?)(?:\s+from|\s+at|\s*[,.]|$)")?,
            Regex::new(r"(?i)\bThis is\s+([A-Z][a-zA-Z\s]+?)(?:\s+from|\s+at|\s*[,.]|$)")?,
        ];
        Ok(Self {
            name_field,
            introductions,
        })
    }

    /// Resolve a message to an actor key. Never fails.
    #[must_use]
    pub fn resolve(&self, message: &str) -> ActorId {
        if let Some(name) = self.structured_name(message) {
            debug!("Resolved actor from name field");
            return broker_key(name);
        }

        if let Some(name) = self.introduced_name(message) {
            debug!("Resolved actor from introduction");
            return broker_key(name);
        }

        anonymous_key(message)
    }

    fn structured_name<'a>(&self, message: &'a str) -> Option<&'a str> {
        let name = self.name_field.captures(message)?.get(1)?.as_str().trim();
        (!name.is_empty() && !name.eq_ignore_ascii_case("unknown")).then_some(name)
    }

    fn introduced_name<'a>(&self, message: &'a str) -> Option<&'a str> {
        self.introductions.iter().find_map(|pattern| {
            let name = pattern.captures(message)?.get(1)?.as_str().trim();
            (name.split_whitespace().count() <= MAX_NAME_WORDS).then_some(name)
        })
    }
}

/// Lowercase and replace every char outside `[a-zA-Z0-9]` with `_`.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn broker_key(name: &str) -> ActorId {
    ActorId::new(format!("broker_{}", normalize_name(name)))
}

fn anonymous_key(message: &str) -> ActorId {
    let digest = Sha256::digest(message.to_lowercase().as_bytes());
    let hex = hex::encode(digest);
    ActorId::new(format!("user_{}", &hex[..HASH_PREFIX_LEN]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ActorResolver {
        ActorResolver::new().unwrap()
    }

    #[test]
    fn name_field_wins_over_introduction() {
        let actor = resolver().resolve("Name: Jane Doe\nI'm someone else");
        assert_eq!(actor.as_str(), "broker_jane_doe");
    }

    #[test]
    fn unknown_name_falls_through() {
        let actor = resolver().resolve("Name: Unknown");
        assert_ne!(actor.as_str(), "broker_unknown");
        assert!(actor.as_str().starts_with("user_"));
    }

    #[test]
    fn unknown_name_falls_through_to_introduction() {
        let actor = resolver().resolve("Name: unknown\nMy name is Sarah Lee, from Chicago");
        assert_eq!(actor.as_str(), "broker_sarah_lee");
    }

    #[test]
    fn introduction_stops_at_from() {
        let actor = resolver().resolve("Hi, I'm Tim Dunk from Goldman Sachs");
        assert_eq!(actor.as_str(), "broker_tim_dunk");
    }

    #[test]
    fn introduction_variants() {
        let resolver = resolver();
        assert_eq!(
            resolver.resolve("This is Maria at Morgan Stanley").as_str(),
            "broker_maria"
        );
        assert_eq!(
            resolver.resolve("my name is ana de souza.").as_str(),
            "broker_ana_de_souza"
        );
    }

    #[test]
    fn long_introductions_are_rejected() {
        let actor = resolver().resolve("I'm interested in large cap tech stocks");
        assert!(actor.as_str().starts_with("user_"));
    }

    #[test]
    fn introduction_needs_word_boundary() {
        // "im" inside "Tim" is not an introduction.
        let actor = resolver().resolve("Tim Cook news please");
        assert!(actor.as_str().starts_with("user_"));
    }

    #[test]
    fn fallback_is_deterministic_and_distinct() {
        let resolver = resolver();
        let first = resolver.resolve("asdkjasd 9238");
        let second = resolver.resolve("asdkjasd 9238");
        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), "user_".len() + HASH_PREFIX_LEN);
        assert_ne!(first, resolver.resolve("asdkjasd 9239"));
    }

    #[test]
    fn fallback_ignores_case() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("HELLO THERE"), resolver.resolve("hello there"));
    }

    #[test]
    fn empty_input_still_resolves() {
        let resolver = resolver();
        assert!(resolver.resolve("").as_str().starts_with("user_"));
        assert!(resolver.resolve("   \n").as_str().starts_with("user_"));
        assert!(resolver.resolve("Name:   ").as_str().starts_with("user_"));
    }

    #[test]
    fn normalization_replaces_non_alphanumerics() {
        assert_eq!(normalize_name("O'Neil-Smith Jr"), "o_neil_smith_jr");
        assert_eq!(normalize_name("José"), "jos_");
    }
}
