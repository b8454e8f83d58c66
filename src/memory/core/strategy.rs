//! Memory strategy kinds and their namespace templates.
//!
//! A strategy is a named retrieval configuration attached to a store at
//! creation time. Each one owns a namespace template with an actor
//! placeholder, so every broker gets an isolated partition per strategy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::memory::core::ids::ActorId;

/// Placeholder substituted with the actor key in namespace templates.
pub const ACTOR_PLACEHOLDER: &str = "{actorId}";

/// Kind of retrieval strategy.
///
/// Ordering follows declaration order and is used for stable profile output.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyKind {
    /// Preferences, risk tolerance, investment style.
    UserPreference,
    /// Facts and insights stated during conversation.
    Semantic,
    /// Rolling session summaries.
    Summary,
}

impl StrategyKind {
    /// All kinds, in display order.
    pub const ALL: [Self; 3] = [Self::UserPreference, Self::Semantic, Self::Summary];

    /// Stable upper-case identifier used by the backing service and profile tags.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserPreference => "USER_PREFERENCE",
            Self::Semantic => "SEMANTIC",
            Self::Summary => "SUMMARY",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown strategy kind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StrategyKindParseError(pub String);

impl fmt::Display for StrategyKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown strategy kind: {}", self.0)
    }
}

impl std::error::Error for StrategyKindParseError {}

impl FromStr for StrategyKind {
    type Err = StrategyKindParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "USER_PREFERENCE" | "USERPREFERENCE" => Ok(Self::UserPreference),
            "SEMANTIC" => Ok(Self::Semantic),
            "SUMMARY" => Ok(Self::Summary),
            _ => Err(StrategyKindParseError(value.to_string())),
        }
    }
}

/// One strategy as configured on a store.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Strategy kind.
    pub kind: StrategyKind,
    /// Human-readable strategy name.
    pub name: String,
    /// What the strategy captures.
    pub description: String,
    /// Namespace templates; the first one is authoritative.
    pub namespaces: Vec<String>,
}

impl StrategyConfig {
    /// Build a strategy with a single namespace template.
    #[must_use]
    pub fn new(
        kind: StrategyKind,
        name: impl Into<String>,
        description: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            description: description.into(),
            namespaces: vec![namespace.into()],
        }
    }

    /// First namespace template, if any.
    #[must_use]
    pub fn primary_namespace(&self) -> Option<&str> {
        self.namespaces.first().map(String::as_str)
    }
}

/// Substitute an actor into a namespace template.
#[must_use]
pub fn namespace_for(template: &str, actor: &ActorId) -> String {
    template.replace(ACTOR_PLACEHOLDER, actor.as_str())
}

/// Default strategy set for the broker store.
#[must_use]
pub fn default_strategies() -> Vec<StrategyConfig> {
    vec![
        StrategyConfig::new(
            StrategyKind::UserPreference,
            "BrokerPreferences",
            "Captures broker preferences, risk tolerance, and investment styles",
            "market-trends/broker/{actorId}/preferences",
        ),
        StrategyConfig::new(
            StrategyKind::Semantic,
            "MarketTrendsSemantic",
            "Stores financial facts, market analysis, and investment insights",
            "market-trends/broker/{actorId}/semantic",
        ),
    ]
}
