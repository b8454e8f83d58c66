//! Profile aggregation over every strategy namespace.
//!
//! Reads are best effort. Strategy results come first; when none survive
//! the length filter, recent conversation history is scanned for
//! profile-related messages; after that a fixed informational text is
//! returned. Faults never escape as errors, but [`ProfileReport`] keeps
//! them next to the outcome so callers can tell an empty profile from an
//! unreachable one.

use std::fmt;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::memory::core::config::ProfileConfig;
use crate::memory::core::ids::{ActorId, SessionId};
use crate::memory::core::strategy::{StrategyKind, namespace_for};
use crate::memory::namespaces::try_namespaces;
use crate::memory::provisioning::StoreHandle;
use crate::memory::service::{Event, EventQuery, RecordQuery};

const PROFILE_HEADER: &str = "Broker Financial Profile:\n";
const HISTORY_HEADER: &str = "Broker Profile (from conversation history):\n";
const BUILDING_TEXT: &str = "Building financial profile from our conversations. Profile will be enhanced as we continue our discussions.";
const NOT_FOUND_TEXT: &str = "No financial profile found for this broker yet. This will be created as we learn about their investment preferences.";
const UNAVAILABLE_TEXT: &str = "Unable to retrieve financial profile at this time";

/// A kept strategy fragment.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfileFragment {
    /// Strategy that produced it.
    pub kind: StrategyKind,
    /// Trimmed fragment text.
    pub text: String,
}

/// What the aggregator could assemble.
#[derive(Clone, Debug, PartialEq)]
pub enum ProfileOutcome {
    /// Fragments from the strategy namespaces.
    Merged(Vec<ProfileFragment>),
    /// Excerpts of the most recent profile-related messages.
    FromHistory(Vec<String>),
    /// Events exist but none mention the profile yet.
    Building,
    /// No fragments and no events.
    NotFound,
    /// The history fallback could not be read.
    Unavailable {
        /// Underlying failure.
        reason: String,
    },
}

/// Profile outcome plus every fault met on the way.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfileReport {
    /// Final outcome.
    pub outcome: ProfileOutcome,
    /// Soft failures (namespace resolution, per-strategy retrieval).
    pub faults: Vec<String>,
}

impl ProfileReport {
    /// Whether any part of the read path failed.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.faults.is_empty() || matches!(self.outcome, ProfileOutcome::Unavailable { .. })
    }
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            ProfileOutcome::Merged(fragments) => {
                let body: Vec<String> = fragments
                    .iter()
                    .map(|fragment| format!("[{}] {}", fragment.kind, fragment.text))
                    .collect();
                write!(f, "{PROFILE_HEADER}{}", body.join("\n\n"))
            }
            ProfileOutcome::FromHistory(excerpts) => {
                write!(f, "{HISTORY_HEADER}{}", excerpts.join("\n\n"))
            }
            ProfileOutcome::Building => f.write_str(BUILDING_TEXT),
            ProfileOutcome::NotFound => f.write_str(NOT_FOUND_TEXT),
            ProfileOutcome::Unavailable { .. } => f.write_str(UNAVAILABLE_TEXT),
        }
    }
}

/// Result of probing the strategy namespaces for an actor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// At least one strategy holds a record.
    Existing,
    /// No strategy holds anything yet.
    New,
    /// The strategies could not be resolved.
    Unavailable {
        /// Underlying failure.
        reason: String,
    },
}

/// Identified broker, rendered as an `ACTOR_ID:/STATUS:/ACTION:` block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerIdentity {
    /// Resolved actor.
    pub actor: ActorId,
    /// Probe result.
    pub probe: ProbeOutcome,
}

impl fmt::Display for BrokerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actor = &self.actor;
        match &self.probe {
            ProbeOutcome::Existing => write!(
                f,
                "ACTOR_ID: {actor}\nSTATUS: Existing broker found\nACTION: Use get_broker_financial_profile('{actor}') to retrieve their stored preferences."
            ),
            ProbeOutcome::New => write!(
                f,
                "ACTOR_ID: {actor}\nSTATUS: New broker\nACTION: Use update_broker_financial_interests(profile_info, '{actor}') to store their preferences."
            ),
            ProbeOutcome::Unavailable { reason } => write!(
                f,
                "ACTOR_ID: {actor}\nSTATUS: Unable to check existing profile\nERROR: {reason}\nACTION: Proceed as new broker and use update_broker_financial_interests(profile_info, '{actor}')"
            ),
        }
    }
}

/// Recent conversation, one `ROLE: excerpt...` line per message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HistoryView {
    /// Formatted lines, oldest first.
    Entries(Vec<String>),
    /// Events exist but carry no text.
    NothingMeaningful,
    /// No events, or they could not be read.
    Empty,
}

impl fmt::Display for HistoryView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entries(lines) => write!(f, "Recent conversation history:\n{}", lines.join("\n")),
            Self::NothingMeaningful => f.write_str("No meaningful conversation history found"),
            Self::Empty => f.write_str("No conversation history available"),
        }
    }
}

/// Read-side view of broker memory.
#[derive(Clone, Debug)]
pub struct ProfileAggregator {
    handle: StoreHandle,
    config: ProfileConfig,
}

impl ProfileAggregator {
    /// Create an aggregator over a resolved store.
    #[must_use]
    pub const fn new(handle: StoreHandle, config: ProfileConfig) -> Self {
        Self { handle, config }
    }

    /// Store this aggregator reads from.
    #[must_use]
    pub const fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    /// Assemble the profile of an actor. Never fails.
    pub async fn profile_for(&self, actor: &ActorId, session: &SessionId) -> ProfileReport {
        let mut faults = Vec::new();
        let fragments = self.strategy_fragments(actor, &mut faults).await;
        if !fragments.is_empty() {
            debug!(actor = %actor, count = fragments.len(), "Profile assembled from strategies");
            return ProfileReport {
                outcome: ProfileOutcome::Merged(fragments),
                faults,
            };
        }

        let outcome = match self.recent_events(actor, session, self.config.history_event_limit).await {
            Ok(events) if events.is_empty() => ProfileOutcome::NotFound,
            Ok(events) => {
                let excerpts = self.history_excerpts(&events);
                if excerpts.is_empty() {
                    ProfileOutcome::Building
                } else {
                    ProfileOutcome::FromHistory(excerpts)
                }
            }
            Err(reason) => {
                warn!(actor = %actor, %reason, "Reading conversation history for profile failed");
                ProfileOutcome::Unavailable { reason }
            }
        };
        ProfileReport { outcome, faults }
    }

    /// Whether any strategy namespace already holds a record for the actor.
    pub async fn probe(&self, actor: &ActorId) -> ProbeOutcome {
        let namespaces = match try_namespaces(&self.handle).await {
            Ok(namespaces) => namespaces,
            Err(err) => {
                warn!(actor = %actor, %err, "Probing broker profile failed");
                return ProbeOutcome::Unavailable {
                    reason: err.to_string(),
                };
            }
        };

        for (kind, template) in namespaces {
            let query = RecordQuery {
                store_id: self.handle.store_id().clone(),
                namespace: namespace_for(&template, actor),
                query: self.config.probe_query.clone(),
                top_k: self.config.probe_top_k,
            };
            match self.handle.service().retrieve_records(query).await {
                Ok(records) if !records.is_empty() => return ProbeOutcome::Existing,
                Ok(_) => {}
                Err(err) => debug!(strategy = %kind, %err, "No records for probe"),
            }
        }
        ProbeOutcome::New
    }

    /// Last few events of the actor's session, formatted for display.
    pub async fn conversation_history(&self, actor: &ActorId, session: &SessionId) -> HistoryView {
        let events = match self.recent_events(actor, session, self.config.history_event_limit).await {
            Ok(events) => events,
            Err(reason) => {
                warn!(actor = %actor, %reason, "Reading conversation history failed");
                return HistoryView::Empty;
            }
        };
        if events.is_empty() {
            return HistoryView::Empty;
        }

        let skip = events.len().saturating_sub(self.config.view_events);
        let lines: Vec<String> = events
            .iter()
            .skip(skip)
            .flat_map(|event| &event.messages)
            .filter_map(|message| {
                let text = message.text.trim();
                (!text.is_empty()).then(|| {
                    let head: String = text.chars().take(self.config.view_excerpt_chars).collect();
                    format!("{}: {head}...", message.role)
                })
            })
            .collect();

        if lines.is_empty() {
            HistoryView::NothingMeaningful
        } else {
            HistoryView::Entries(lines)
        }
    }

    async fn strategy_fragments(
        &self,
        actor: &ActorId,
        faults: &mut Vec<String>,
    ) -> Vec<ProfileFragment> {
        let namespaces = match try_namespaces(&self.handle).await {
            Ok(namespaces) => namespaces,
            Err(err) => {
                warn!(store_id = %self.handle.store_id(), %err, "Resolving strategy namespaces failed");
                faults.push(format!("namespaces: {err}"));
                return Vec::new();
            }
        };

        let lookups = namespaces.into_iter().map(|(kind, template)| {
            let query = RecordQuery {
                store_id: self.handle.store_id().clone(),
                namespace: namespace_for(&template, actor),
                query: self.config.profile_query.clone(),
                top_k: self.config.top_k,
            };
            async move { (kind, self.handle.service().retrieve_records(query).await) }
        });

        let mut fragments = Vec::new();
        for (kind, result) in join_all(lookups).await {
            match result {
                Ok(records) => fragments.extend(
                    records
                        .into_iter()
                        .map(|record| record.text.trim().to_string())
                        .filter(|text| text.chars().count() > self.config.min_fragment_chars)
                        .map(|text| ProfileFragment { kind, text }),
                ),
                Err(err) => {
                    warn!(actor = %actor, strategy = %kind, %err, "Strategy retrieval failed");
                    faults.push(format!("{kind}: {err}"));
                }
            }
        }
        fragments
    }

    async fn recent_events(
        &self,
        actor: &ActorId,
        session: &SessionId,
        max_results: usize,
    ) -> Result<Vec<Event>, String> {
        let query = EventQuery {
            store_id: self.handle.store_id().clone(),
            actor: actor.clone(),
            session: session.clone(),
            max_results,
        };
        self.handle
            .service()
            .list_events(query)
            .await
            .map_err(|err| err.to_string())
    }

    fn history_excerpts(&self, events: &[Event]) -> Vec<String> {
        let mut excerpts: Vec<String> = events
            .iter()
            .flat_map(|event| &event.messages)
            .map(|message| message.text.as_str())
            .filter(|text| self.mentions_profile(text))
            .filter(|text| text.chars().count() > self.config.min_history_message_chars)
            .map(|text| excerpt(text, self.config.history_excerpt_chars))
            .collect();
        let skip = excerpts.len().saturating_sub(self.config.history_keep_last);
        excerpts.drain(..skip);
        excerpts
    }

    fn mentions_profile(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.config
            .keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::ids::StoreId;
    use crate::memory::core::strategy::{StrategyConfig, default_strategies};
    use crate::memory::recorder::record_turn;
    use crate::memory::service::{InMemoryFaults, InMemoryMemoryService, StoreStatus};
    use std::sync::Arc;

    const PREFS: &str = "market-trends/broker/broker_jane_doe/preferences";

    async fn setup(strategies: Vec<StrategyConfig>) -> (Arc<InMemoryMemoryService>, ProfileAggregator) {
        let service = InMemoryMemoryService::new().unwrap().shared();
        let id = StoreId::new("Market-prof000001");
        service
            .insert_store(id.clone(), "Market", StoreStatus::Active, strategies)
            .await;
        let handle = StoreHandle::new(service.clone(), id);
        (service, ProfileAggregator::new(handle, ProfileConfig::default()))
    }

    fn jane() -> (ActorId, SessionId) {
        (ActorId::new("broker_jane_doe"), SessionId::new("market-20250101000000"))
    }

    #[tokio::test]
    async fn short_fragments_are_dropped() {
        let (service, aggregator) = setup(default_strategies()).await;
        let store = aggregator.handle().store_id().clone();
        // 15 and 25 chars.
        service.seed_record(&store, PREFS, "Likes bonds now").await.unwrap();
        service.seed_record(&store, PREFS, "Prefers dividend payers!!").await.unwrap();

        let (actor, session) = jane();
        let report = aggregator.profile_for(&actor, &session).await;
        assert_eq!(
            report.outcome,
            ProfileOutcome::Merged(vec![ProfileFragment {
                kind: StrategyKind::UserPreference,
                text: "Prefers dividend payers!!".to_string(),
            }])
        );
        assert_eq!(
            report.to_string(),
            "Broker Financial Profile:\n[USER_PREFERENCE] Prefers dividend payers!!"
        );
        assert!(!report.is_degraded());
    }

    #[tokio::test]
    async fn merges_across_strategies() {
        let (service, aggregator) = setup(default_strategies()).await;
        let store = aggregator.handle().store_id().clone();
        service
            .seed_record(&store, PREFS, "Conservative risk tolerance, prefers utilities")
            .await
            .unwrap();
        service
            .seed_record(
                &store,
                "market-trends/broker/broker_jane_doe/semantic",
                "Manages a pension portfolio for retired nurses",
            )
            .await
            .unwrap();

        let (actor, session) = jane();
        let text = aggregator.profile_for(&actor, &session).await.to_string();
        assert_eq!(
            text,
            "Broker Financial Profile:\n\
             [USER_PREFERENCE] Conservative risk tolerance, prefers utilities\n\n\
             [SEMANTIC] Manages a pension portfolio for retired nurses"
        );
    }

    #[tokio::test]
    async fn history_fallback_keeps_two_most_recent() {
        let (_, aggregator) = setup(Vec::new()).await;
        let (actor, session) = jane();
        for label in ["first", "second", "third"] {
            let user = format!("My {label} note: my portfolio leans toward healthcare and energy names");
            let outcome = record_turn(aggregator.handle(), &actor, &session, &user, "Noted.").await;
            assert!(outcome.is_recorded());
        }

        let report = aggregator.profile_for(&actor, &session).await;
        let ProfileOutcome::FromHistory(excerpts) = &report.outcome else {
            panic!("expected history fallback, got {:?}", report.outcome);
        };
        assert_eq!(excerpts.len(), 2);
        assert!(excerpts[0].starts_with("My second note"));
        assert!(excerpts[1].starts_with("My third note"));
        assert!(report.to_string().starts_with("Broker Profile (from conversation history):\n"));
    }

    #[tokio::test]
    async fn history_excerpts_are_truncated() {
        let (_, aggregator) = setup(Vec::new()).await;
        let (actor, session) = jane();
        let long = format!("Investment notes: {}", "x".repeat(300));
        record_turn(aggregator.handle(), &actor, &session, &long, "Noted.").await;

        let report = aggregator.profile_for(&actor, &session).await;
        let ProfileOutcome::FromHistory(excerpts) = report.outcome else {
            panic!("expected history fallback");
        };
        assert_eq!(excerpts[0].chars().count(), 203);
        assert!(excerpts[0].ends_with("..."));
    }

    #[tokio::test]
    async fn events_without_keywords_mean_building() {
        let (_, aggregator) = setup(Vec::new()).await;
        let (actor, session) = jane();
        record_turn(aggregator.handle(), &actor, &session, "How did NVDA close today?", "Up 2%.").await;

        let report = aggregator.profile_for(&actor, &session).await;
        assert_eq!(report.outcome, ProfileOutcome::Building);
        assert_eq!(report.to_string(), BUILDING_TEXT);
    }

    #[tokio::test]
    async fn nothing_stored_means_not_found() {
        let (_, aggregator) = setup(default_strategies()).await;
        let (actor, session) = jane();
        let report = aggregator.profile_for(&actor, &session).await;
        assert_eq!(report.outcome, ProfileOutcome::NotFound);
        assert_eq!(
            report.to_string(),
            "No financial profile found for this broker yet. This will be created as we learn about their investment preferences."
        );
        assert!(!report.is_degraded());
    }

    #[tokio::test]
    async fn strategy_faults_are_kept_apart_from_emptiness() {
        let (service, aggregator) = setup(default_strategies()).await;
        service
            .set_faults(InMemoryFaults {
                retrieve_records: true,
                ..InMemoryFaults::default()
            })
            .await;
        let (actor, session) = jane();
        let report = aggregator.profile_for(&actor, &session).await;
        assert_eq!(report.outcome, ProfileOutcome::NotFound);
        assert_eq!(report.faults.len(), 2);
        assert!(report.is_degraded());
    }

    #[tokio::test]
    async fn unreadable_history_is_unavailable() {
        let (service, aggregator) = setup(default_strategies()).await;
        service
            .set_faults(InMemoryFaults {
                list_strategies: true,
                list_events: true,
                ..InMemoryFaults::default()
            })
            .await;
        let (actor, session) = jane();
        let report = aggregator.profile_for(&actor, &session).await;
        assert!(matches!(report.outcome, ProfileOutcome::Unavailable { .. }));
        assert_eq!(report.to_string(), "Unable to retrieve financial profile at this time");
    }

    #[tokio::test]
    async fn probe_reports_existing_and_new() {
        let (service, aggregator) = setup(default_strategies()).await;
        let (actor, _) = jane();
        assert_eq!(aggregator.probe(&actor).await, ProbeOutcome::New);

        let store = aggregator.handle().store_id().clone();
        service
            .seed_record(&store, PREFS, "Prefers dividend payers")
            .await
            .unwrap();
        let identity = BrokerIdentity {
            actor: actor.clone(),
            probe: aggregator.probe(&actor).await,
        };
        assert_eq!(
            identity.to_string(),
            "ACTOR_ID: broker_jane_doe\nSTATUS: Existing broker found\nACTION: Use get_broker_financial_profile('broker_jane_doe') to retrieve their stored preferences."
        );
    }

    #[tokio::test]
    async fn probe_failure_is_reported() {
        let (service, aggregator) = setup(default_strategies()).await;
        service
            .set_faults(InMemoryFaults {
                list_strategies: true,
                ..InMemoryFaults::default()
            })
            .await;
        let (actor, _) = jane();
        let identity = BrokerIdentity {
            actor: actor.clone(),
            probe: aggregator.probe(&actor).await,
        };
        let text = identity.to_string();
        assert!(text.contains("STATUS: Unable to check existing profile"));
        assert!(text.contains("ERROR: memory service error: list_strategies unavailable"));
    }

    #[tokio::test]
    async fn history_view_shows_last_five_events() {
        let (_, aggregator) = setup(Vec::new()).await;
        let (actor, session) = jane();
        assert_eq!(
            aggregator.conversation_history(&actor, &session).await.to_string(),
            "No conversation history available"
        );

        for i in 0..7 {
            record_turn(aggregator.handle(), &actor, &session, &format!("question {i}"), "answer").await;
        }
        let HistoryView::Entries(lines) = aggregator.conversation_history(&actor, &session).await
        else {
            panic!("expected entries");
        };
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "USER: question 2...");
        assert_eq!(lines[1], "ASSISTANT: answer...");
    }
}
