//! Backing memory service boundary.
//!
//! The agent never owns memory data. It talks to a service that can list
//! and create named stores, append conversation events, and return ranked
//! records per strategy namespace. Two backends are provided:
//! - [`SqliteMemoryService`]: durable local service on `SQLite`.
//! - [`InMemoryMemoryService`]: process-local service with fault injection.
//!
//! Duplicate-name rejection on create must be atomic inside the service;
//! provisioning relies on it and adds no locking of its own.

pub mod extraction;
pub mod in_memory;
pub mod sqlite;

pub use in_memory::{InMemoryFaults, InMemoryMemoryService};
pub use sqlite::SqliteMemoryService;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::{ActorId, EventId, SessionId, StoreId};
use crate::memory::core::strategy::StrategyConfig;

/// Boxed future type for memory service operations.
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lifecycle status of a store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreStatus {
    /// Created but not yet usable.
    Creating,
    /// Ready for reads and writes.
    Active,
    /// Provisioning failed.
    Failed,
}

impl StoreStatus {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "CREATING",
            Self::Active => "ACTIVE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "CREATING" => Ok(Self::Creating),
            "ACTIVE" => Ok(Self::Active),
            "FAILED" => Ok(Self::Failed),
            _ => Err(value.to_string()),
        }
    }
}

/// Summary of a store as listed by the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
    /// Service-assigned identifier, prefixed by the name.
    pub id: StoreId,
    /// Store name.
    pub name: String,
    /// Current status.
    pub status: StoreStatus,
    /// Failure reason when status is [`StoreStatus::Failed`].
    pub failure_reason: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl StoreSummary {
    /// Whether this store belongs to the given name (`name-` prefix match).
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.id
            .as_str()
            .strip_prefix(name)
            .is_some_and(|rest| rest.starts_with('-'))
    }
}

/// Request to create a store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateStoreRequest {
    /// Store name; must be unique within the service.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Strategies to configure.
    pub strategies: Vec<StrategyConfig>,
    /// Event retention horizon in days.
    pub event_expiry_days: u32,
}

/// Role of a message inside an event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageRole {
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

impl MessageRole {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Assistant => "ASSISTANT",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(text, role)` pair of an event.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Message text.
    pub text: String,
    /// Message role.
    pub role: MessageRole,
}

impl EventMessage {
    /// Build a user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role: MessageRole::User,
        }
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role: MessageRole::Assistant,
        }
    }
}

/// Event append request.
#[derive(Clone, Debug)]
pub struct NewEvent {
    /// Target store.
    pub store_id: StoreId,
    /// Actor the turn belongs to.
    pub actor: ActorId,
    /// Session the turn belongs to.
    pub session: SessionId,
    /// Ordered messages.
    pub messages: Vec<EventMessage>,
}

impl NewEvent {
    /// Reject events the service would not store.
    ///
    /// # Errors
    /// Returns [`MemoryError::InvalidEvent`] when there are no messages or a
    /// message is blank.
    pub fn validate(&self) -> MemoryResult<()> {
        if self.messages.is_empty() {
            return Err(MemoryError::InvalidEvent("event has no messages".to_string()));
        }
        if self.messages.iter().any(|m| m.text.trim().is_empty()) {
            return Err(MemoryError::InvalidEvent(
                "event message text must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// A stored conversational event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier.
    pub id: EventId,
    /// Owning store.
    pub store_id: StoreId,
    /// Actor key.
    pub actor: ActorId,
    /// Session key.
    pub session: SessionId,
    /// Append time.
    pub timestamp: DateTime<Utc>,
    /// Ordered messages.
    pub messages: Vec<EventMessage>,
}

/// Query for an actor's recent events.
#[derive(Clone, Debug)]
pub struct EventQuery {
    /// Store to read.
    pub store_id: StoreId,
    /// Actor key.
    pub actor: ActorId,
    /// Session key.
    pub session: SessionId,
    /// Upper bound on returned events.
    pub max_results: usize,
}

/// Query for ranked records in one namespace.
#[derive(Clone, Debug)]
pub struct RecordQuery {
    /// Store to read.
    pub store_id: StoreId,
    /// Fully substituted namespace.
    pub namespace: String,
    /// Free-text relevance query.
    pub query: String,
    /// Upper bound on returned records.
    pub top_k: usize,
}

/// A ranked long-term memory record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Namespace the record lives in.
    pub namespace: String,
    /// Record text.
    pub text: String,
    /// Relevance to the query (higher is better).
    pub score: f64,
}

/// Backing memory service contract.
pub trait MemoryService: Send + Sync {
    /// List all stores.
    ///
    /// # Errors
    /// Returns an error if the service cannot be reached.
    fn list_stores(&self) -> ServiceFuture<'_, MemoryResult<Vec<StoreSummary>>>;

    /// Create a store.
    ///
    /// # Errors
    /// Returns [`MemoryError::AlreadyExists`] when the name is taken, or
    /// another error if creation fails.
    fn create_store(
        &self,
        request: CreateStoreRequest,
    ) -> ServiceFuture<'_, MemoryResult<StoreSummary>>;

    /// Fetch one store by identifier.
    ///
    /// # Errors
    /// Returns [`MemoryError::StoreNotFound`] if absent.
    fn get_store(&self, store_id: StoreId) -> ServiceFuture<'_, MemoryResult<StoreSummary>>;

    /// Delete a store and all its data.
    ///
    /// # Errors
    /// Returns [`MemoryError::StoreNotFound`] if absent.
    fn delete_store(&self, store_id: StoreId) -> ServiceFuture<'_, MemoryResult<()>>;

    /// List the strategies configured on a store.
    ///
    /// # Errors
    /// Returns an error if the store is missing or unreachable.
    fn list_strategies(
        &self,
        store_id: StoreId,
    ) -> ServiceFuture<'_, MemoryResult<Vec<StrategyConfig>>>;

    /// Append one event.
    ///
    /// # Errors
    /// Returns an error if the event is invalid or storage fails.
    fn create_event(&self, event: NewEvent) -> ServiceFuture<'_, MemoryResult<Event>>;

    /// List an actor's most recent events for a session, oldest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_events(&self, query: EventQuery) -> ServiceFuture<'_, MemoryResult<Vec<Event>>>;

    /// Retrieve the top-k records of a namespace, most relevant first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn retrieve_records(
        &self,
        query: RecordQuery,
    ) -> ServiceFuture<'_, MemoryResult<Vec<MemoryRecord>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str) -> StoreSummary {
        StoreSummary {
            id: StoreId::new(id),
            name: "X".to_string(),
            status: StoreStatus::Active,
            failure_reason: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn name_match_requires_dash_separator() {
        assert!(summary("MarketTrends-abc123").matches_name("MarketTrends"));
        assert!(!summary("MarketTrendsV2-abc123").matches_name("MarketTrends"));
        assert!(!summary("MarketTrends").matches_name("MarketTrends"));
    }

    #[test]
    fn blank_messages_are_invalid() {
        let event = NewEvent {
            store_id: StoreId::new("X-1"),
            actor: ActorId::new("broker_a"),
            session: SessionId::new("s"),
            messages: vec![EventMessage::user("hello"), EventMessage::assistant("   ")],
        };
        assert!(matches!(event.validate(), Err(MemoryError::InvalidEvent(_))));
    }
}
