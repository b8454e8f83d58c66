//! Process-local memory service.
//!
//! Behaves like the remote service as far as the agent can observe:
//! duplicate names are rejected atomically, new stores can take a few
//! readiness polls to become active, and every operation can be made to
//! fail. A list barrier lines up concurrent callers so that all of them
//! observe an empty store list before any of them creates.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{Barrier, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::{EventId, StoreId};
use crate::memory::core::strategy::{StrategyConfig, namespace_for};
use crate::memory::service::extraction::{StrategyExtractor, rank};
use crate::memory::service::{
    CreateStoreRequest, Event, EventQuery, MemoryRecord, MemoryService, NewEvent, RecordQuery,
    ServiceFuture, StoreStatus, StoreSummary,
};

/// How a newly created store becomes active.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Activation {
    /// Active as soon as it is created.
    #[default]
    Immediate,
    /// Active after this many `get_store` polls.
    AfterPolls(u32),
    /// Stays in `Creating` forever.
    Never,
    /// Moves to `Failed` with the given reason on the first poll.
    Fail(String),
}

/// Switchable failures for every service operation.
#[derive(Clone, Debug, Default)]
pub struct InMemoryFaults {
    /// Fail `list_stores`.
    pub list_stores: bool,
    /// Fail `create_store` with this message (not a name conflict).
    pub create_store: Option<String>,
    /// Fail `list_strategies`.
    pub list_strategies: bool,
    /// Fail `create_event`.
    pub create_event: bool,
    /// Fail `list_events`.
    pub list_events: bool,
    /// Fail `retrieve_records`.
    pub retrieve_records: bool,
    /// Fail `delete_store`.
    pub delete_store: bool,
    /// Make `list_stores` hide every store (simulates an inconsistent replica).
    pub hide_stores: bool,
}

struct StoredRecord {
    namespace: String,
    text: String,
    seq: i64,
}

struct StoreEntry {
    summary: StoreSummary,
    strategies: Vec<StrategyConfig>,
    event_expiry_days: u32,
    pending_polls: u32,
    events: Vec<(i64, Event)>,
    records: Vec<StoredRecord>,
}

#[derive(Default)]
struct State {
    stores: BTreeMap<StoreId, StoreEntry>,
    seq: i64,
}

impl State {
    fn next_seq(&mut self) -> i64 {
        self.seq += 1;
        self.seq
    }

    fn store_mut(&mut self, store_id: &StoreId) -> MemoryResult<&mut StoreEntry> {
        self.stores
            .get_mut(store_id)
            .ok_or_else(|| MemoryError::StoreNotFound(store_id.to_string()))
    }
}

struct ListGate {
    barrier: Barrier,
    parties: usize,
    entered: AtomicUsize,
}

/// In-memory implementation of [`MemoryService`].
pub struct InMemoryMemoryService {
    state: Mutex<State>,
    faults: Mutex<InMemoryFaults>,
    activation: Activation,
    extractor: StrategyExtractor,
    list_gate: Option<ListGate>,
    create_attempts: AtomicUsize,
    creates_succeeded: AtomicUsize,
}

impl InMemoryMemoryService {
    /// Create an empty service.
    ///
    /// # Errors
    /// Returns an error if the strategy extractor cannot be built.
    pub fn new() -> MemoryResult<Self> {
        let extractor = StrategyExtractor::new()
            .map_err(|err| MemoryError::InvalidConfig(err.to_string()))?;
        Ok(Self {
            state: Mutex::new(State::default()),
            faults: Mutex::new(InMemoryFaults::default()),
            activation: Activation::Immediate,
            extractor,
            list_gate: None,
            create_attempts: AtomicUsize::new(0),
            creates_succeeded: AtomicUsize::new(0),
        })
    }

    /// Set how new stores become active.
    #[must_use]
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Start with the given faults.
    #[must_use]
    pub fn with_faults(self, faults: InMemoryFaults) -> Self {
        Self {
            faults: Mutex::new(faults),
            ..self
        }
    }

    /// Hold the first `parties` `list_stores` calls until all have arrived.
    #[must_use]
    pub fn with_list_barrier(mut self, parties: usize) -> Self {
        self.list_gate = Some(ListGate {
            barrier: Barrier::new(parties),
            parties,
            entered: AtomicUsize::new(0),
        });
        self
    }

    /// Wrap in an `Arc` for sharing.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Replace the active faults.
    pub async fn set_faults(&self, faults: InMemoryFaults) {
        *self.faults.lock().await = faults;
    }

    /// Number of `create_store` calls received.
    #[must_use]
    pub fn create_attempts(&self) -> usize {
        self.create_attempts.load(Ordering::SeqCst)
    }

    /// Number of `create_store` calls that created a store.
    #[must_use]
    pub fn creates_succeeded(&self) -> usize {
        self.creates_succeeded.load(Ordering::SeqCst)
    }

    /// Insert a store directly, bypassing the name check.
    ///
    /// Used to reproduce the duplicate-store state left by older deployments.
    pub async fn insert_store(
        &self,
        id: StoreId,
        name: &str,
        status: StoreStatus,
        strategies: Vec<StrategyConfig>,
    ) {
        let summary = StoreSummary {
            id: id.clone(),
            name: name.to_string(),
            status,
            failure_reason: None,
            created_at: Utc::now(),
        };
        self.state.lock().await.stores.insert(
            id,
            StoreEntry {
                summary,
                strategies,
                event_expiry_days: 90,
                pending_polls: 0,
                events: Vec::new(),
                records: Vec::new(),
            },
        );
    }

    /// File a record under a namespace directly.
    ///
    /// # Errors
    /// Returns [`MemoryError::StoreNotFound`] if the store is absent.
    pub async fn seed_record(
        &self,
        store_id: &StoreId,
        namespace: impl Into<String>,
        text: impl Into<String>,
    ) -> MemoryResult<()> {
        let mut state = self.state.lock().await;
        let seq = state.next_seq();
        state.store_mut(store_id)?.records.push(StoredRecord {
            namespace: namespace.into(),
            text: text.into(),
            seq,
        });
        Ok(())
    }

    async fn faults(&self) -> InMemoryFaults {
        self.faults.lock().await.clone()
    }

    async fn pass_list_gate(&self) {
        if let Some(gate) = &self.list_gate
            && gate.entered.fetch_add(1, Ordering::SeqCst) < gate.parties
        {
            gate.barrier.wait().await;
        }
    }
}

fn new_store_id(name: &str) -> StoreId {
    let suffix = Uuid::new_v4().simple().to_string();
    StoreId::new(format!("{name}-{}", &suffix[..10]))
}

impl MemoryService for InMemoryMemoryService {
    fn list_stores(&self) -> ServiceFuture<'_, MemoryResult<Vec<StoreSummary>>> {
        Box::pin(async move {
            let faults = self.faults().await;
            if faults.list_stores {
                self.pass_list_gate().await;
                return Err(MemoryError::Service("list_stores unavailable".to_string()));
            }
            let snapshot: Vec<StoreSummary> = if faults.hide_stores {
                Vec::new()
            } else {
                let state = self.state.lock().await;
                state.stores.values().map(|s| s.summary.clone()).collect()
            };
            // Held until every gated caller has its snapshot.
            self.pass_list_gate().await;
            Ok(snapshot)
        })
    }

    fn create_store(
        &self,
        request: CreateStoreRequest,
    ) -> ServiceFuture<'_, MemoryResult<StoreSummary>> {
        Box::pin(async move {
            self.create_attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(reason) = self.faults().await.create_store {
                return Err(MemoryError::Service(reason));
            }

            let mut state = self.state.lock().await;
            if state.stores.values().any(|s| s.summary.name == request.name) {
                debug!(name = %request.name, "Rejecting duplicate store name");
                return Err(MemoryError::AlreadyExists { name: request.name });
            }

            let id = new_store_id(&request.name);
            let (status, pending_polls) = match &self.activation {
                Activation::Immediate => (StoreStatus::Active, 0),
                Activation::AfterPolls(n) => (StoreStatus::Creating, *n),
                Activation::Never | Activation::Fail(_) => (StoreStatus::Creating, u32::MAX),
            };
            let summary = StoreSummary {
                id: id.clone(),
                name: request.name,
                status,
                failure_reason: None,
                created_at: Utc::now(),
            };
            state.stores.insert(
                id,
                StoreEntry {
                    summary: summary.clone(),
                    strategies: request.strategies,
                    event_expiry_days: request.event_expiry_days,
                    pending_polls,
                    events: Vec::new(),
                    records: Vec::new(),
                },
            );
            self.creates_succeeded.fetch_add(1, Ordering::SeqCst);
            Ok(summary)
        })
    }

    fn get_store(&self, store_id: StoreId) -> ServiceFuture<'_, MemoryResult<StoreSummary>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let entry = state.store_mut(&store_id)?;
            if entry.summary.status == StoreStatus::Creating {
                match &self.activation {
                    Activation::Fail(reason) => {
                        entry.summary.status = StoreStatus::Failed;
                        entry.summary.failure_reason = Some(reason.clone());
                    }
                    Activation::Never => {}
                    Activation::Immediate | Activation::AfterPolls(_) => {
                        entry.pending_polls = entry.pending_polls.saturating_sub(1);
                        if entry.pending_polls == 0 {
                            entry.summary.status = StoreStatus::Active;
                        }
                    }
                }
            }
            Ok(entry.summary.clone())
        })
    }

    fn delete_store(&self, store_id: StoreId) -> ServiceFuture<'_, MemoryResult<()>> {
        Box::pin(async move {
            if self.faults().await.delete_store {
                return Err(MemoryError::Service("delete_store unavailable".to_string()));
            }
            let mut state = self.state.lock().await;
            state
                .stores
                .remove(&store_id)
                .map(|_| ())
                .ok_or_else(|| MemoryError::StoreNotFound(store_id.to_string()))
        })
    }

    fn list_strategies(
        &self,
        store_id: StoreId,
    ) -> ServiceFuture<'_, MemoryResult<Vec<StrategyConfig>>> {
        Box::pin(async move {
            if self.faults().await.list_strategies {
                return Err(MemoryError::Service("list_strategies unavailable".to_string()));
            }
            let mut state = self.state.lock().await;
            Ok(state.store_mut(&store_id)?.strategies.clone())
        })
    }

    fn create_event(&self, event: NewEvent) -> ServiceFuture<'_, MemoryResult<Event>> {
        Box::pin(async move {
            if self.faults().await.create_event {
                return Err(MemoryError::Service("create_event unavailable".to_string()));
            }
            event.validate()?;

            let mut state = self.state.lock().await;
            let seq = state.next_seq();
            let entry = state.store_mut(&event.store_id)?;
            let stored = Event {
                id: EventId::new(),
                store_id: event.store_id,
                actor: event.actor,
                session: event.session,
                timestamp: Utc::now(),
                messages: event.messages,
            };

            for strategy in &entry.strategies {
                let Some(template) = strategy.primary_namespace() else {
                    continue;
                };
                let namespace = namespace_for(template, &stored.actor);
                for text in self.extractor.extract(strategy.kind, &stored.messages) {
                    entry.records.push(StoredRecord {
                        namespace: namespace.clone(),
                        text,
                        seq,
                    });
                }
            }

            entry.events.push((seq, stored.clone()));
            Ok(stored)
        })
    }

    fn list_events(&self, query: EventQuery) -> ServiceFuture<'_, MemoryResult<Vec<Event>>> {
        Box::pin(async move {
            if self.faults().await.list_events {
                return Err(MemoryError::Service("list_events unavailable".to_string()));
            }
            let mut state = self.state.lock().await;
            let entry = state.store_mut(&query.store_id)?;
            let cutoff = Utc::now() - ChronoDuration::days(i64::from(entry.event_expiry_days));
            let matching: Vec<Event> = entry
                .events
                .iter()
                .map(|(_, event)| event)
                .filter(|e| e.actor == query.actor && e.session == query.session)
                .filter(|e| e.timestamp >= cutoff)
                .cloned()
                .collect();
            let skip = matching.len().saturating_sub(query.max_results);
            Ok(matching.into_iter().skip(skip).collect())
        })
    }

    fn retrieve_records(
        &self,
        query: RecordQuery,
    ) -> ServiceFuture<'_, MemoryResult<Vec<MemoryRecord>>> {
        Box::pin(async move {
            if self.faults().await.retrieve_records {
                return Err(MemoryError::Service("retrieve_records unavailable".to_string()));
            }
            let mut state = self.state.lock().await;
            let entry = state.store_mut(&query.store_id)?;
            let candidates = entry
                .records
                .iter()
                .filter(|r| r.namespace == query.namespace)
                .map(|r| (r.text.clone(), r.seq))
                .collect();
            Ok(rank(&query.query, candidates, query.top_k)
                .into_iter()
                .map(|(text, score)| MemoryRecord {
                    namespace: query.namespace.clone(),
                    text,
                    score,
                })
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::ids::{ActorId, SessionId};
    use crate::memory::core::strategy::default_strategies;
    use crate::memory::service::EventMessage;

    fn request(name: &str) -> CreateStoreRequest {
        CreateStoreRequest {
            name: name.to_string(),
            description: "test".to_string(),
            strategies: default_strategies(),
            event_expiry_days: 90,
        }
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let service = InMemoryMemoryService::new().unwrap();
        let first = service.create_store(request("Market")).await.unwrap();
        assert!(first.id.as_str().starts_with("Market-"));

        let err = service.create_store(request("Market")).await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(service.create_attempts(), 2);
        assert_eq!(service.creates_succeeded(), 1);
    }

    #[tokio::test]
    async fn store_activates_after_polls() {
        let service = InMemoryMemoryService::new()
            .unwrap()
            .with_activation(Activation::AfterPolls(2));
        let created = service.create_store(request("Market")).await.unwrap();
        assert_eq!(created.status, StoreStatus::Creating);
        let poll = service.get_store(created.id.clone()).await.unwrap();
        assert_eq!(poll.status, StoreStatus::Creating);
        let poll = service.get_store(created.id).await.unwrap();
        assert_eq!(poll.status, StoreStatus::Active);
    }

    #[tokio::test]
    async fn events_feed_strategy_namespaces() {
        let service = InMemoryMemoryService::new().unwrap();
        let store = service.create_store(request("Market")).await.unwrap();
        let actor = ActorId::new("broker_jane_doe");
        service
            .create_event(NewEvent {
                store_id: store.id.clone(),
                actor: actor.clone(),
                session: SessionId::new("s1"),
                messages: vec![
                    EventMessage::user("I prefer dividend stocks and have a conservative risk tolerance"),
                    EventMessage::assistant("Noted, I will focus on dividend payers."),
                ],
            })
            .await
            .unwrap();

        let records = service
            .retrieve_records(RecordQuery {
                store_id: store.id,
                namespace: "market-trends/broker/broker_jane_doe/preferences".to_string(),
                query: "risk tolerance".to_string(),
                top_k: 3,
            })
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].text.contains("dividend"));
    }

    #[tokio::test]
    async fn list_events_keeps_most_recent_in_order() {
        let service = InMemoryMemoryService::new().unwrap();
        let store = service.create_store(request("Market")).await.unwrap();
        let actor = ActorId::new("broker_a");
        let session = SessionId::new("s1");
        for i in 0..4 {
            service
                .create_event(NewEvent {
                    store_id: store.id.clone(),
                    actor: actor.clone(),
                    session: session.clone(),
                    messages: vec![EventMessage::user(format!("message {i}"))],
                })
                .await
                .unwrap();
        }

        let events = service
            .list_events(EventQuery {
                store_id: store.id,
                actor,
                session,
                max_results: 2,
            })
            .await
            .unwrap();
        let texts: Vec<_> = events.iter().map(|e| e.messages[0].text.as_str()).collect();
        assert_eq!(texts, vec!["message 2", "message 3"]);
    }
}
