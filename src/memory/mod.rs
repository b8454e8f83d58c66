//! Long-term broker memory.
//!
//! This module is organized into:
//! - `core`: Configuration, errors, identifiers, and strategies
//! - `service`: Backing store boundary with `SQLite` and in-memory backends
//! - `actor`: Deterministic actor key resolution from message text
//! - `provisioning`: Race-safe discovery/creation of the shared store
//! - `namespaces`: Strategy to namespace mapping
//! - `recorder`: Best-effort conversation writes
//! - `profile`: Profile aggregation, identification probe, history view

pub mod actor;
pub mod core;
pub mod namespaces;
pub mod profile;
pub mod provisioning;
pub mod recorder;
pub mod service;

// Re-export commonly used types for convenience
pub use actor::{ActorResolver, normalize_name};
pub use core::{
    ActorId, EventId, MemoryConfig, MemoryError, MemoryResult, ProfileConfig, SessionId,
    StorageConfig, StoreConfig, StoreId, StrategyConfig, StrategyKind,
};
pub use namespaces::{namespaces_for, try_namespaces};
pub use profile::{
    BrokerIdentity, HistoryView, ProbeOutcome, ProfileAggregator, ProfileFragment, ProfileOutcome,
    ProfileReport,
};
pub use provisioning::{PruneReport, StoreHandle, ensure_store, prune_duplicate_stores};
pub use recorder::{RecordOutcome, record_turn, should_record, update_financial_interests};
pub use service::{InMemoryMemoryService, MemoryService, SqliteMemoryService};
