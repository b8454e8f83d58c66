//! Core memory types and identifiers.

pub mod config;
pub mod errors;
pub mod ids;
pub mod strategy;

pub use config::{MemoryConfig, ProfileConfig, StorageConfig, StoreConfig};
pub use errors::{MemoryError, MemoryResult};
pub use ids::{ActorId, EventId, SessionId, StoreId};
pub use strategy::{ACTOR_PLACEHOLDER, StrategyConfig, StrategyKind, StrategyKindParseError};
