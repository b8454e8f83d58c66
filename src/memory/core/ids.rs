// File: src/memory/core/ids.rs

//! Identifier types for the broker memory layer.
//!
//! This module is intentionally **type-heavy** and **logic-light**.
//! Store, actor and session keys are strings handed out by (or agreed
//! with) the backing service, so they are wrapped as transparent string
//! newtypes. Event identifiers are generated locally as UUIDs.
//!
//! ## Continuity
//! The same person maps to the same [`ActorId`] across sessions as long as
//! their self-introduction normalizes to the same key (see
//! [`crate::memory::actor`]). A [`SessionId`] scopes one process run.

use core::fmt;
use core::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declare a string newtype with a consistent API.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing key.
            #[inline]
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the key as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Extract the owned key.
            #[inline]
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $name {
            #[inline]
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// ===== Keys =================================================================

define_string_id!(
    /// Identifier of a memory store, assigned by the backing service.
    ///
    /// Always prefixed by the store name followed by `-`.
    StoreId
);

define_string_id!(
    /// Stable identity key for one broker or anonymous user.
    ///
    /// Produced by [`crate::memory::actor::ActorResolver`], never assigned by hand
    /// except for the placeholder used before anyone introduces themselves.
    ActorId
);

define_string_id!(
    /// Identifier for one conversation session.
    SessionId
);

impl ActorId {
    /// Placeholder used before the user has said anything identifying.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new("unknown-user")
    }
}

impl SessionId {
    /// Generate a timestamped session key, e.g. `market-20250101093000`.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("market-{}", Utc::now().format("%Y%m%d%H%M%S")))
    }
}

/// Identifier for a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl EventId {
    /// Create a new random identifier.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_timestamped() {
        let session = SessionId::generate();
        let suffix = session.as_str().strip_prefix("market-").unwrap();
        assert_eq!(suffix.len(), 14);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn event_id_round_trips_through_display() {
        let id = EventId::new();
        let parsed: EventId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn string_ids_serialize_transparently() {
        let actor = ActorId::new("broker_tim_dunk");
        assert_eq!(serde_json::to_string(&actor).unwrap(), "\"broker_tim_dunk\"");
    }
}
