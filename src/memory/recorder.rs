//! Conversation recording.
//!
//! Writes never abort a turn: backing-service failures are logged and
//! returned as [`RecordOutcome::Failed`].

use tracing::{debug, warn};

use crate::memory::core::ids::{ActorId, SessionId};
use crate::memory::provisioning::StoreHandle;
use crate::memory::service::{EventMessage, NewEvent};

/// Acknowledgement stored with every profile update.
pub const PROFILE_UPDATE_ACK: &str = "I've updated your financial profile with the new information. This will be included in your long-term investment profile for future reference.";

/// Result of a best-effort memory write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The event was appended.
    Recorded,
    /// The event was dropped.
    Failed {
        /// Why the write failed.
        reason: String,
    },
}

impl RecordOutcome {
    /// Whether the write went through.
    #[must_use]
    pub const fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded)
    }
}

/// Whether a turn qualifies for recording: both texts non-empty after trimming.
#[must_use]
pub fn should_record(user_text: &str, assistant_text: &str) -> bool {
    !user_text.trim().is_empty() && !assistant_text.trim().is_empty()
}

/// Append one (user, assistant) turn.
///
/// The caller checks [`should_record`] first; the append itself is
/// unconditional.
pub async fn record_turn(
    handle: &StoreHandle,
    actor: &ActorId,
    session: &SessionId,
    user_text: &str,
    assistant_text: &str,
) -> RecordOutcome {
    let event = NewEvent {
        store_id: handle.store_id().clone(),
        actor: actor.clone(),
        session: session.clone(),
        messages: vec![
            EventMessage::user(user_text),
            EventMessage::assistant(assistant_text),
        ],
    };

    match handle.service().create_event(event).await {
        Ok(stored) => {
            debug!(actor = %actor, event_id = %stored.id, "Recorded conversation turn");
            RecordOutcome::Recorded
        }
        Err(err) => {
            warn!(actor = %actor, store_id = %handle.store_id(), %err, "Recording conversation turn failed");
            RecordOutcome::Failed {
                reason: err.to_string(),
            }
        }
    }
}

/// Record a profile update as a synthetic turn so the strategies pick it up.
pub async fn update_financial_interests(
    handle: &StoreHandle,
    actor: &ActorId,
    session: &SessionId,
    update: &str,
) -> RecordOutcome {
    let request = format!("Please update my financial profile with this information: {update}");
    record_turn(handle, actor, session, &request, PROFILE_UPDATE_ACK).await
}
