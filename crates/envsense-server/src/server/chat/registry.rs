//! Directory of active chat participants and the broadcast primitive.
//!
//! The registry maps a participant name to the outbound queue of the session
//! that currently owns that name. All structural changes and every broadcast
//! run under one mutex, so a broadcast observes either the table before or
//! after a concurrent join/leave, never a half-updated one.
//!
//! Delivery never blocks: each participant's queue is bounded and a full or
//! closed queue counts as a failed delivery for that participant only.

use crate::server::{session::SessionId, telemetry::record_chat_delivery};
use envsense_core::proto::support::ChatMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tonic::Status;

/// Sending half of a participant's response stream.
pub type Outbound = mpsc::Sender<Result<ChatMessage, Status>>;

struct Participant {
    session: SessionId,
    outbound: Outbound,
}

/// Outcome of a single [`ChatRegistry::broadcast`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Participants whose queue accepted the message.
    pub delivered: usize,
    /// Participants whose queue was full or closed.
    pub failed: usize,
}

#[derive(Default)]
pub struct ChatRegistry {
    participants: Mutex<HashMap<String, Participant>>,
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `name` to `outbound`, owned by `session`.
    ///
    /// A name that is already taken is silently handed over to the new
    /// session (last writer wins). The displaced session id is returned so the
    /// caller can log it.
    pub fn register(
        &self,
        name: impl Into<String>,
        session: SessionId,
        outbound: Outbound,
    ) -> Option<SessionId> {
        let name = name.into();
        let mut participants = self.participants.lock();
        let previous = participants
            .insert(name.clone(), Participant { session, outbound })
            .map(|previous| previous.session);

        match previous {
            Some(displaced) if displaced != session => tracing::warn!(
                participant = %name,
                session,
                displaced,
                "Chat name taken over by a new session"
            ),
            _ => tracing::info!(
                participant = %name,
                session,
                participants = participants.len(),
                "Participant joined"
            ),
        }

        previous
    }

    /// Removes `name` if it is still routed to `session`.
    ///
    /// Idempotent: unknown names, repeated calls and names that have since
    /// been taken over by another session are left untouched. Returns whether
    /// an entry was removed.
    pub fn unregister(&self, name: &str, session: SessionId) -> bool {
        let mut participants = self.participants.lock();
        match participants.get(name) {
            Some(participant) if participant.session == session => {
                participants.remove(name);
                tracing::info!(
                    participant = %name,
                    session,
                    participants = participants.len(),
                    "Participant left"
                );
                true
            }
            _ => false,
        }
    }

    /// Queues `message` for every registered participant except `exclude`.
    ///
    /// Every participant present when the lock is taken is attempted exactly
    /// once. Failures are logged and counted but never abort the fan-out.
    pub fn broadcast(&self, message: &ChatMessage, exclude: Option<&str>) -> Delivery {
        let mut delivery = Delivery::default();
        let participants = self.participants.lock();

        for (name, participant) in participants.iter() {
            if exclude == Some(name.as_str()) {
                continue;
            }

            match participant.outbound.try_send(Ok(message.clone())) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    delivery.failed += 1;
                    tracing::warn!(
                        participant = %name,
                        session = participant.session,
                        "Outbound queue full, dropping chat message"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    delivery.failed += 1;
                    tracing::debug!(
                        participant = %name,
                        session = participant.session,
                        "Outbound stream closed, skipping participant"
                    );
                }
            }
        }
        drop(participants);

        record_chat_delivery(delivery.delivered as u64, delivery.failed as u64);
        delivery
    }

    pub fn contains(&self, name: &str) -> bool {
        self.participants.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.participants.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.lock().is_empty()
    }

}
