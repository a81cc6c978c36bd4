//! Outbound events and audience rules.
//!
//! A handler produces exactly one [`Event`] per successful write. The
//! dispatcher consumes it once, evaluates the [`Audience`] against every
//! registered connection and enqueues the encoded frame onto each match.

use std::collections::HashSet;

use serde_json::Value;

use crate::ids::{RoomId, UserId};
use crate::wire::{MessageKind, OutboundEnvelope};

/// Which connections an event is addressed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Audience {
    /// Every connection whose membership snapshot contains the room.
    Membership(RoomId),
    /// Every connection whose identity is listed.
    Identity(Vec<UserId>),
}

impl Audience {
    /// Build an identity audience, dropping duplicate ids.
    pub fn identities(ids: impl IntoIterator<Item = UserId>) -> Self {
        let mut ids: Vec<UserId> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self::Identity(ids)
    }

    /// Whether a connection with this identity and snapshot is addressed.
    pub fn matches(&self, user: UserId, rooms: &HashSet<RoomId>) -> bool {
        match self {
            Self::Membership(room) => rooms.contains(room),
            Self::Identity(ids) => ids.contains(&user),
        }
    }

    /// Rule name for logs.
    pub fn rule(&self) -> &'static str {
        match self {
            Self::Membership(_) => "membership",
            Self::Identity(_) => "identity",
        }
    }
}

/// An immutable outbound event.
#[derive(Clone, Debug)]
pub struct Event {
    kind: MessageKind,
    payload: Value,
    audience: Audience,
}

impl Event {
    /// Create an event. Fields cannot be changed afterwards.
    pub fn new(kind: MessageKind, payload: Value, audience: Audience) -> Self {
        Self {
            kind,
            payload,
            audience,
        }
    }

    /// The event type.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// The type-specific payload (the envelope's `data`).
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The audience rule.
    pub fn audience(&self) -> &Audience {
        &self.audience
    }

    /// Encode as an outbound `{"type", "data"}` frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&OutboundEnvelope {
            event_type: self.kind.tag().to_owned(),
            data: self.payload.clone(),
        })
    }
}
