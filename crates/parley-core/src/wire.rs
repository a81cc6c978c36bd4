//! Wire formats.
//!
//! Inbound frames are flat JSON objects tagged by `type`:
//! `{"type": "newMessage", "chat_id": 3, "content": "hi"}`.
//! Outbound frames wrap the payload: `{"type": "newMessage", "data": {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::HandlerError;
use crate::ids::{RoomId, UserId};

/// The closed set of inbound message types the router accepts.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum MessageKind {
    /// Post a message into a room.
    NewChatMessage,
    /// Create a room with friends.
    NewChatRoom,
    /// Ask another user to become friends.
    SendFriendRequest,
    /// Accept a pending request addressed to the caller.
    AcceptFriendRequest,
    /// Reject (or withdraw) a pending request.
    RejectFriendRequest,
    /// Dissolve an existing friendship.
    RemoveFriend,
}

impl MessageKind {
    /// Every kind, in registration order.
    pub const ALL: [Self; 6] = [
        Self::NewChatMessage,
        Self::NewChatRoom,
        Self::SendFriendRequest,
        Self::AcceptFriendRequest,
        Self::RejectFriendRequest,
        Self::RemoveFriend,
    ];

    /// The `type` tag used on the wire, in both directions.
    pub fn tag(self) -> &'static str {
        match self {
            Self::NewChatMessage => "newMessage",
            Self::NewChatRoom => "newChat",
            Self::SendFriendRequest => "sendFR",
            Self::AcceptFriendRequest => "acceptFR",
            Self::RejectFriendRequest => "rejectFR",
            Self::RemoveFriend => "removeFriend",
        }
    }

    /// Resolve a wire tag. Returns `None` for anything outside the closed set.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A decoded inbound frame: the tag plus the whole object for typed decoding.
#[derive(Clone, Debug)]
pub struct InboundFrame {
    /// The raw `type` tag.
    pub tag: String,
    /// The full JSON object, including `type`.
    pub body: Value,
}

impl InboundFrame {
    /// Decode the envelope of one text frame.
    ///
    /// Fails if the text is not a JSON object or has no string `type` field.
    pub fn parse(text: &str) -> Result<Self, HandlerError> {
        let body: Value = serde_json::from_str(text)?;
        let tag = body
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::Decode("missing string field 'type'".into()))?
            .to_owned();
        Ok(Self { tag, body })
    }

    /// Decode the type-specific payload.
    pub fn payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, HandlerError> {
        Ok(T::deserialize(&self.body)?)
    }
}

/// Outbound envelope: `{"type": ..., "data": ...}`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OutboundEnvelope {
    /// Event type tag.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Type-specific payload.
    pub data: Value,
}

// ── Inbound payloads ────────────────────────────────────────────────

/// `newMessage`
#[derive(Clone, Debug, Deserialize)]
pub struct NewChatMessage {
    /// Target room.
    pub chat_id: RoomId,
    /// Message body.
    pub content: String,
}

/// `newChat`
#[derive(Clone, Debug, Deserialize)]
pub struct NewChatRoom {
    /// Declared members, excluding (or redundantly including) the creator.
    pub members: Vec<UserId>,
    /// Optional display name.
    #[serde(default)]
    pub chat_name: Option<String>,
}

/// `sendFR`
#[derive(Clone, Debug, Deserialize)]
pub struct SendFriendRequest {
    /// Who the request is addressed to.
    pub receiver_id: UserId,
}

/// `acceptFR`
#[derive(Clone, Debug, Deserialize)]
pub struct AcceptFriendRequest {
    /// Who sent the request being accepted.
    pub sender_id: UserId,
}

/// `rejectFR`
#[derive(Clone, Debug, Deserialize)]
pub struct RejectFriendRequest {
    /// The other party of the pending request, in either direction.
    pub user_id: UserId,
}

/// `removeFriend`
#[derive(Clone, Debug, Deserialize)]
pub struct RemoveFriend {
    /// The friend to remove.
    pub friend_id: UserId,
}
