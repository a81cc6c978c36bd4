//! Collaborator boundary.
//!
//! The server core never touches storage directly. Everything it needs from
//! accounts, rooms and friendships goes through these two traits, so tests
//! can swap in doubles and the real implementation can live in its own crate.
//!
//! All methods are synchronous unit operations: each either happens in full
//! or returns an error, and the core makes no partial-visibility assumptions.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::errors::{AuthError, ServiceError};
use crate::ids::{MessageId, RoomId, UserId};

/// Session verification.
pub trait AccountService: Send + Sync {
    /// Resolve a session credential to the identity it belongs to.
    ///
    /// Unknown or revoked tokens yield [`AuthError::InvalidSession`], expired
    /// ones [`AuthError::SessionExpired`].
    fn verify_session(&self, token: &str) -> Result<UserId, AuthError>;
}

/// Rooms, messages and the friendship graph.
pub trait ChatService: Send + Sync {
    /// Every room the user currently belongs to.
    fn membership(&self, user: UserId) -> Result<HashSet<RoomId>, ServiceError>;

    /// Whether the user currently belongs to the room.
    fn is_member(&self, room: RoomId, user: UserId) -> Result<bool, ServiceError>;

    /// Whether the pair are friends. Symmetric.
    fn are_friends(&self, a: UserId, b: UserId) -> Result<bool, ServiceError>;

    /// Whether a pending request `sender → receiver` exists. Directional.
    fn is_requested(&self, sender: UserId, receiver: UserId) -> Result<bool, ServiceError>;

    /// Whether a non-group room with exactly these two members exists.
    fn private_room_exists(&self, a: UserId, b: UserId) -> Result<bool, ServiceError>;

    /// Create a room and its memberships. `members` includes the creator.
    ///
    /// For a two-member room the private-room check is part of the same unit:
    /// [`ServiceError::Conflict`] if the pair already share one.
    fn create_room(&self, name: Option<&str>, members: &[UserId]) -> Result<RoomId, ServiceError>;

    /// Persist one chat message.
    fn append_message(
        &self,
        room: RoomId,
        sender: UserId,
        content: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<MessageId, ServiceError>;

    /// Record a pending request. [`ServiceError::Conflict`] if an edge of any
    /// kind already exists for the pair.
    fn send_friend_request(&self, sender: UserId, receiver: UserId) -> Result<(), ServiceError>;

    /// Turn the exact `sender → accepter` request into a friendship.
    fn accept_friend_request(&self, accepter: UserId, sender: UserId) -> Result<(), ServiceError>;

    /// Delete the exact `sender → receiver` request.
    fn reject_friend_request(&self, sender: UserId, receiver: UserId) -> Result<(), ServiceError>;

    /// Dissolve a friendship.
    fn remove_friend(&self, user: UserId, friend: UserId) -> Result<(), ServiceError>;
}
