//! Message handlers.
//!
//! Every handler follows the same contract: decode the typed payload,
//! re-check preconditions against the live collaborator state (never the
//! admission snapshot), write through the collaborator, and only then
//! describe the write as an [`Event`](parley_core::Event) with the smallest
//! audience that needs it.

pub mod friends;
pub mod message;
pub mod room;

use std::sync::Arc;

use parley_core::{ChatService, MessageKind};

use crate::config::ServerConfig;
use crate::router::MessageRouter;

/// Content limits enforced by the handlers.
#[derive(Clone, Copy, Debug)]
pub struct ChatLimits {
    /// Longest accepted message, in characters.
    pub max_message_chars: usize,
    /// Largest room, creator included.
    pub max_room_members: usize,
}

impl Default for ChatLimits {
    fn default() -> Self {
        Self {
            max_message_chars: 4000,
            max_room_members: 64,
        }
    }
}

impl From<&ServerConfig> for ChatLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_message_chars: config.max_message_chars,
            max_room_members: config.max_room_members,
        }
    }
}

/// Shared dependencies for all handlers.
#[derive(Clone)]
pub struct HandlerContext {
    /// Rooms, messages and friendships.
    pub chat: Arc<dyn ChatService>,
    pub limits: ChatLimits,
}

/// Register every built-in handler.
pub fn register_all(router: &mut MessageRouter) {
    router.register(MessageKind::NewChatMessage, message::NewChatMessageHandler);
    router.register(MessageKind::NewChatRoom, room::NewChatRoomHandler);
    router.register(MessageKind::SendFriendRequest, friends::SendFriendRequestHandler);
    router.register(MessageKind::AcceptFriendRequest, friends::AcceptFriendRequestHandler);
    router.register(MessageKind::RejectFriendRequest, friends::RejectFriendRequestHandler);
    router.register(MessageKind::RemoveFriend, friends::RemoveFriendHandler);
}
