//! `newMessage`: post into a room.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use parley_core::wire::{InboundFrame, NewChatMessage};
use parley_core::{Audience, Event, HandlerError, MessageKind, UserId};

use super::HandlerContext;
use crate::router::FrameHandler;

pub struct NewChatMessageHandler;

#[async_trait]
impl FrameHandler for NewChatMessageHandler {
    async fn handle(
        &self,
        frame: &InboundFrame,
        caller: UserId,
        ctx: &HandlerContext,
    ) -> Result<Event, HandlerError> {
        let payload: NewChatMessage = frame.payload()?;
        let room = payload.chat_id;

        if payload.content.trim().is_empty() {
            return Err(HandlerError::precondition("message content is empty"));
        }
        let chars = payload.content.chars().count();
        if chars > ctx.limits.max_message_chars {
            return Err(HandlerError::precondition(format!(
                "message is {chars} characters, limit is {}",
                ctx.limits.max_message_chars
            )));
        }
        // Live check: the admission snapshot may be stale.
        if !ctx.chat.is_member(room, caller)? {
            return Err(HandlerError::precondition(format!(
                "user {caller} is not a member of room {room}"
            )));
        }

        let sent_at = Utc::now();
        let message_id = ctx.chat.append_message(room, caller, &payload.content, sent_at)?;

        Ok(Event::new(
            MessageKind::NewChatMessage,
            json!({
                "message_id": message_id,
                "chat_id": room,
                "sender_id": caller,
                "content": payload.content,
                "sent_at": sent_at.to_rfc3339(),
            }),
            Audience::Membership(room),
        ))
    }
}
