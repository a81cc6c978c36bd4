//! Friendship lifecycle: `sendFR`, `acceptFR`, `rejectFR`, `removeFriend`.
//!
//! A pair is always in exactly one of three states: no edge, one pending
//! request, or friends. The handlers check the transition against live state
//! and the store enforces it again under its own transaction, so a lost race
//! surfaces as a precondition failure rather than a second edge.

use async_trait::async_trait;
use serde_json::json;

use parley_core::wire::{
    AcceptFriendRequest, InboundFrame, RejectFriendRequest, RemoveFriend, SendFriendRequest,
};
use parley_core::{Audience, Event, HandlerError, MessageKind, UserId};

use super::HandlerContext;
use crate::router::FrameHandler;

fn not_self(caller: UserId, other: UserId, what: &str) -> Result<(), HandlerError> {
    if caller == other {
        return Err(HandlerError::precondition(format!("cannot {what} yourself")));
    }
    Ok(())
}

pub struct SendFriendRequestHandler;

#[async_trait]
impl FrameHandler for SendFriendRequestHandler {
    async fn handle(
        &self,
        frame: &InboundFrame,
        caller: UserId,
        ctx: &HandlerContext,
    ) -> Result<Event, HandlerError> {
        let SendFriendRequest { receiver_id } = frame.payload()?;
        not_self(caller, receiver_id, "befriend")?;

        if ctx.chat.are_friends(caller, receiver_id)? {
            return Err(HandlerError::precondition(format!(
                "{caller} and {receiver_id} are already friends"
            )));
        }
        if ctx.chat.is_requested(caller, receiver_id)? || ctx.chat.is_requested(receiver_id, caller)? {
            return Err(HandlerError::precondition(format!(
                "a request between {caller} and {receiver_id} is already pending"
            )));
        }

        ctx.chat.send_friend_request(caller, receiver_id)?;

        Ok(Event::new(
            MessageKind::SendFriendRequest,
            json!({ "sender_id": caller, "receiver_id": receiver_id }),
            Audience::identities([caller, receiver_id]),
        ))
    }
}

pub struct AcceptFriendRequestHandler;

#[async_trait]
impl FrameHandler for AcceptFriendRequestHandler {
    async fn handle(
        &self,
        frame: &InboundFrame,
        caller: UserId,
        ctx: &HandlerContext,
    ) -> Result<Event, HandlerError> {
        let AcceptFriendRequest { sender_id } = frame.payload()?;
        not_self(caller, sender_id, "accept a request from")?;

        // Only the receiver of the exact edge may accept it.
        if !ctx.chat.is_requested(sender_id, caller)? {
            return Err(HandlerError::precondition(format!(
                "no pending request from {sender_id} to {caller}"
            )));
        }

        ctx.chat.accept_friend_request(caller, sender_id)?;

        Ok(Event::new(
            MessageKind::AcceptFriendRequest,
            json!({ "sender_id": sender_id, "accepter_id": caller }),
            Audience::identities([caller, sender_id]),
        ))
    }
}

pub struct RejectFriendRequestHandler;

#[async_trait]
impl FrameHandler for RejectFriendRequestHandler {
    async fn handle(
        &self,
        frame: &InboundFrame,
        caller: UserId,
        ctx: &HandlerContext,
    ) -> Result<Event, HandlerError> {
        let RejectFriendRequest { user_id: other } = frame.payload()?;
        not_self(caller, other, "reject")?;

        // The receiver declines, or the sender withdraws.
        let (sender, receiver) = if ctx.chat.is_requested(other, caller)? {
            (other, caller)
        } else if ctx.chat.is_requested(caller, other)? {
            (caller, other)
        } else {
            return Err(HandlerError::precondition(format!(
                "no pending request between {caller} and {other}"
            )));
        };

        ctx.chat.reject_friend_request(sender, receiver)?;

        Ok(Event::new(
            MessageKind::RejectFriendRequest,
            json!({ "sender_id": sender, "receiver_id": receiver, "rejected_by": caller }),
            Audience::identities([sender, receiver]),
        ))
    }
}

pub struct RemoveFriendHandler;

#[async_trait]
impl FrameHandler for RemoveFriendHandler {
    async fn handle(
        &self,
        frame: &InboundFrame,
        caller: UserId,
        ctx: &HandlerContext,
    ) -> Result<Event, HandlerError> {
        let RemoveFriend { friend_id } = frame.payload()?;
        not_self(caller, friend_id, "unfriend")?;

        if !ctx.chat.are_friends(caller, friend_id)? {
            return Err(HandlerError::precondition(format!(
                "{caller} and {friend_id} are not friends"
            )));
        }

        ctx.chat.remove_friend(caller, friend_id)?;

        Ok(Event::new(
            MessageKind::RemoveFriend,
            json!({ "user_id": caller, "friend_id": friend_id }),
            Audience::identities([caller, friend_id]),
        ))
    }
}
