//! `newChat`: create a room with friends.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use parley_core::wire::{InboundFrame, NewChatRoom};
use parley_core::{Audience, Event, HandlerError, MessageKind, UserId};

use super::HandlerContext;
use crate::router::FrameHandler;

pub struct NewChatRoomHandler;

#[async_trait]
impl FrameHandler for NewChatRoomHandler {
    async fn handle(
        &self,
        frame: &InboundFrame,
        caller: UserId,
        ctx: &HandlerContext,
    ) -> Result<Event, HandlerError> {
        let payload: NewChatRoom = frame.payload()?;

        let others: BTreeSet<UserId> = payload.members.into_iter().filter(|m| *m != caller).collect();
        if others.is_empty() {
            return Err(HandlerError::precondition("a room needs at least one other member"));
        }
        if others.len() + 1 > ctx.limits.max_room_members {
            return Err(HandlerError::precondition(format!(
                "room would have {} members, limit is {}",
                others.len() + 1,
                ctx.limits.max_room_members
            )));
        }
        for member in &others {
            if !ctx.chat.are_friends(caller, *member)? {
                return Err(HandlerError::precondition(format!(
                    "user {member} is not a friend of {caller}"
                )));
            }
        }
        if let (1, Some(&other)) = (others.len(), others.first()) {
            if ctx.chat.private_room_exists(caller, other)? {
                return Err(HandlerError::precondition(format!(
                    "a private room between {caller} and {other} already exists"
                )));
            }
        }

        let name = payload
            .chat_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        let members: Vec<UserId> = std::iter::once(caller).chain(others).collect();
        let room = ctx.chat.create_room(name, &members)?;

        Ok(Event::new(
            MessageKind::NewChatRoom,
            json!({
                "chat_id": room,
                "chat_name": name,
                "members": members,
                "sent_at": Utc::now().to_rfc3339(),
            }),
            Audience::identities(members.iter().copied()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_helpers::{befriend, failing, frame, setup, slow};
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn creates_room_with_friends() {
        let (ctx, store, u) = setup(3);
        befriend(&store, u[0], u[1]);
        befriend(&store, u[2], u[0]);

        let event = NewChatRoomHandler
            .handle(
                &frame(&json!({"type": "newChat", "members": [u[1], u[2]], "chat_name": " trio "})),
                u[0],
                &ctx,
            )
            .await
            .unwrap();

        assert_eq!(event.kind(), MessageKind::NewChatRoom);
        assert_eq!(event.audience(), &Audience::Identity(vec![u[0], u[1], u[2]]));
        assert_eq!(event.payload()["chat_name"], "trio");
        let room = parley_core::RoomId::new(event.payload()["chat_id"].as_i64().unwrap());
        assert_eq!(store.rooms().members(room).unwrap(), vec![u[0], u[1], u[2]]);
    }

    #[tokio::test]
    async fn creator_and_duplicates_are_stripped() {
        let (ctx, store, u) = setup(2);
        befriend(&store, u[0], u[1]);

        let event = NewChatRoomHandler
            .handle(
                &frame(&json!({"type": "newChat", "members": [u[1], u[0], u[1]]})),
                u[0],
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(event.payload()["members"], json!([u[0], u[1]]));
        assert!(event.payload()["chat_name"].is_null());
    }

    #[tokio::test]
    async fn non_friend_member_is_rejected() {
        let (ctx, store, u) = setup(3);
        befriend(&store, u[0], u[1]);

        let err = NewChatRoomHandler
            .handle(&frame(&json!({"type": "newChat", "members": [u[1], u[2]]})), u[0], &ctx)
            .await;
        assert_matches!(err, Err(HandlerError::Precondition(msg)) if msg.contains("not a friend"));
        assert!(store.rooms().membership(u[0]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_request_is_not_friendship() {
        let (ctx, store, u) = setup(2);
        store.friends().send_request(u[0], u[1]).unwrap();
        let err = NewChatRoomHandler
            .handle(&frame(&json!({"type": "newChat", "members": [u[1]]})), u[0], &ctx)
            .await;
        assert_matches!(err, Err(HandlerError::Precondition(_)));
    }

    #[tokio::test]
    async fn duplicate_private_room_is_rejected() {
        let (ctx, store, u) = setup(2);
        befriend(&store, u[0], u[1]);
        let request = frame(&json!({"type": "newChat", "members": [u[1]]}));

        let _ = NewChatRoomHandler.handle(&request, u[0], &ctx).await.unwrap();
        // from either side
        let err = NewChatRoomHandler
            .handle(&frame(&json!({"type": "newChat", "members": [u[0]]})), u[1], &ctx)
            .await;
        assert_matches!(err, Err(HandlerError::Precondition(msg)) if msg.contains("already exists"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_private_rooms_resolve_to_one() {
        let (_ctx, store, u) = setup(2);
        befriend(&store, u[0], u[1]);
        let ctx = slow(&store);

        let create = |from: UserId, with: UserId| {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                NewChatRoomHandler
                    .handle(&frame(&json!({"type": "newChat", "members": [with]})), from, &ctx)
                    .await
            })
        };
        let (first, second) = tokio::join!(create(u[0], u[1]), create(u[1], u[0]));
        let results = [first.unwrap(), second.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(
            |r| matches!(r, Err(HandlerError::Precondition(msg)) if msg.contains("already exists"))
        ));
        assert_eq!(store.rooms().membership(u[0]).unwrap().len(), 1);
        assert_eq!(store.rooms().membership(u[1]).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn group_with_existing_private_pair_is_allowed() {
        let (ctx, store, u) = setup(3);
        befriend(&store, u[0], u[1]);
        befriend(&store, u[0], u[2]);
        let _ = store.rooms().create(None, &[u[0], u[1]]).unwrap();

        let event = NewChatRoomHandler
            .handle(&frame(&json!({"type": "newChat", "members": [u[1], u[2]]})), u[0], &ctx)
            .await;
        assert!(event.is_ok());
    }

    #[tokio::test]
    async fn empty_member_list_is_rejected() {
        let (ctx, _store, u) = setup(1);
        for members in [json!([]), json!([u[0]])] {
            let err = NewChatRoomHandler
                .handle(&frame(&json!({"type": "newChat", "members": members})), u[0], &ctx)
                .await;
            assert_matches!(err, Err(HandlerError::Precondition(_)));
        }
    }

    #[tokio::test]
    async fn room_size_limit() {
        let (mut ctx, store, u) = setup(3);
        ctx.limits.max_room_members = 2;
        befriend(&store, u[0], u[1]);
        befriend(&store, u[0], u[2]);
        let err = NewChatRoomHandler
            .handle(&frame(&json!({"type": "newChat", "members": [u[1], u[2]]})), u[0], &ctx)
            .await;
        assert_matches!(err, Err(HandlerError::Precondition(msg)) if msg.contains("limit is 2"));
    }

    #[tokio::test]
    async fn persistence_failure_emits_nothing() {
        let (_ctx, store, u) = setup(2);
        befriend(&store, u[0], u[1]);
        let err = NewChatRoomHandler
            .handle(&frame(&json!({"type": "newChat", "members": [u[1]]})), u[0], &failing(&store))
            .await;
        assert_matches!(err, Err(HandlerError::Persistence(_)));
    }
}
