//! [`ParleyStore`]: the repositories bundled behind the collaborator traits.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};

use parley_core::{
    AccountService, AuthError, ChatService, MessageId, RoomId, ServiceError, UserId,
};

use crate::accounts::AccountRepo;
use crate::database::Database;
use crate::error::StoreError;
use crate::friends::FriendRepo;
use crate::messages::MessageRepo;
use crate::rooms::RoomRepo;

/// One database, four repositories.
#[derive(Clone)]
pub struct ParleyStore {
    db: Database,
    accounts: AccountRepo,
    friends: FriendRepo,
    rooms: RoomRepo,
    messages: MessageRepo,
}

impl ParleyStore {
    /// Wrap an open database.
    pub fn new(db: Database) -> Self {
        Self {
            accounts: AccountRepo::new(db.clone()),
            friends: FriendRepo::new(db.clone()),
            rooms: RoomRepo::new(db.clone()),
            messages: MessageRepo::new(db.clone()),
            db,
        }
    }

    /// Open or create a file-backed store.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Database::open(path).map(Self::new)
    }

    /// Fresh in-memory store.
    pub fn in_memory() -> Result<Self, StoreError> {
        Database::in_memory().map(Self::new)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn accounts(&self) -> &AccountRepo {
        &self.accounts
    }

    pub fn friends(&self) -> &FriendRepo {
        &self.friends
    }

    pub fn rooms(&self) -> &RoomRepo {
        &self.rooms
    }

    pub fn messages(&self) -> &MessageRepo {
        &self.messages
    }

    /// Issue a session valid for `ttl_hours`.
    pub fn issue_session(&self, user: UserId, ttl_hours: u32) -> Result<String, StoreError> {
        self.accounts.create_session(user, Duration::hours(i64::from(ttl_hours)))
    }
}

impl AccountService for ParleyStore {
    fn verify_session(&self, token: &str) -> Result<UserId, AuthError> {
        self.accounts.verify_session(token)
    }
}

impl ChatService for ParleyStore {
    fn membership(&self, user: UserId) -> Result<HashSet<RoomId>, ServiceError> {
        Ok(self.rooms.membership(user)?)
    }

    fn is_member(&self, room: RoomId, user: UserId) -> Result<bool, ServiceError> {
        Ok(self.rooms.is_member(room, user)?)
    }

    fn are_friends(&self, a: UserId, b: UserId) -> Result<bool, ServiceError> {
        Ok(self.friends.are_friends(a, b)?)
    }

    fn is_requested(&self, sender: UserId, receiver: UserId) -> Result<bool, ServiceError> {
        Ok(self.friends.is_requested(sender, receiver)?)
    }

    fn private_room_exists(&self, a: UserId, b: UserId) -> Result<bool, ServiceError> {
        Ok(self.rooms.private_room_exists(a, b)?)
    }

    fn create_room(&self, name: Option<&str>, members: &[UserId]) -> Result<RoomId, ServiceError> {
        Ok(self.rooms.create(name, members)?)
    }

    fn append_message(
        &self,
        room: RoomId,
        sender: UserId,
        content: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<MessageId, ServiceError> {
        Ok(self.messages.append(room, sender, content, sent_at)?)
    }

    fn send_friend_request(&self, sender: UserId, receiver: UserId) -> Result<(), ServiceError> {
        Ok(self.friends.send_request(sender, receiver)?)
    }

    fn accept_friend_request(&self, accepter: UserId, sender: UserId) -> Result<(), ServiceError> {
        Ok(self.friends.accept_request(accepter, sender)?)
    }

    fn reject_friend_request(&self, sender: UserId, receiver: UserId) -> Result<(), ServiceError> {
        Ok(self.friends.reject_request(sender, receiver)?)
    }

    fn remove_friend(&self, user: UserId, friend: UserId) -> Result<(), ServiceError> {
        Ok(self.friends.remove(user, friend)?)
    }
}
