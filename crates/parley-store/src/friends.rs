//! The friendship graph.
//!
//! A pair is in exactly one of three states: no edge, one pending request,
//! or friends. The unordered-pair unique index on `friend_requests` and the
//! `user_low < user_high` key on `friends` make every transition idempotent
//! under concurrent writers: the loser of a race gets `Conflict` or
//! `NotFound`, never a second edge.

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, instrument};

use parley_core::UserId;

use crate::database::Database;
use crate::error::StoreError;

fn ordered(a: UserId, b: UserId) -> (i64, i64) {
    if a <= b { (a.get(), b.get()) } else { (b.get(), a.get()) }
}

fn friends_exist(conn: &Connection, a: UserId, b: UserId) -> Result<bool, StoreError> {
    let (low, high) = ordered(a, b);
    Ok(conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM friends WHERE user_low = ?1 AND user_high = ?2)",
        [low, high],
        |row| row.get(0),
    )?)
}

#[derive(Clone)]
pub struct FriendRepo {
    db: Database,
}

impl FriendRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(a = %a, b = %b))]
    pub fn are_friends(&self, a: UserId, b: UserId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| friends_exist(conn, a, b))
    }

    #[instrument(skip(self), fields(sender = %sender, receiver = %receiver))]
    pub fn is_requested(&self, sender: UserId, receiver: UserId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM friend_requests WHERE sender_id = ?1 AND receiver_id = ?2)",
                [sender.get(), receiver.get()],
                |row| row.get(0),
            )?)
        })
    }

    /// Insert a pending `sender → receiver` request.
    ///
    /// `Conflict` if the pair are already friends or a request exists in
    /// either direction.
    #[instrument(skip(self), fields(sender = %sender, receiver = %receiver))]
    pub fn send_request(&self, sender: UserId, receiver: UserId) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            if friends_exist(tx, sender, receiver)? {
                return Err(StoreError::Conflict(format!(
                    "{sender} and {receiver} are already friends"
                )));
            }
            let _ = tx.execute(
                "INSERT INTO friend_requests (sender_id, receiver_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![sender.get(), receiver.get(), Utc::now().to_rfc3339()],
            )?;
            debug!("friend request recorded");
            Ok(())
        })
    }

    /// Consume the exact `sender → accepter` request and record the friendship.
    #[instrument(skip(self), fields(accepter = %accepter, sender = %sender))]
    pub fn accept_request(&self, accepter: UserId, sender: UserId) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            let deleted = tx.execute(
                "DELETE FROM friend_requests WHERE sender_id = ?1 AND receiver_id = ?2",
                [sender.get(), accepter.get()],
            )?;
            if deleted == 0 {
                return Err(StoreError::NotFound(format!(
                    "friend request {sender} -> {accepter}"
                )));
            }
            let (low, high) = ordered(accepter, sender);
            let _ = tx.execute(
                "INSERT INTO friends (user_low, user_high, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![low, high, Utc::now().to_rfc3339()],
            )?;
            debug!("friend request accepted");
            Ok(())
        })
    }

    /// Delete the exact `sender → receiver` request.
    #[instrument(skip(self), fields(sender = %sender, receiver = %receiver))]
    pub fn reject_request(&self, sender: UserId, receiver: UserId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM friend_requests WHERE sender_id = ?1 AND receiver_id = ?2",
                [sender.get(), receiver.get()],
            )?;
            if deleted == 0 {
                return Err(StoreError::NotFound(format!(
                    "friend request {sender} -> {receiver}"
                )));
            }
            Ok(())
        })
    }

    #[instrument(skip(self), fields(user = %user, friend = %friend))]
    pub fn remove(&self, user: UserId, friend: UserId) -> Result<(), StoreError> {
        let (low, high) = ordered(user, friend);
        self.db.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM friends WHERE user_low = ?1 AND user_high = ?2",
                [low, high],
            )?;
            if deleted == 0 {
                return Err(StoreError::NotFound(format!("friendship {user} <-> {friend}")));
            }
            Ok(())
        })
    }

    /// Every friend of `user`, ascending.
    #[instrument(skip(self), fields(user = %user))]
    pub fn friends_of(&self, user: UserId) -> Result<Vec<UserId>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_high FROM friends WHERE user_low = ?1
                 UNION
                 SELECT user_low FROM friends WHERE user_high = ?1
                 ORDER BY 1",
            )?;
            let ids = stmt
                .query_map([user.get()], |row| row.get::<_, i64>(0))?
                .map(|r| r.map(UserId::new))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }
}
