use std::collections::HashSet;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, instrument};

use parley_core::{RoomId, UserId};

use crate::database::Database;
use crate::error::StoreError;

fn private_exists(conn: &Connection, a: UserId, b: UserId) -> Result<bool, StoreError> {
    Ok(conn.query_row(
        "SELECT EXISTS (
            SELECT 1 FROM chats c
            WHERE c.is_group = 0
              AND EXISTS (SELECT 1 FROM chat_users WHERE chat_id = c.id AND user_id = ?1)
              AND EXISTS (SELECT 1 FROM chat_users WHERE chat_id = c.id AND user_id = ?2)
              AND (SELECT COUNT(*) FROM chat_users WHERE chat_id = c.id) = 2
        )",
        [a.get(), b.get()],
        |row| row.get(0),
    )?)
}

/// Chat rooms and their membership.
#[derive(Clone)]
pub struct RoomRepo {
    db: Database,
}

impl RoomRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a room with the given members (creator included).
    ///
    /// A room with more than two members is a group; an empty name is stored as NULL.
    /// A pair may share at most one private room: the existence check runs in
    /// the same transaction as the insert, so a second create for the pair is
    /// `Conflict` even when two writers race.
    #[instrument(skip(self, members), fields(members = members.len()))]
    pub fn create(&self, name: Option<&str>, members: &[UserId]) -> Result<RoomId, StoreError> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let is_group = members.len() > 2;

        self.db.with_tx(|tx| {
            if let &[a, b] = members {
                if private_exists(tx, a, b)? {
                    return Err(StoreError::Conflict(format!(
                        "a private room between {a} and {b} already exists"
                    )));
                }
            }
            let _ = tx.execute(
                "INSERT INTO chats (name, is_group, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![name, is_group, Utc::now().to_rfc3339()],
            )?;
            let room = RoomId::new(tx.last_insert_rowid());
            {
                let mut stmt =
                    tx.prepare("INSERT OR IGNORE INTO chat_users (chat_id, user_id) VALUES (?1, ?2)")?;
                for member in members {
                    let _ = stmt.execute([room.get(), member.get()])?;
                }
            }
            debug!(room_id = %room, is_group, "room created");
            Ok(room)
        })
    }

    /// Every room `user` belongs to.
    #[instrument(skip(self), fields(user = %user))]
    pub fn membership(&self, user: UserId) -> Result<HashSet<RoomId>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT chat_id FROM chat_users WHERE user_id = ?1")?;
            let rooms = stmt
                .query_map([user.get()], |row| row.get::<_, i64>(0))?
                .map(|r| r.map(RoomId::new))
                .collect::<Result<HashSet<_>, _>>()?;
            Ok(rooms)
        })
    }

    #[instrument(skip(self), fields(room = %room, user = %user))]
    pub fn is_member(&self, room: RoomId, user: UserId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM chat_users WHERE chat_id = ?1 AND user_id = ?2)",
                [room.get(), user.get()],
                |row| row.get(0),
            )?)
        })
    }

    /// Whether a non-group room with exactly the members `{a, b}` exists.
    #[instrument(skip(self), fields(a = %a, b = %b))]
    pub fn private_room_exists(&self, a: UserId, b: UserId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| private_exists(conn, a, b))
    }

    /// Members of a room, ascending.
    #[instrument(skip(self), fields(room = %room))]
    pub fn members(&self, room: RoomId) -> Result<Vec<UserId>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM chat_users WHERE chat_id = ?1 ORDER BY user_id")?;
            let ids = stmt
                .query_map([room.get()], |row| row.get::<_, i64>(0))?
                .map(|r| r.map(UserId::new))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountRepo;
    use assert_matches::assert_matches;

    fn setup(n: usize) -> (RoomRepo, Vec<UserId>) {
        let db = Database::in_memory().unwrap();
        let accounts = AccountRepo::new(db.clone());
        let users = (0..n)
            .map(|i| accounts.create_user(&format!("u{i}@example.com")).unwrap().id)
            .collect();
        (RoomRepo::new(db), users)
    }

    fn is_group(repo: &RoomRepo, room: RoomId) -> bool {
        repo.db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT is_group FROM chats WHERE id = ?1", [room.get()], |r| {
                    r.get(0)
                })?)
            })
            .unwrap()
    }

    #[test]
    fn create_and_list_members() {
        let (repo, u) = setup(3);
        let room = repo.create(Some("trio"), &u).unwrap();
        assert_eq!(repo.members(room).unwrap(), u);
        assert!(is_group(&repo, room));
        assert!(repo.is_member(room, u[2]).unwrap());
    }

    #[test]
    fn pair_room_is_private() {
        let (repo, u) = setup(3);
        let room = repo.create(None, &u[..2]).unwrap();
        assert!(!is_group(&repo, room));
        assert!(repo.private_room_exists(u[0], u[1]).unwrap());
        assert!(repo.private_room_exists(u[1], u[0]).unwrap());
        assert!(!repo.private_room_exists(u[0], u[2]).unwrap());
    }

    #[test]
    fn second_private_room_for_pair_conflicts() {
        let (repo, u) = setup(2);
        let first = repo.create(None, &[u[0], u[1]]).unwrap();
        assert_matches!(
            repo.create(Some("again"), &[u[1], u[0]]),
            Err(StoreError::Conflict(msg)) if msg.contains("already exists")
        );
        assert_eq!(repo.membership(u[0]).unwrap(), HashSet::from([first]));
    }

    #[test]
    fn group_room_does_not_count_as_private() {
        let (repo, u) = setup(3);
        let _ = repo.create(Some("trio"), &u).unwrap();
        assert!(!repo.private_room_exists(u[0], u[1]).unwrap());
    }

    #[test]
    fn membership_snapshot() {
        let (repo, u) = setup(3);
        let r1 = repo.create(None, &[u[0], u[1]]).unwrap();
        let r2 = repo.create(Some("g"), &u).unwrap();
        let rooms = repo.membership(u[0]).unwrap();
        assert_eq!(rooms, HashSet::from([r1, r2]));
        assert_eq!(repo.membership(u[2]).unwrap(), HashSet::from([r2]));
    }

    #[test]
    fn blank_name_stored_as_null() {
        let (repo, u) = setup(2);
        let room = repo.create(Some("  "), &u).unwrap();
        let name: Option<String> = repo
            .db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT name FROM chats WHERE id = ?1", [room.get()], |r| r.get(0))?)
            })
            .unwrap();
        assert!(name.is_none());
    }

    #[test]
    fn unknown_member_rolls_back() {
        let (repo, u) = setup(1);
        assert_matches!(
            repo.create(None, &[u[0], UserId::new(404)]),
            Err(StoreError::Conflict(_))
        );
        assert!(repo.membership(u[0]).unwrap().is_empty());
    }
}
