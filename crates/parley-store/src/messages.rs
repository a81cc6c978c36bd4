use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use parley_core::{MessageId, RoomId, UserId};

use crate::database::Database;
use crate::error::StoreError;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct MessageRow {
    pub id: MessageId,
    pub chat_id: RoomId,
    pub sender_id: UserId,
    pub content: String,
    pub sent_at: String,
}

#[derive(Clone)]
pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, content), fields(room = %room, sender = %sender))]
    pub fn append(
        &self,
        room: RoomId,
        sender: UserId,
        content: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<MessageId, StoreError> {
        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO messages (chat_id, sender_id, content, sent_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![room.get(), sender.get(), content, sent_at.to_rfc3339()],
            )?;
            Ok(MessageId::new(conn.last_insert_rowid()))
        })
    }

    /// The latest `limit` messages of a room, oldest first.
    #[instrument(skip(self), fields(room = %room))]
    pub fn recent(&self, room: RoomId, limit: usize) -> Result<Vec<MessageRow>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, content, sent_at FROM (
                    SELECT * FROM messages WHERE chat_id = ?1 ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![room.get(), limit], |row| {
                    Ok(MessageRow {
                        id: MessageId::new(row.get(0)?),
                        chat_id: RoomId::new(row.get(1)?),
                        sender_id: UserId::new(row.get(2)?),
                        content: row.get(3)?,
                        sent_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
