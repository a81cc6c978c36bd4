use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rusqlite::OptionalExtension;
use serde::Serialize;
use tracing::{debug, instrument};

use parley_core::{AuthError, UserId};

use crate::database::Database;
use crate::error::StoreError;

#[derive(Clone, Debug, Serialize)]
pub struct UserRow {
    pub id: UserId,
    pub email: String,
    pub created_at: String,
}

/// Users and login sessions.
#[derive(Clone)]
pub struct AccountRepo {
    db: Database,
}

impl AccountRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register a new account. `Conflict` if the email is taken.
    #[instrument(skip(self))]
    pub fn create_user(&self, email: &str) -> Result<UserRow, StoreError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            let _ = conn.execute(
                "INSERT INTO users (email, created_at) VALUES (?1, ?2)",
                rusqlite::params![email, now],
            )?;
            Ok(UserRow {
                id: UserId::new(conn.last_insert_rowid()),
                email: email.to_string(),
                created_at: now,
            })
        })
    }

    /// Look up an account by email.
    #[instrument(skip(self))]
    pub fn find_user(&self, email: &str) -> Result<Option<UserRow>, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, email, created_at FROM users WHERE email = ?1",
                    [email],
                    |row| {
                        Ok(UserRow {
                            id: UserId::new(row.get(0)?),
                            email: row.get(1)?,
                            created_at: row.get(2)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    /// Look up an account by email, creating it if absent.
    #[instrument(skip(self))]
    pub fn get_or_create_user(&self, email: &str) -> Result<UserRow, StoreError> {
        match self.find_user(email)? {
            Some(user) => Ok(user),
            None => self.create_user(email),
        }
    }

    /// Issue a fresh session token valid for `ttl`.
    #[instrument(skip(self), fields(user_id = %user))]
    pub fn create_session(&self, user: UserId, ttl: Duration) -> Result<String, StoreError> {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        let now = Utc::now();
        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO sessions (token, user_id, created_at, expires_at, is_valid)
                 VALUES (?1, ?2, ?3, ?4, 1)",
                rusqlite::params![
                    token,
                    user.get(),
                    now.to_rfc3339(),
                    (now + ttl).to_rfc3339()
                ],
            )?;
            Ok(())
        })?;

        debug!("session issued");
        Ok(token)
    }

    /// Revoke a session. Revoking an unknown token is a no-op.
    #[instrument(skip_all)]
    pub fn kill_session(&self, token: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let _ = conn.execute("UPDATE sessions SET is_valid = 0 WHERE token = ?1", [token])?;
            Ok(())
        })
    }

    /// Resolve a token to its user, checking revocation and expiry.
    #[instrument(skip_all)]
    pub fn verify_session(&self, token: &str) -> Result<UserId, AuthError> {
        let row = self
            .db
            .with_conn(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT user_id, is_valid, expires_at FROM sessions WHERE token = ?1",
                        [token],
                        |row| {
                            Ok((
                                row.get::<_, i64>(0)?,
                                row.get::<_, bool>(1)?,
                                row.get::<_, String>(2)?,
                            ))
                        },
                    )
                    .optional()?)
            })
            .map_err(|e| AuthError::Lookup(e.to_string()))?;

        let Some((user_id, is_valid, expires_at)) = row else {
            return Err(AuthError::InvalidSession);
        };
        if !is_valid {
            return Err(AuthError::InvalidSession);
        }
        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map_err(|e| AuthError::Lookup(e.to_string()))?;
        if Utc::now() >= expires_at {
            return Err(AuthError::SessionExpired);
        }
        Ok(UserId::new(user_id))
    }
}
