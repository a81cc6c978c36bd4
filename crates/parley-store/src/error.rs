use parley_core::ServiceError;

/// Errors raised by the SQLite layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Any SQLite failure that is not a constraint violation.
    #[error("database error: {0}")]
    Database(String),

    /// The targeted row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness, check or foreign-key constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored value could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem failure while opening the database.
    #[error("IO error: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(e.to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

impl From<chrono::ParseError> for StoreError {
    fn from(e: chrono::ParseError) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => ServiceError::NotFound(msg),
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            other => ServiceError::Backend(other.to_string()),
        }
    }
}
