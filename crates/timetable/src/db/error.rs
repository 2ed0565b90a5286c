//! Error types for the schedule store.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The active snapshot can't be deleted
    #[error("Schedule {id} is the active schedule")]
    ActiveSchedule { id: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corrupt data: {0}")]
    Corrupt(String),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
                StoreError::Conflict(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => StoreError::Database(err),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}
