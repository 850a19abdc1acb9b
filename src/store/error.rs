// src/store/error.rs

use thiserror::Error;

/// Errors surfaced by [`TaskStore`](super::TaskStore).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The schema has not been created yet (`init_schema` was never run).
    #[error("Database not initialized: {0}")]
    NotInitialized(String),

    #[error("Connection failed after {attempts} attempts: {reason}")]
    ConnectionFailed { attempts: u32, reason: String },

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Blocking store task failed: {0}")]
    Join(String),

    #[error("Store is closed")]
    Closed,
}

impl StoreError {
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, StoreError::NotInitialized(_))
    }

    pub fn is_route_not_found(&self) -> bool {
        matches!(self, StoreError::RouteNotFound(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("no such table") => {
                StoreError::NotInitialized(msg.clone())
            }
            _ => StoreError::Sqlite(err),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
