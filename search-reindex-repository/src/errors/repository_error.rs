//! Relational repository error types.

use search_reindex_shared::{RangeError, ReindexEntityType};
use thiserror::Error;

/// Errors raised by the relational repositories.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Failed to connect to the database.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A statement failed to execute.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored row could not be decoded.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// A stored value did not match the expected format.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// No repository is registered for the entity type.
    #[error("No repository registered for entity type {0}")]
    Unsupported(ReindexEntityType),
}

impl RepositoryError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::DatabaseError(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::DecodeError(msg.into())
    }

    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

impl From<RangeError> for RepositoryError {
    fn from(e: RangeError) -> Self {
        Self::InvalidValue(e.to_string())
    }
}
