//! Reindex error types.

use search_reindex_repository::{RepositoryError, SearchError};
use thiserror::Error;

/// Errors raised by the reindex services and consumers.
#[derive(Error, Debug)]
pub enum ReindexError {
    /// A request was rejected before touching any state.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The system of record or the message bus failed.
    #[error("Integration error: {0}")]
    IntegrationError(String),

    /// Staging migration or search engine write failed.
    #[error("Reindex error: {0}")]
    ReindexFailure(String),

    /// No repository is registered for an entity type.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Relational repository error.
    #[error("Repository error: {0}")]
    RepositoryError(RepositoryError),

    /// Search engine error.
    #[error("Search error: {0}")]
    SearchError(#[from] SearchError),

    /// A message or record could not be parsed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Internal channel or task failure.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl ReindexError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn integration(msg: impl Into<String>) -> Self {
        Self::IntegrationError(msg.into())
    }

    pub fn reindex(msg: impl Into<String>) -> Self {
        Self::ReindexFailure(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::ChannelError(msg.into())
    }

    /// Whether redelivering the message that caused this error may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::IntegrationError(_)
                | Self::ReindexFailure(_)
                | Self::RepositoryError(_)
                | Self::SearchError(_)
                | Self::ChannelError(_)
        )
    }
}

impl From<RepositoryError> for ReindexError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Unsupported(entity_type) => Self::UnsupportedOperation(format!(
                "No repository registered for entity type {}",
                entity_type
            )),
            other => Self::RepositoryError(other),
        }
    }
}
