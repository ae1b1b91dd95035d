//! Error types for the shared crate.

use thiserror::Error;

/// Errors raised by the range partitioner and by model parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    /// An argument was outside the accepted domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A persisted or received value could not be decoded.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl RangeError {
    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an invalid value error.
    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }
}
