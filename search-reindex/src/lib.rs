//! # Search Reindex
//!
//! Entry point and configuration of the search reindex pipeline: settings
//! from the environment, logging setup and dependency wiring.

pub mod config;

pub use config::{Dependencies, Settings};

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Errors that can occur during startup or while running a command.
#[derive(Error, Debug)]
pub enum ReindexAppError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] search_reindex_pipeline::ReindexError),

    /// Repository error.
    #[error("Repository error: {0}")]
    RepositoryError(#[from] search_reindex_repository::RepositoryError),

    /// Search error.
    #[error("Search error: {0}")]
    SearchError(#[from] search_reindex_repository::SearchError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ReindexAppError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` selects the filter (default `info`); `LOG_FORMAT=json` switches
/// to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
