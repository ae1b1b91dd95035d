//! Transactional execution of set-based statements.

use async_trait::async_trait;

use crate::errors::RepositoryError;
use crate::types::SqlStatement;

/// Runs a list of statements as one unit of work.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Execute `statements` in order inside one transaction and return the
    /// rows affected by each. Any failure rolls the whole transaction back.
    async fn execute_in_transaction(
        &self,
        statements: &[SqlStatement],
    ) -> Result<Vec<u64>, RepositoryError>;
}
