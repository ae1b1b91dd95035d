//! PostgreSQL transactional statement runner.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::errors::RepositoryError;
use crate::interfaces::MigrationStore;
use crate::types::SqlStatement;

pub struct PgMigrationStore {
    pool: PgPool,
}

impl PgMigrationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MigrationStore for PgMigrationStore {
    #[instrument(skip(self, statements), fields(statements = statements.len()))]
    async fn execute_in_transaction(
        &self,
        statements: &[SqlStatement],
    ) -> Result<Vec<u64>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut affected = Vec::with_capacity(statements.len());

        for statement in statements {
            let mut query = sqlx::query(&statement.sql);
            if let Some(tenant_id) = &statement.tenant_id {
                query = query.bind(tenant_id.as_str());
            }

            let rows = query
                .execute(&mut *tx)
                .await
                .map_err(|e| RepositoryError::database(format!("{}: {}", statement.label, e)))?
                .rows_affected();

            debug!(label = %statement.label, rows = rows, "Executed statement");
            affected.push(rows);
        }

        tx.commit().await?;
        Ok(affected)
    }
}
