//! Staging deduplication and migration.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument};

use search_reindex_repository::postgres::migration::{
    truncate_canonical, truncate_staging, UPSERT_PREFIX,
};
use search_reindex_repository::postgres::{MergeStrategy, MigrationPlan};
use search_reindex_repository::MigrationStore;
use search_reindex_shared::ReindexContext;

use crate::errors::ReindexError;

/// Outcome of one migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationResult {
    pub strategy: MergeStrategy,
    /// Upserted rows per canonical table.
    pub upserted: BTreeMap<String, u64>,
    pub duration: Duration,
}

impl MigrationResult {
    pub fn total_upserted(&self) -> u64 {
        self.upserted.values().sum()
    }
}

/// Moves staged rows into the canonical tables in one transaction.
pub struct StagingMigrationService {
    store: Arc<dyn MigrationStore>,
    strategy: MergeStrategy,
}

impl StagingMigrationService {
    pub fn new(store: Arc<dyn MigrationStore>, strategy: MergeStrategy) -> Self {
        Self { store, strategy }
    }

    /// Upsert the staged rows of the context's schema into its canonical
    /// tables, then empty staging.
    ///
    /// With `target_tenant_id` the tenant's canonical rows are deleted first.
    /// On failure nothing is committed and staging keeps its rows.
    #[instrument(skip(self, ctx), fields(schema = %ctx.schema(), strategy = %self.strategy))]
    pub async fn run(
        &self,
        ctx: &ReindexContext,
        target_tenant_id: Option<&str>,
    ) -> Result<MigrationResult, ReindexError> {
        let started = Instant::now();
        let statements = MigrationPlan::new(ctx.schema(), self.strategy)
            .for_target_tenant(target_tenant_id)
            .statements();

        let affected = self
            .store
            .execute_in_transaction(&statements)
            .await
            .map_err(|e| {
                error!(error = %e, "Staging migration rolled back");
                ReindexError::reindex(format!("Staging migration failed: {}", e))
            })?;

        let upserted = statements
            .iter()
            .zip(affected)
            .filter_map(|(statement, rows)| {
                statement
                    .label
                    .strip_prefix(UPSERT_PREFIX)
                    .map(|table| (table.to_string(), rows))
            })
            .collect();

        let result = MigrationResult {
            strategy: self.strategy,
            upserted,
            duration: started.elapsed(),
        };

        info!(
            upserted = result.total_upserted(),
            duration_ms = result.duration.as_millis() as u64,
            "Staging migration completed"
        );
        Ok(result)
    }

    pub async fn truncate_staging(&self, ctx: &ReindexContext) -> Result<(), ReindexError> {
        self.store
            .execute_in_transaction(&[truncate_staging(ctx.schema())])
            .await?;
        Ok(())
    }

    /// Empty the canonical and staging tables before a full cycle.
    pub async fn truncate_canonical(&self, ctx: &ReindexContext) -> Result<(), ReindexError> {
        self.store
            .execute_in_transaction(&[truncate_canonical(ctx.schema()), truncate_staging(ctx.schema())])
            .await?;
        Ok(())
    }
}
