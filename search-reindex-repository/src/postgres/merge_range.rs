//! PostgreSQL merge range repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::tables::MERGE_RANGE_TABLE;
use super::INSERT_CHUNK_SIZE;
use crate::errors::RepositoryError;
use crate::interfaces::MergeRangeRepository;
use search_reindex_shared::{MergeRange, ReindexContext, ReindexEntityType};

const COLUMNS: &str =
    "id, entity_type, tenant_id, lower_bound, upper_bound, created_at, finished_at, fail_cause";

type MergeRangeRow = (
    Uuid,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<String>,
);

pub struct PgMergeRangeRepository {
    pool: PgPool,
}

impl PgMergeRangeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn into_range(row: MergeRangeRow) -> Result<MergeRange, RepositoryError> {
        let (id, entity_type, tenant_id, lower_bound, upper_bound, created_at, finished_at, fail_cause) =
            row;

        Ok(MergeRange {
            id,
            entity_type: entity_type.parse()?,
            tenant_id,
            lower_bound,
            upper_bound,
            created_at,
            finished_at,
            fail_cause,
        })
    }

    async fn fetch_where(
        &self,
        ctx: &ReindexContext,
        condition: &str,
        entity_type: Option<ReindexEntityType>,
    ) -> Result<Vec<MergeRange>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY entity_type, tenant_id, lower_bound",
            COLUMNS,
            ctx.schema().table(MERGE_RANGE_TABLE),
            condition
        );

        let mut query = sqlx::query_as::<_, MergeRangeRow>(&sql);
        if let Some(entity_type) = entity_type {
            query = query.bind(entity_type.as_str());
        }

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::into_range)
            .collect()
    }
}

#[async_trait]
impl MergeRangeRepository for PgMergeRangeRepository {
    #[instrument(skip(self, ctx, ranges), fields(tenant_id = %ctx.tenant_id(), count = ranges.len()))]
    async fn save_ranges(
        &self,
        ctx: &ReindexContext,
        ranges: &[MergeRange],
    ) -> Result<(), RepositoryError> {
        let table = ctx.schema().table(MERGE_RANGE_TABLE);

        for chunk in ranges.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} ({}) ", table, COLUMNS));
            builder.push_values(chunk, |mut row, range| {
                row.push_bind(range.id)
                    .push_bind(range.entity_type.as_str())
                    .push_bind(range.tenant_id.clone())
                    .push_bind(range.lower_bound.clone())
                    .push_bind(range.upper_bound.clone())
                    .push_bind(range.created_at)
                    .push_bind(range.finished_at)
                    .push_bind(range.fail_cause.clone());
            });
            builder.build().execute(&self.pool).await?;
        }

        debug!("Saved merge ranges");
        Ok(())
    }

    async fn fetch_ranges(
        &self,
        ctx: &ReindexContext,
        entity_type: ReindexEntityType,
    ) -> Result<Vec<MergeRange>, RepositoryError> {
        self.fetch_where(ctx, "entity_type = $1", Some(entity_type)).await
    }

    async fn fetch_failed(&self, ctx: &ReindexContext) -> Result<Vec<MergeRange>, RepositoryError> {
        self.fetch_where(ctx, "fail_cause IS NOT NULL", None).await
    }

    async fn finish_range(
        &self,
        ctx: &ReindexContext,
        range_id: Uuid,
        finished_at: DateTime<Utc>,
        fail_cause: Option<String>,
    ) -> Result<bool, RepositoryError> {
        let sql = format!(
            "UPDATE {} SET finished_at = $2, fail_cause = $3 WHERE id = $1 AND finished_at IS NULL",
            ctx.schema().table(MERGE_RANGE_TABLE)
        );

        let result = sqlx::query(&sql)
            .bind(range_id)
            .bind(finished_at)
            .bind(fail_cause)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reset_range(&self, ctx: &ReindexContext, range_id: Uuid) -> Result<(), RepositoryError> {
        let sql = format!(
            "UPDATE {} SET finished_at = NULL, fail_cause = NULL WHERE id = $1",
            ctx.schema().table(MERGE_RANGE_TABLE)
        );

        sqlx::query(&sql).bind(range_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn truncate(&self, ctx: &ReindexContext) -> Result<(), RepositoryError> {
        let sql = format!("TRUNCATE TABLE {}", ctx.schema().table(MERGE_RANGE_TABLE));
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_for_tenant(
        &self,
        ctx: &ReindexContext,
        tenant_id: &str,
    ) -> Result<u64, RepositoryError> {
        let sql = format!(
            "DELETE FROM {} WHERE tenant_id = $1",
            ctx.schema().table(MERGE_RANGE_TABLE)
        );

        let result = sqlx::query(&sql).bind(tenant_id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
