//! PostgreSQL upload range repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::tables::UPLOAD_RANGE_TABLE;
use super::INSERT_CHUNK_SIZE;
use crate::errors::RepositoryError;
use crate::interfaces::UploadRangeRepository;
use search_reindex_shared::{ReindexContext, ReindexEntityType, UploadBounds, UploadRange};

pub struct PgUploadRangeRepository {
    pool: PgPool,
}

impl PgUploadRangeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Identifier bounds and paging bounds share the table; the unused pair is null.
fn bound_columns(
    bounds: &UploadBounds,
) -> (Option<String>, Option<String>, Option<i64>, Option<i64>) {
    match bounds {
        UploadBounds::Ids { lower, upper } => (Some(lower.clone()), Some(upper.clone()), None, None),
        UploadBounds::Page { offset, limit } => (None, None, Some(*offset), Some(*limit)),
    }
}

#[async_trait]
impl UploadRangeRepository for PgUploadRangeRepository {
    async fn replace_ranges(
        &self,
        ctx: &ReindexContext,
        entity_type: ReindexEntityType,
        ranges: &[UploadRange],
    ) -> Result<(), RepositoryError> {
        let table = ctx.schema().table(UPLOAD_RANGE_TABLE);
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DELETE FROM {} WHERE entity_type = $1", table))
            .bind(entity_type.as_str())
            .execute(&mut *tx)
            .await?;

        for chunk in ranges.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (id, entity_type, lower_bound, upper_bound, range_offset, \
                 range_limit, created_at, finished_at) ",
                table
            ));
            builder.push_values(chunk, |mut row, range| {
                let (lower, upper, offset, limit) = bound_columns(&range.bounds);
                row.push_bind(range.id)
                    .push_bind(range.entity_type.as_str())
                    .push_bind(lower)
                    .push_bind(upper)
                    .push_bind(offset)
                    .push_bind(limit)
                    .push_bind(range.created_at)
                    .push_bind(range.finished_at);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_finished(
        &self,
        ctx: &ReindexContext,
        range_id: Uuid,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let sql = format!(
            "UPDATE {} SET finished_at = $2 WHERE id = $1 AND finished_at IS NULL",
            ctx.schema().table(UPLOAD_RANGE_TABLE)
        );

        let result = sqlx::query(&sql)
            .bind(range_id)
            .bind(finished_at)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn truncate(&self, ctx: &ReindexContext) -> Result<(), RepositoryError> {
        let sql = format!("TRUNCATE TABLE {}", ctx.schema().table(UPLOAD_RANGE_TABLE));
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}
