//! PostgreSQL reindex status repository.
//!
//! Updates lock the affected rows (`SELECT ... FOR UPDATE`) and apply the
//! transition rules of [`ReindexStatus`] inside one transaction, so
//! concurrent range completions never lose an increment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument};

use super::tables::REINDEX_STATUS_TABLE;
use crate::errors::RepositoryError;
use crate::interfaces::StatusRepository;
use search_reindex_shared::model::complete_merge_phase;
use search_reindex_shared::{
    MergeCompletion, ReindexContext, ReindexEntityType, ReindexStatus, StatusUpdate,
};

const COLUMNS: &str = "entity_type, status, total_merge_ranges, processed_merge_ranges, \
     total_upload_ranges, processed_upload_ranges, start_time_merge, end_time_merge, \
     start_time_upload, end_time_upload, target_tenant_id";

type StatusRow = (
    String,
    String,
    i32,
    i32,
    i32,
    i32,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<String>,
);

pub struct PgStatusRepository {
    pool: PgPool,
}

impl PgStatusRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_status(row: StatusRow) -> Result<ReindexStatus, RepositoryError> {
    Ok(ReindexStatus {
        entity_type: row.0.parse()?,
        status: row.1.parse()?,
        total_merge_ranges: row.2,
        processed_merge_ranges: row.3,
        total_upload_ranges: row.4,
        processed_upload_ranges: row.5,
        start_time_merge: row.6,
        end_time_merge: row.7,
        start_time_upload: row.8,
        end_time_upload: row.9,
        target_tenant_id: row.10,
    })
}

async fn insert_row(
    conn: &mut PgConnection,
    table: &str,
    status: &ReindexStatus,
) -> Result<(), RepositoryError> {
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        table, COLUMNS
    );

    sqlx::query(&sql)
        .bind(status.entity_type.as_str())
        .bind(status.status.as_str())
        .bind(status.total_merge_ranges)
        .bind(status.processed_merge_ranges)
        .bind(status.total_upload_ranges)
        .bind(status.processed_upload_ranges)
        .bind(status.start_time_merge)
        .bind(status.end_time_merge)
        .bind(status.start_time_upload)
        .bind(status.end_time_upload)
        .bind(status.target_tenant_id.clone())
        .execute(conn)
        .await?;

    Ok(())
}

async fn update_row(
    conn: &mut PgConnection,
    table: &str,
    status: &ReindexStatus,
) -> Result<(), RepositoryError> {
    let sql = format!(
        "UPDATE {} SET status = $2, total_merge_ranges = $3, processed_merge_ranges = $4, \
         total_upload_ranges = $5, processed_upload_ranges = $6, start_time_merge = $7, \
         end_time_merge = $8, start_time_upload = $9, end_time_upload = $10 \
         WHERE entity_type = $1",
        table
    );

    sqlx::query(&sql)
        .bind(status.entity_type.as_str())
        .bind(status.status.as_str())
        .bind(status.total_merge_ranges)
        .bind(status.processed_merge_ranges)
        .bind(status.total_upload_ranges)
        .bind(status.processed_upload_ranges)
        .bind(status.start_time_merge)
        .bind(status.end_time_merge)
        .bind(status.start_time_upload)
        .bind(status.end_time_upload)
        .execute(conn)
        .await?;

    Ok(())
}

#[async_trait]
impl StatusRepository for PgStatusRepository {
    #[instrument(skip(self, ctx, rows), fields(tenant_id = %ctx.tenant_id()))]
    async fn recreate(
        &self,
        ctx: &ReindexContext,
        rows: &[ReindexStatus],
    ) -> Result<(), RepositoryError> {
        let table = ctx.schema().table(REINDEX_STATUS_TABLE);
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *tx)
            .await?;
        for row in rows {
            insert_row(&mut tx, &table, row).await?;
        }

        tx.commit().await?;
        info!(count = rows.len(), "Recreated reindex status rows");
        Ok(())
    }

    async fn apply(
        &self,
        ctx: &ReindexContext,
        entity_type: ReindexEntityType,
        update: StatusUpdate,
    ) -> Result<bool, RepositoryError> {
        let table = ctx.schema().table(REINDEX_STATUS_TABLE);
        let mut tx = self.pool.begin().await?;

        let row: Option<StatusRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE entity_type = $1 FOR UPDATE",
            COLUMNS, table
        ))
        .bind(entity_type.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(false);
        };

        let mut status = into_status(row)?;
        let changed = status.apply(update, Utc::now());
        if changed {
            update_row(&mut tx, &table, &status).await?;
        }

        tx.commit().await?;
        Ok(changed)
    }

    async fn fetch_all(&self, ctx: &ReindexContext) -> Result<Vec<ReindexStatus>, RepositoryError> {
        let rows: Vec<StatusRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} ORDER BY entity_type",
            COLUMNS,
            ctx.schema().table(REINDEX_STATUS_TABLE)
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut statuses = rows
            .into_iter()
            .map(into_status)
            .collect::<Result<Vec<_>, _>>()?;
        statuses.sort_by_key(|status| status.entity_type);
        Ok(statuses)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()))]
    async fn complete_merge(
        &self,
        ctx: &ReindexContext,
    ) -> Result<Option<MergeCompletion>, RepositoryError> {
        let table = ctx.schema().table(REINDEX_STATUS_TABLE);
        let mut tx = self.pool.begin().await?;

        let rows: Vec<StatusRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} ORDER BY entity_type FOR UPDATE",
            COLUMNS, table
        ))
        .fetch_all(&mut *tx)
        .await?;

        let mut statuses = rows
            .into_iter()
            .map(into_status)
            .collect::<Result<Vec<_>, _>>()?;

        let Some(completion) = complete_merge_phase(&mut statuses, Utc::now()) else {
            return Ok(None);
        };

        for status in statuses.iter().filter(|s| s.entity_type.supports_merge()) {
            update_row(&mut tx, &table, status).await?;
        }

        tx.commit().await?;
        info!("Merge phase completed");
        Ok(Some(completion))
    }
}
