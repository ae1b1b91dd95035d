//! PostgreSQL repositories for instances, holdings and items.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::tables::{TableKind, TableSpec, HOLDING, INSTANCE, ITEM};
use super::{last_by_key, INSERT_CHUNK_SIZE};
use crate::errors::RepositoryError;
use crate::interfaces::{MergeRecordRepository, UploadRecordRepository};
use crate::types::{FetchedRecord, UploadRangeStrategy};
use search_reindex_shared::records::{HoldingRow, InstanceRow, ItemRow};
use search_reindex_shared::{RangeBound, RecordBatch, ReindexContext, ReindexEntityType, UploadBounds};

/// Insert `rows` into the table `ctx` writes `spec` rows to.
///
/// Staging tables are append-only; canonical writes upsert on the natural
/// key, so duplicates within `rows` are collapsed to the last occurrence.
pub(crate) async fn insert_rows<T, K, F, B>(
    pool: &PgPool,
    ctx: &ReindexContext,
    spec: &TableSpec,
    rows: &[T],
    key: F,
    bind: B,
) -> Result<u64, RepositoryError>
where
    K: Eq + std::hash::Hash,
    F: Fn(&T) -> K,
    B: Fn(&mut sqlx::query_builder::Separated<'_, '_, Postgres, &'static str>, &T),
{
    if rows.is_empty() {
        return Ok(0);
    }

    let table = spec.target(ctx);
    let rows: Vec<&T> = if ctx.is_reindex() {
        rows.iter().collect()
    } else {
        last_by_key(rows, key)
    };

    let mut inserted = 0;
    for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(spec.insert_prefix(&table));
        builder.push_values(chunk, |mut separated, row| bind(&mut separated, row));
        if !ctx.is_reindex() {
            builder.push(spec.conflict_clause(spec.kind != TableKind::Relationship));
        }
        inserted += builder.build().execute(pool).await?.rows_affected();
    }

    debug!(table = %table, rows = inserted, "Inserted record rows");
    Ok(inserted)
}

pub struct PgInstanceRepository {
    pool: PgPool,
}

impl PgInstanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Instance document with its holdings and items embedded.
    fn document_sql(ctx: &ReindexContext, condition: &str, suffix: &str) -> String {
        format!(
            "SELECT i.id, i.tenant_id, i.json || jsonb_build_object(\
                'id', i.id, 'tenantId', i.tenant_id, 'shared', i.shared, \
                'isBoundWith', i.is_bound_with, \
                'holdings', COALESCE((SELECT jsonb_agg(h.json || jsonb_build_object('tenantId', h.tenant_id)) \
                    FROM {holding} h WHERE h.instance_id = i.id), '[]'::jsonb), \
                'items', COALESCE((SELECT jsonb_agg(it.json || jsonb_build_object('tenantId', it.tenant_id)) \
                    FROM {item} it WHERE it.instance_id = i.id), '[]'::jsonb)) \
             FROM {instance} i {condition} ORDER BY i.id {suffix}",
            holding = ctx.schema().table(HOLDING.name),
            item = ctx.schema().table(ITEM.name),
            instance = ctx.schema().table(INSTANCE.name),
            condition = condition,
            suffix = suffix,
        )
    }
}

fn parse_uuid_bound(bound: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(bound)
        .map_err(|e| RepositoryError::invalid_value(format!("Invalid identifier bound '{}': {}", bound, e)))
}

#[async_trait]
impl MergeRecordRepository for PgInstanceRepository {
    fn entity_type(&self) -> ReindexEntityType {
        ReindexEntityType::Instance
    }

    async fn save_entities(
        &self,
        ctx: &ReindexContext,
        batch: &RecordBatch,
    ) -> Result<u64, RepositoryError> {
        insert_rows(
            &self.pool,
            ctx,
            &INSTANCE,
            &batch.instances,
            |row: &InstanceRow| row.id,
            |b, row| {
                b.push_bind(row.id)
                    .push_bind(row.tenant_id.clone())
                    .push_bind(row.shared)
                    .push_bind(row.is_bound_with)
                    .push_bind(row.json.clone());
            },
        )
        .await
    }
}

#[async_trait]
impl UploadRecordRepository for PgInstanceRepository {
    fn entity_type(&self) -> ReindexEntityType {
        ReindexEntityType::Instance
    }

    fn strategy(&self) -> UploadRangeStrategy {
        UploadRangeStrategy::IdentifierSpace
    }

    async fn count(&self, ctx: &ReindexContext) -> Result<i64, RepositoryError> {
        let sql = format!("SELECT count(*) FROM {}", ctx.schema().table(INSTANCE.name));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn fetch_range(
        &self,
        ctx: &ReindexContext,
        bounds: &UploadBounds,
    ) -> Result<Vec<FetchedRecord>, RepositoryError> {
        let rows: Vec<(Uuid, String, Value)> = match bounds {
            UploadBounds::Ids { lower, upper } => {
                let bound = RangeBound {
                    lower: lower.clone(),
                    upper: upper.clone(),
                };
                let sql = Self::document_sql(ctx, "WHERE i.id >= $1 AND ($3 OR i.id < $2)", "");
                sqlx::query_as(&sql)
                    .bind(parse_uuid_bound(lower)?)
                    .bind(parse_uuid_bound(upper)?)
                    .bind(bound.is_open_ended())
                    .fetch_all(&self.pool)
                    .await?
            }
            UploadBounds::Page { offset, limit } => {
                let sql = Self::document_sql(ctx, "", "OFFSET $1 LIMIT $2");
                sqlx::query_as(&sql)
                    .bind(*offset)
                    .bind(*limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|(id, tenant_id, json)| FetchedRecord {
                id: id.to_string(),
                tenant_id,
                json,
            })
            .collect())
    }
}

pub struct PgHoldingRepository {
    pool: PgPool,
}

impl PgHoldingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MergeRecordRepository for PgHoldingRepository {
    fn entity_type(&self) -> ReindexEntityType {
        ReindexEntityType::Holdings
    }

    async fn save_entities(
        &self,
        ctx: &ReindexContext,
        batch: &RecordBatch,
    ) -> Result<u64, RepositoryError> {
        insert_rows(
            &self.pool,
            ctx,
            &HOLDING,
            &batch.holdings,
            |row: &HoldingRow| row.id,
            |b, row| {
                b.push_bind(row.id)
                    .push_bind(row.tenant_id.clone())
                    .push_bind(row.instance_id)
                    .push_bind(row.json.clone());
            },
        )
        .await
    }
}

pub struct PgItemRepository {
    pool: PgPool,
}

impl PgItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MergeRecordRepository for PgItemRepository {
    fn entity_type(&self) -> ReindexEntityType {
        ReindexEntityType::Item
    }

    async fn save_entities(
        &self,
        ctx: &ReindexContext,
        batch: &RecordBatch,
    ) -> Result<u64, RepositoryError> {
        insert_rows(
            &self.pool,
            ctx,
            &ITEM,
            &batch.items,
            |row: &ItemRow| row.id,
            |b, row| {
                b.push_bind(row.id)
                    .push_bind(row.tenant_id.clone())
                    .push_bind(row.instance_id)
                    .push_bind(row.holding_id)
                    .push_bind(row.json.clone());
            },
        )
        .await
    }
}
