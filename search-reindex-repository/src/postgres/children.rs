//! PostgreSQL repository for dictionary and relationship rows.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use super::records::insert_rows;
use super::tables::{
    CALL_NUMBER, CLASSIFICATION, CONTRIBUTOR, INSTANCE_CALL_NUMBER, INSTANCE_CLASSIFICATION,
    INSTANCE_CONTRIBUTOR, INSTANCE_SUBJECT, SUBJECT,
};
use crate::errors::RepositoryError;
use crate::interfaces::ChildRecordRepository;
use search_reindex_shared::records::{
    CallNumberRow, ClassificationRow, ContributorRow, InstanceCallNumberRow, InstanceLinkRow,
    SubjectRow,
};
use search_reindex_shared::{ChildRows, ReindexContext};

pub struct PgChildRecordRepository {
    pool: PgPool,
}

impl PgChildRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn link_key(row: &InstanceLinkRow) -> (String, uuid::Uuid, String, String) {
    (
        row.target_id.clone(),
        row.instance_id,
        row.type_id.clone(),
        row.tenant_id.clone(),
    )
}

#[async_trait]
impl ChildRecordRepository for PgChildRecordRepository {
    #[instrument(skip(self, ctx, children), fields(tenant_id = %ctx.tenant_id()))]
    async fn save_children(
        &self,
        ctx: &ReindexContext,
        children: &ChildRows,
    ) -> Result<u64, RepositoryError> {
        let pool = &self.pool;
        let mut saved = 0;

        saved += insert_rows(
            pool,
            ctx,
            &SUBJECT,
            &children.subjects,
            |row: &SubjectRow| row.id.clone(),
            |b, row| {
                b.push_bind(row.id.clone())
                    .push_bind(row.value.clone())
                    .push_bind(row.authority_id.clone())
                    .push_bind(row.source_id.clone())
                    .push_bind(row.type_id.clone());
            },
        )
        .await?;

        saved += insert_rows(
            pool,
            ctx,
            &INSTANCE_SUBJECT,
            &children.instance_subjects,
            link_key,
            |b, row| {
                b.push_bind(row.target_id.clone())
                    .push_bind(row.instance_id)
                    .push_bind(row.tenant_id.clone())
                    .push_bind(row.shared);
            },
        )
        .await?;

        saved += insert_rows(
            pool,
            ctx,
            &CONTRIBUTOR,
            &children.contributors,
            |row: &ContributorRow| row.id.clone(),
            |b, row| {
                b.push_bind(row.id.clone())
                    .push_bind(row.name.clone())
                    .push_bind(row.name_type_id.clone())
                    .push_bind(row.authority_id.clone());
            },
        )
        .await?;

        saved += insert_rows(
            pool,
            ctx,
            &INSTANCE_CONTRIBUTOR,
            &children.instance_contributors,
            link_key,
            |b, row| {
                b.push_bind(row.target_id.clone())
                    .push_bind(row.instance_id)
                    .push_bind(row.type_id.clone())
                    .push_bind(row.tenant_id.clone())
                    .push_bind(row.shared);
            },
        )
        .await?;

        saved += insert_rows(
            pool,
            ctx,
            &CLASSIFICATION,
            &children.classifications,
            |row: &ClassificationRow| row.id.clone(),
            |b, row| {
                b.push_bind(row.id.clone())
                    .push_bind(row.number.clone())
                    .push_bind(row.type_id.clone());
            },
        )
        .await?;

        saved += insert_rows(
            pool,
            ctx,
            &INSTANCE_CLASSIFICATION,
            &children.instance_classifications,
            link_key,
            |b, row| {
                b.push_bind(row.target_id.clone())
                    .push_bind(row.instance_id)
                    .push_bind(row.tenant_id.clone())
                    .push_bind(row.shared);
            },
        )
        .await?;

        saved += insert_rows(
            pool,
            ctx,
            &CALL_NUMBER,
            &children.call_numbers,
            |row: &CallNumberRow| row.id.clone(),
            |b, row| {
                b.push_bind(row.id.clone())
                    .push_bind(row.call_number.clone())
                    .push_bind(row.prefix.clone())
                    .push_bind(row.suffix.clone())
                    .push_bind(row.type_id.clone());
            },
        )
        .await?;

        saved += insert_rows(
            pool,
            ctx,
            &INSTANCE_CALL_NUMBER,
            &children.instance_call_numbers,
            |row: &InstanceCallNumberRow| {
                (
                    row.call_number_id.clone(),
                    row.item_id,
                    row.instance_id,
                    row.tenant_id.clone(),
                )
            },
            |b, row| {
                b.push_bind(row.call_number_id.clone())
                    .push_bind(row.item_id)
                    .push_bind(row.instance_id)
                    .push_bind(row.tenant_id.clone())
                    .push_bind(row.location_id.clone());
            },
        )
        .await?;

        debug!(rows = saved, "Saved child rows");
        Ok(saved)
    }
}
