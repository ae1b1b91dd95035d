//! PostgreSQL upload repositories for the dictionary tables.
//!
//! Dictionary ids are hex digests, so their upload ranges are hex prefixes.
//! Each document aggregates the linked instances per tenant; rows no longer
//! linked to any instance are skipped.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use super::tables::{
    TableSpec, CALL_NUMBER, CLASSIFICATION, CONTRIBUTOR, INSTANCE_CALL_NUMBER,
    INSTANCE_CLASSIFICATION, INSTANCE_CONTRIBUTOR, INSTANCE_SUBJECT, SUBJECT,
};
use crate::errors::RepositoryError;
use crate::interfaces::UploadRecordRepository;
use crate::types::{FetchedRecord, UploadRangeStrategy};
use search_reindex_shared::{RangeBound, ReindexContext, ReindexEntityType, UploadBounds};

/// The dictionary table a [`PgDictionaryRepository`] reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionarySource {
    Subject,
    Contributor,
    Classification,
    CallNumber,
}

struct DictionaryLayout {
    entity_type: ReindexEntityType,
    table: TableSpec,
    link: TableSpec,
    /// Link column referencing the dictionary id.
    link_column: &'static str,
    /// (column, document field) pairs.
    fields: &'static [(&'static str, &'static str)],
    /// Link columns the instance counts are grouped by.
    group_by: &'static [(&'static str, &'static str)],
}

impl DictionarySource {
    fn layout(self) -> DictionaryLayout {
        match self {
            Self::Subject => DictionaryLayout {
                entity_type: ReindexEntityType::Subject,
                table: SUBJECT,
                link: INSTANCE_SUBJECT,
                link_column: "subject_id",
                fields: &[
                    ("value", "value"),
                    ("authority_id", "authorityId"),
                    ("source_id", "sourceId"),
                    ("type_id", "typeId"),
                ],
                group_by: &[("tenant_id", "tenantId"), ("shared", "shared")],
            },
            Self::Contributor => DictionaryLayout {
                entity_type: ReindexEntityType::Contributor,
                table: CONTRIBUTOR,
                link: INSTANCE_CONTRIBUTOR,
                link_column: "contributor_id",
                fields: &[
                    ("name", "name"),
                    ("name_type_id", "contributorNameTypeId"),
                    ("authority_id", "authorityId"),
                ],
                group_by: &[
                    ("tenant_id", "tenantId"),
                    ("shared", "shared"),
                    ("type_id", "typeId"),
                ],
            },
            Self::Classification => DictionaryLayout {
                entity_type: ReindexEntityType::Classification,
                table: CLASSIFICATION,
                link: INSTANCE_CLASSIFICATION,
                link_column: "classification_id",
                fields: &[("number", "number"), ("type_id", "typeId")],
                group_by: &[("tenant_id", "tenantId"), ("shared", "shared")],
            },
            Self::CallNumber => DictionaryLayout {
                entity_type: ReindexEntityType::CallNumber,
                table: CALL_NUMBER,
                link: INSTANCE_CALL_NUMBER,
                link_column: "call_number_id",
                fields: &[
                    ("call_number", "fullCallNumber"),
                    ("call_number_prefix", "callNumberPrefix"),
                    ("call_number_suffix", "callNumberSuffix"),
                    ("call_number_type_id", "callNumberTypeId"),
                ],
                group_by: &[("tenant_id", "tenantId"), ("location_id", "locationId")],
            },
        }
    }
}

pub struct PgDictionaryRepository {
    pool: PgPool,
    source: DictionarySource,
}

impl PgDictionaryRepository {
    pub fn new(pool: PgPool, source: DictionarySource) -> Self {
        Self { pool, source }
    }

    fn document_sql(&self, ctx: &ReindexContext, condition: &str, suffix: &str) -> String {
        document_sql(&self.source.layout(), ctx, condition, suffix)
    }
}

fn document_sql(
    layout: &DictionaryLayout,
    ctx: &ReindexContext,
    condition: &str,
    suffix: &str,
) -> String {
    let link = ctx.schema().table(layout.link.name);

    let fields = layout
        .fields
        .iter()
        .map(|(column, field)| format!("'{}', d.{}", field, column))
        .collect::<Vec<_>>()
        .join(", ");
    let group_columns = layout
        .group_by
        .iter()
        .map(|(column, _)| *column)
        .collect::<Vec<_>>()
        .join(", ");
    let group_fields = layout
        .group_by
        .iter()
        .map(|(column, field)| format!("'{}', l.{}", field, column))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT d.id, jsonb_build_object('id', d.id, {fields}, 'instances', COALESCE((\
            SELECT jsonb_agg(jsonb_build_object({group_fields}, 'count', l.count)) \
            FROM (SELECT {group_columns}, count(*) AS count FROM {link} \
                  WHERE {link_column} = d.id GROUP BY {group_columns}) l), '[]'::jsonb)) \
         FROM {table} d \
         WHERE EXISTS (SELECT 1 FROM {link} x WHERE x.{link_column} = d.id){condition} \
         ORDER BY d.id{suffix}",
        fields = fields,
        group_fields = group_fields,
        group_columns = group_columns,
        link = link,
        link_column = layout.link_column,
        table = ctx.schema().table(layout.table.name),
        condition = condition,
        suffix = suffix,
    )
}

#[async_trait]
impl UploadRecordRepository for PgDictionaryRepository {
    fn entity_type(&self) -> ReindexEntityType {
        self.source.layout().entity_type
    }

    fn strategy(&self) -> UploadRangeStrategy {
        UploadRangeStrategy::HexSpace
    }

    async fn count(&self, ctx: &ReindexContext) -> Result<i64, RepositoryError> {
        let layout = self.source.layout();
        let sql = format!("SELECT count(*) FROM {}", ctx.schema().table(layout.table.name));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn fetch_range(
        &self,
        ctx: &ReindexContext,
        bounds: &UploadBounds,
    ) -> Result<Vec<FetchedRecord>, RepositoryError> {
        let rows: Vec<(String, Value)> = match bounds {
            UploadBounds::Ids { lower, upper } => {
                let open_ended = RangeBound {
                    lower: lower.clone(),
                    upper: upper.clone(),
                }
                .is_open_ended();
                let sql = self.document_sql(ctx, " AND d.id >= $1 AND ($3 OR d.id < $2)", "");
                sqlx::query_as(&sql)
                    .bind(lower.as_str())
                    .bind(upper.as_str())
                    .bind(open_ended)
                    .fetch_all(&self.pool)
                    .await?
            }
            UploadBounds::Page { offset, limit } => {
                let sql = self.document_sql(ctx, "", " OFFSET $1 LIMIT $2");
                sqlx::query_as(&sql)
                    .bind(*offset)
                    .bind(*limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let tenant_id = ctx.schema_tenant_id().to_string();
        Ok(rows
            .into_iter()
            .map(|(id, json)| FetchedRecord {
                id,
                tenant_id: tenant_id.clone(),
                json,
            })
            .collect())
    }
}
