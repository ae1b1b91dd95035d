//! Merge ranges and staging of pulled records.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use search_reindex_repository::{
    ChildRecordRepository, MergeRangeRepository, RepositoryRegistry, UploadRangeRepository,
};
use search_reindex_shared::range::{empty_range, partition_identifier_space};
use search_reindex_shared::records::parse_records;
use search_reindex_shared::{
    MergeRange, ReindexContext, ReindexEntityType, ReindexRecordsEvent,
};

use crate::errors::ReindexError;
use crate::integration::RecordSourceClient;

/// Creates merge ranges and persists the records pulled for them.
pub struct MergeRangeService {
    ranges: Arc<dyn MergeRangeRepository>,
    upload_ranges: Arc<dyn UploadRangeRepository>,
    children: Arc<dyn ChildRecordRepository>,
    registry: RepositoryRegistry,
    source: Arc<dyn RecordSourceClient>,
    range_size: i64,
}

impl MergeRangeService {
    pub fn new(
        ranges: Arc<dyn MergeRangeRepository>,
        upload_ranges: Arc<dyn UploadRangeRepository>,
        children: Arc<dyn ChildRecordRepository>,
        registry: RepositoryRegistry,
        source: Arc<dyn RecordSourceClient>,
        range_size: i64,
    ) -> Self {
        Self {
            ranges,
            upload_ranges,
            children,
            registry,
            source,
            range_size,
        }
    }

    /// Create and persist the merge ranges of the acting tenant.
    ///
    /// Each merge type gets `ceil(count / range_size)` ranges over the
    /// identifier space, or one range spanning it when the source reports no
    /// records.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn create_merge_ranges(
        &self,
        ctx: &ReindexContext,
    ) -> Result<Vec<MergeRange>, ReindexError> {
        if self.range_size <= 0 {
            return Err(ReindexError::validation(format!(
                "Merge range size must be positive, got {}",
                self.range_size
            )));
        }

        let mut ranges = Vec::new();
        for entity_type in ReindexEntityType::merge_types() {
            let count = self.source.fetch_record_count(ctx, entity_type).await?;
            let bounds = if count <= 0 {
                vec![empty_range()]
            } else {
                partition_identifier_space(ceil_div(count, self.range_size))
            };

            debug!(entity_type = %entity_type, count = count, ranges = bounds.len(), "Partitioned merge ranges");
            ranges.extend(
                bounds
                    .into_iter()
                    .map(|bound| MergeRange::new(entity_type, ctx.tenant_id(), bound)),
            );
        }

        self.ranges.save_ranges(ctx, &ranges).await?;
        info!(count = ranges.len(), "Created merge ranges");
        Ok(ranges)
    }

    /// Ranges of `entity_type` for every tenant sharing the schema.
    pub async fn fetch_merge_ranges(
        &self,
        ctx: &ReindexContext,
        entity_type: ReindexEntityType,
    ) -> Result<Vec<MergeRange>, ReindexError> {
        Ok(self.ranges.fetch_ranges(ctx, entity_type).await?)
    }

    pub async fn fetch_failed_merge_ranges(
        &self,
        ctx: &ReindexContext,
    ) -> Result<Vec<MergeRange>, ReindexError> {
        Ok(self.ranges.fetch_failed(ctx).await?)
    }

    /// Finish `range_id`, failed when `fail_cause` is set.
    ///
    /// Returns false if the range had already been finished.
    pub async fn update_status(
        &self,
        ctx: &ReindexContext,
        range_id: Uuid,
        fail_cause: Option<String>,
    ) -> Result<bool, ReindexError> {
        Ok(self
            .ranges
            .finish_range(ctx, range_id, Utc::now(), fail_cause)
            .await?)
    }

    pub async fn reset_range(&self, ctx: &ReindexContext, range_id: Uuid) -> Result<(), ReindexError> {
        Ok(self.ranges.reset_range(ctx, range_id).await?)
    }

    /// Save the records of `event` to the staging tables, with the rows
    /// embedded in them and the dictionary rows extracted from them.
    #[instrument(skip(self, ctx, event), fields(tenant_id = %event.tenant, range_id = %event.range_id, record_type = %event.record_type))]
    pub async fn save_entities(
        &self,
        ctx: &ReindexContext,
        event: &ReindexRecordsEvent,
    ) -> Result<u64, ReindexError> {
        let batch = parse_records(event.record_type, &event.tenant, &event.records)
            .map_err(|e| ReindexError::parse(e.to_string()))?;

        let mut saved = self
            .registry
            .merge(event.record_type)?
            .save_entities(ctx, &batch)
            .await?;

        let embedded = [
            (ReindexEntityType::Holdings, batch.holdings.len()),
            (ReindexEntityType::Item, batch.items.len()),
        ];
        for (entity_type, rows) in embedded {
            if entity_type != event.record_type && rows > 0 {
                saved += self
                    .registry
                    .merge(entity_type)?
                    .save_entities(ctx, &batch)
                    .await?;
            }
        }

        let children = batch.children();
        if !children.is_empty() {
            saved += self.children.save_children(ctx, &children).await?;
        }

        debug!(records = event.records.len(), rows = saved, "Saved records to staging");
        Ok(saved)
    }

    pub async fn truncate_merge_ranges(&self, ctx: &ReindexContext) -> Result<(), ReindexError> {
        Ok(self.ranges.truncate(ctx).await?)
    }

    /// Clear merge and upload range bookkeeping of the previous cycle.
    pub async fn delete_all_range_records(&self, ctx: &ReindexContext) -> Result<(), ReindexError> {
        self.truncate_merge_ranges(ctx).await?;
        self.upload_ranges.truncate(ctx).await?;
        info!(tenant_id = %ctx.tenant_id(), "Deleted range records");
        Ok(())
    }

    pub async fn delete_ranges_for_tenant(
        &self,
        ctx: &ReindexContext,
        tenant_id: &str,
    ) -> Result<u64, ReindexError> {
        let deleted = self.ranges.delete_for_tenant(ctx, tenant_id).await?;
        info!(tenant_id = %tenant_id, deleted = deleted, "Deleted merge ranges of tenant");
        Ok(deleted)
    }
}

pub(crate) fn ceil_div(count: i64, size: i64) -> i64 {
    count / size + i64::from(count % size > 0)
}
