//! Upload ranges over the canonical tables.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use search_reindex_repository::{RepositoryRegistry, UploadRangeRepository, UploadRangeStrategy};
use search_reindex_shared::range::{partition_hex_space, partition_identifier_space};
use search_reindex_shared::{
    ReindexContext, ReindexEntityType, ReindexRangeIndexEvent, ResourceEvent, UploadBounds,
    UploadRange,
};

use crate::errors::ReindexError;
use crate::producer::RangeEventPublisher;
use crate::service::merge_range::ceil_div;
use crate::service::status::ReindexStatusService;

/// Lays upload ranges over canonical tables and reads them back for indexing.
pub struct UploadRangeService {
    ranges: Arc<dyn UploadRangeRepository>,
    registry: RepositoryRegistry,
    status: ReindexStatusService,
    publisher: Arc<dyn RangeEventPublisher>,
    range_size: i64,
    range_level: usize,
}

impl UploadRangeService {
    pub fn new(
        ranges: Arc<dyn UploadRangeRepository>,
        registry: RepositoryRegistry,
        status: ReindexStatusService,
        publisher: Arc<dyn RangeEventPublisher>,
        range_size: i64,
        range_level: usize,
    ) -> Self {
        Self {
            ranges,
            registry,
            status,
            publisher,
            range_size,
            range_level,
        }
    }

    /// Entity types that can be uploaded.
    pub fn upload_types(&self) -> Vec<ReindexEntityType> {
        self.registry.upload_types()
    }

    /// Create the upload ranges of `entity_type`, mark its upload started and
    /// publish one range-index event per range.
    ///
    /// Fails with `UnsupportedOperation` before touching any state when no
    /// repository serves `entity_type`.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn prepare_and_send_index_ranges(
        &self,
        ctx: &ReindexContext,
        entity_type: ReindexEntityType,
    ) -> Result<usize, ReindexError> {
        let repository = self.registry.upload(entity_type)?;

        let count = repository.count(ctx).await?;
        let ranges: Vec<UploadRange> = upload_bounds(
            repository.strategy(),
            count,
            self.range_size,
            self.range_level,
        )?
        .into_iter()
        .map(|bounds| UploadRange::new(entity_type, bounds))
        .collect();

        self.ranges.replace_ranges(ctx, entity_type, &ranges).await?;
        self.status
            .mark_upload_started(ctx, entity_type, ranges.len())
            .await?;

        let events: Vec<ReindexRangeIndexEvent> = ranges
            .iter()
            .map(|range| ReindexRangeIndexEvent::for_range(range, ctx.schema_tenant_id()))
            .collect();
        self.publisher.publish_range_events(&events).await?;

        info!(entity_type = %entity_type, records = count, ranges = ranges.len(), "Sent upload ranges");
        Ok(ranges.len())
    }

    /// Canonical rows within the event's range as resource events.
    pub async fn fetch_record_range(
        &self,
        ctx: &ReindexContext,
        event: &ReindexRangeIndexEvent,
    ) -> Result<Vec<ResourceEvent>, ReindexError> {
        let repository = self.registry.upload(event.entity_type)?;
        let records = repository.fetch_range(ctx, &event.bounds).await?;

        Ok(records
            .into_iter()
            .map(|record| {
                ResourceEvent::reindex(record.id, record.tenant_id, event.entity_type, record.json)
            })
            .collect())
    }

    /// Stamp the finish time of the event's range; false if already finished.
    pub async fn update_finish_date(
        &self,
        ctx: &ReindexContext,
        event: &ReindexRangeIndexEvent,
    ) -> Result<bool, ReindexError> {
        Ok(self.ranges.set_finished(ctx, event.id, Utc::now()).await?)
    }
}

/// Upload bounds for a table of `count` rows.
///
/// Empty tables get no ranges, except that hex-space tables always use the
/// full prefix enumeration once they hold rows.
pub fn upload_bounds(
    strategy: UploadRangeStrategy,
    count: i64,
    range_size: i64,
    range_level: usize,
) -> Result<Vec<UploadBounds>, ReindexError> {
    if range_size <= 0 {
        return Err(ReindexError::validation(format!(
            "Upload range size must be positive, got {}",
            range_size
        )));
    }
    if count <= 0 {
        return Ok(Vec::new());
    }

    let bounds = match strategy {
        UploadRangeStrategy::IdentifierSpace => {
            partition_identifier_space(ceil_div(count, range_size))
                .into_iter()
                .map(UploadBounds::from)
                .collect()
        }
        UploadRangeStrategy::HexSpace => partition_hex_space(range_level)
            .map_err(|e| ReindexError::validation(e.to_string()))?
            .into_iter()
            .map(UploadBounds::from)
            .collect(),
        UploadRangeStrategy::Paging => (0..ceil_div(count, range_size))
            .map(|page| UploadBounds::Page {
                offset: page * range_size,
                limit: range_size,
            })
            .collect(),
    };

    Ok(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, Harness};
    use pretty_assertions::assert_eq;
    use search_reindex_repository::FetchedRecord;
    use search_reindex_shared::StatusKind;
    use serde_json::json;

    #[test]
    fn test_identifier_space_bounds() {
        let bounds = upload_bounds(UploadRangeStrategy::IdentifierSpace, 2500, 1000, 3).unwrap();
        assert_eq!(bounds.len(), 3);
        assert!(matches!(&bounds[0], UploadBounds::Ids { lower, .. } if lower == &"0".repeat(32)));
    }

    #[test]
    fn test_hex_space_bounds_use_level() {
        let bounds = upload_bounds(UploadRangeStrategy::HexSpace, 5, 1000, 2).unwrap();
        assert_eq!(bounds.len(), 256);
        assert_eq!(
            bounds.last(),
            Some(&UploadBounds::Ids {
                lower: "ff".into(),
                upper: "xx".into()
            })
        );
    }

    #[test]
    fn test_paging_bounds() {
        let bounds = upload_bounds(UploadRangeStrategy::Paging, 25, 10, 3).unwrap();
        assert_eq!(
            bounds,
            vec![
                UploadBounds::Page { offset: 0, limit: 10 },
                UploadBounds::Page { offset: 10, limit: 10 },
                UploadBounds::Page { offset: 20, limit: 10 },
            ]
        );
    }

    #[test]
    fn test_empty_table_and_invalid_size() {
        assert!(upload_bounds(UploadRangeStrategy::HexSpace, 0, 10, 3).unwrap().is_empty());
        assert!(upload_bounds(UploadRangeStrategy::Paging, 10, 0, 3).is_err());
        assert!(upload_bounds(UploadRangeStrategy::HexSpace, 10, 10, 0).is_err());
    }

    #[tokio::test]
    async fn test_prepare_publishes_one_event_per_range() {
        let harness = Harness::new();
        harness.subjects.set_count(10);
        let ctx = context("central");
        harness.recreate_statuses(&ctx).await;

        let sent = harness
            .services
            .upload
            .prepare_and_send_index_ranges(&ctx, ReindexEntityType::Subject)
            .await
            .unwrap();

        let events = harness.publisher.events();
        assert_eq!(sent, 4096);
        assert_eq!(events.len(), 4096);
        assert!(events.iter().all(|e| e.tenant == "central"));
        assert_eq!(harness.upload_ranges.ranges(ReindexEntityType::Subject).len(), 4096);

        let status = harness.statuses.status(ReindexEntityType::Subject);
        assert_eq!(status.status, StatusKind::UploadInProgress);
        assert_eq!(status.total_upload_ranges, 4096);
    }

    #[tokio::test]
    async fn test_member_events_carry_central_tenant() {
        let harness = Harness::new();
        harness.instance_uploads.set_count(1);
        let ctx = context("central").acting_as("member");
        harness.recreate_statuses(&ctx).await;

        harness
            .services
            .upload
            .prepare_and_send_index_ranges(&ctx, ReindexEntityType::Instance)
            .await
            .unwrap();

        assert_eq!(harness.publisher.events()[0].tenant, "central");
    }

    #[tokio::test]
    async fn test_unregistered_type_is_unsupported() {
        let harness = Harness::new();
        let ctx = context("central");

        let result = harness
            .services
            .upload
            .prepare_and_send_index_ranges(&ctx, ReindexEntityType::Holdings)
            .await;

        assert!(matches!(result, Err(ReindexError::UnsupportedOperation(_))));
        assert!(harness.publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_record_range_tags_tenant_and_resource() {
        let harness = Harness::new();
        harness.subjects.set_records(vec![FetchedRecord {
            id: "0a1b".into(),
            tenant_id: "member".into(),
            json: json!({"id": "0a1b", "value": "History"}),
        }]);
        let ctx = context("central");
        let event = ReindexRangeIndexEvent::for_range(
            &UploadRange::new(
                ReindexEntityType::Subject,
                UploadBounds::Ids {
                    lower: "0a".into(),
                    upper: "0b".into(),
                },
            ),
            "central",
        );

        let resources = harness
            .services
            .upload
            .fetch_record_range(&ctx, &event)
            .await
            .unwrap();

        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].tenant, "member");
        assert_eq!(resources[0].resource_name, "instance_subject");
    }
}
