//! Handling of records events and the end of the merge phase.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use search_reindex_shared::{ReindexContext, ReindexEntityType, ReindexRecordsEvent};

use crate::errors::ReindexError;
use crate::service::merge_range::MergeRangeService;
use crate::service::migration::StagingMigrationService;
use crate::service::status::ReindexStatusService;
use crate::service::upload_range::UploadRangeService;

/// Stages pulled records and starts the upload phase once every merge range
/// has been processed.
pub struct RecordsEventService {
    merge: Arc<MergeRangeService>,
    upload: Arc<UploadRangeService>,
    status: ReindexStatusService,
    migration: Arc<StagingMigrationService>,
}

impl RecordsEventService {
    pub fn new(
        merge: Arc<MergeRangeService>,
        upload: Arc<UploadRangeService>,
        status: ReindexStatusService,
        migration: Arc<StagingMigrationService>,
    ) -> Self {
        Self {
            merge,
            upload,
            status,
            migration,
        }
    }

    /// Save one records event.
    ///
    /// A failed save is recorded on the range and marks the entity type
    /// `MERGE_FAILED`; it is not redelivered. A range already finished by an
    /// earlier delivery is not counted again.
    #[instrument(skip(self, ctx, event), fields(tenant_id = %event.tenant, range_id = %event.range_id, record_type = %event.record_type))]
    pub async fn process(
        &self,
        ctx: &ReindexContext,
        event: &ReindexRecordsEvent,
    ) -> Result<(), ReindexError> {
        if let Err(e) = self.merge.save_entities(ctx, event).await {
            error!(error = %e, "Failed to save records");
            self.merge
                .update_status(ctx, event.range_id, Some(e.to_string()))
                .await?;
            self.status
                .mark_merge_failed(ctx, &[event.record_type])
                .await?;
            return Ok(());
        }

        if !self.merge.update_status(ctx, event.range_id, None).await? {
            debug!("Merge range already finished");
            return Ok(());
        }
        self.status
            .add_processed_merge_ranges(ctx, event.record_type, 1)
            .await?;

        // Staging and canonical tables belong to the schema owner.
        let owner_ctx = ctx.acting_as(ctx.schema_tenant_id());
        if let Some(completion) = self.status.complete_merge(&owner_ctx).await? {
            info!("Merge phase completed");
            self.finish_merge_phase(&owner_ctx, completion.target_tenant_id.as_deref())
                .await?;
        }

        Ok(())
    }

    /// Migrate staging into the canonical tables and send the upload ranges
    /// of every uploadable entity type.
    ///
    /// Runs after a successful merge-phase claim. A failed migration marks
    /// every merge type `MERGE_FAILED` and leaves staging in place.
    pub(crate) async fn finish_merge_phase(
        &self,
        ctx: &ReindexContext,
        target_tenant_id: Option<&str>,
    ) -> Result<(), ReindexError> {
        if let Err(e) = self.migration.run(ctx, target_tenant_id).await {
            self.status
                .mark_merge_failed(ctx, &ReindexEntityType::merge_types())
                .await?;
            return Err(e);
        }
        self.status.mark_merge_completed(ctx).await?;

        let mut first_error = None;
        for entity_type in self.upload.upload_types() {
            if let Err(e) = self
                .upload
                .prepare_and_send_index_ranges(ctx, entity_type)
                .await
            {
                warn!(entity_type = %entity_type, error = %e, "Failed to send upload ranges");
                self.status.mark_upload_failed(ctx, entity_type).await?;
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, Harness};
    use search_reindex_shared::StatusKind;
    use serde_json::json;
    use uuid::Uuid;

    fn event(range_id: Uuid, record_type: ReindexEntityType, tenant: &str) -> ReindexRecordsEvent {
        let record = match record_type {
            ReindexEntityType::Instance => json!({"id": "00000000-0000-0000-0000-000000000001"}),
            ReindexEntityType::Holdings => json!({
                "id": "00000000-0000-0000-0000-0000000000a1",
                "instanceId": "00000000-0000-0000-0000-000000000001"
            }),
            _ => json!({
                "id": "00000000-0000-0000-0000-0000000000b1",
                "instanceId": "00000000-0000-0000-0000-000000000001",
                "holdingsRecordId": "00000000-0000-0000-0000-0000000000a1"
            }),
        };
        ReindexRecordsEvent {
            range_id,
            tenant: tenant.to_string(),
            record_type,
            records: vec![record],
        }
    }

    /// Creates one range per merge type and marks the merge started.
    async fn merging(harness: &Harness, ctx: &ReindexContext) -> Vec<(Uuid, ReindexEntityType)> {
        harness.recreate_statuses(ctx).await;
        let ranges = harness.services.merge.create_merge_ranges(ctx).await.unwrap();
        for entity_type in ReindexEntityType::merge_types() {
            harness
                .services
                .status
                .mark_merge_started(ctx, entity_type, 1)
                .await
                .unwrap();
        }
        ranges.iter().map(|r| (r.id, r.entity_type)).collect()
    }

    #[tokio::test]
    async fn test_last_range_triggers_migration_and_upload() {
        let harness = Harness::new();
        harness.instance_uploads.set_count(1);
        let ctx = context("central");
        let ranges = merging(&harness, &ctx).await;

        for (range_id, entity_type) in &ranges {
            harness
                .records
                .process(&ctx, &event(*range_id, *entity_type, "central"))
                .await
                .unwrap();
        }

        assert_eq!(harness.migrations.runs().len(), 1);
        assert_eq!(
            harness.statuses.status(ReindexEntityType::Holdings).status,
            StatusKind::Completed
        );
        assert_eq!(
            harness.statuses.status(ReindexEntityType::Instance).status,
            StatusKind::UploadInProgress
        );
        assert_eq!(
            harness.statuses.status(ReindexEntityType::Subject).status,
            StatusKind::Completed
        );
        assert_eq!(harness.publisher.events().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_not_counted() {
        let harness = Harness::new();
        let ctx = context("central");
        let ranges = merging(&harness, &ctx).await;
        let (range_id, entity_type) = ranges[0];

        for _ in 0..2 {
            harness
                .records
                .process(&ctx, &event(range_id, entity_type, "central"))
                .await
                .unwrap();
        }

        assert_eq!(harness.statuses.status(entity_type).processed_merge_ranges, 1);
        assert!(harness.migrations.runs().is_empty());
    }

    #[tokio::test]
    async fn test_save_failure_fails_range_without_error() {
        let harness = Harness::new();
        let ctx = context("central");
        let ranges = merging(&harness, &ctx).await;
        let (range_id, entity_type) = ranges
            .iter()
            .copied()
            .find(|(_, t)| *t == ReindexEntityType::Holdings)
            .unwrap();
        harness.holdings.fail_saves();

        harness
            .records
            .process(&ctx, &event(range_id, entity_type, "central"))
            .await
            .unwrap();

        let range = harness
            .merge_ranges
            .ranges()
            .into_iter()
            .find(|r| r.id == range_id)
            .unwrap();
        assert!(range.fail_cause.is_some());
        assert_eq!(harness.statuses.status(entity_type).status, StatusKind::MergeFailed);
        assert_eq!(harness.statuses.status(entity_type).processed_merge_ranges, 0);
    }

    #[tokio::test]
    async fn test_migration_failure_keeps_staging_and_fails_merge() {
        let harness = Harness::new();
        let ctx = context("central");
        let ranges = merging(&harness, &ctx).await;
        harness.migrations.fail();

        let mut results = Vec::new();
        for (range_id, entity_type) in &ranges {
            results.push(
                harness
                    .records
                    .process(&ctx, &event(*range_id, *entity_type, "central"))
                    .await,
            );
        }

        assert!(matches!(results.last(), Some(Err(ReindexError::ReindexFailure(_)))));
        for entity_type in ReindexEntityType::merge_types() {
            assert_eq!(harness.statuses.status(entity_type).status, StatusKind::MergeFailed);
        }
        assert!(harness.publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_member_event_completes_in_central_schema() {
        let harness = Harness::new();
        let central = context("central");
        let member = central.acting_as("member");
        harness.recreate_statuses(&central).await;
        let ranges = harness.services.merge.create_merge_ranges(&member).await.unwrap();
        for entity_type in ReindexEntityType::merge_types() {
            harness
                .services
                .status
                .mark_merge_started(&central, entity_type, 1)
                .await
                .unwrap();
        }

        for range in &ranges {
            harness
                .records
                .process(&member, &event(range.id, range.entity_type, "member"))
                .await
                .unwrap();
        }

        assert_eq!(harness.migrations.runs().len(), 1);
        assert_eq!(harness.instances.tenants(), vec!["member".to_string()]);
    }
}
