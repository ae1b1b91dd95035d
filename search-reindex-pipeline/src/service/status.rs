//! Reindex status tracking.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use search_reindex_repository::StatusRepository;
use search_reindex_shared::{
    MergeCompletion, ReindexContext, ReindexEntityType, ReindexStatus, StatusUpdate,
};

use crate::errors::ReindexError;

/// Per-entity-type progress and failure counters.
///
/// Every operation is a single row update; callers never wait on other
/// ranges.
#[derive(Clone)]
pub struct ReindexStatusService {
    repository: Arc<dyn StatusRepository>,
}

impl ReindexStatusService {
    pub fn new(repository: Arc<dyn StatusRepository>) -> Self {
        Self { repository }
    }

    /// Replace the status rows with fresh rows for `entity_types`.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn recreate(
        &self,
        ctx: &ReindexContext,
        entity_types: &[ReindexEntityType],
        target_tenant_id: Option<&str>,
    ) -> Result<(), ReindexError> {
        let rows: Vec<ReindexStatus> = entity_types
            .iter()
            .map(|t| ReindexStatus::initial(*t, target_tenant_id.map(String::from)))
            .collect();

        self.repository.recreate(ctx, &rows).await?;
        info!(count = rows.len(), "Recreated reindex status rows");
        Ok(())
    }

    pub async fn mark_merge_started(
        &self,
        ctx: &ReindexContext,
        entity_type: ReindexEntityType,
        total_ranges: usize,
    ) -> Result<(), ReindexError> {
        let total = to_counter(total_ranges);
        self.update(ctx, entity_type, StatusUpdate::MergeStarted { total })
            .await
    }

    pub async fn mark_upload_started(
        &self,
        ctx: &ReindexContext,
        entity_type: ReindexEntityType,
        total_ranges: usize,
    ) -> Result<(), ReindexError> {
        let total = to_counter(total_ranges);
        self.update(ctx, entity_type, StatusUpdate::UploadStarted { total })
            .await
    }

    pub async fn add_processed_merge_ranges(
        &self,
        ctx: &ReindexContext,
        entity_type: ReindexEntityType,
        n: usize,
    ) -> Result<(), ReindexError> {
        self.update(ctx, entity_type, StatusUpdate::ProcessedMerge(to_counter(n)))
            .await
    }

    pub async fn add_processed_upload_ranges(
        &self,
        ctx: &ReindexContext,
        entity_type: ReindexEntityType,
        n: usize,
    ) -> Result<(), ReindexError> {
        self.update(ctx, entity_type, StatusUpdate::ProcessedUpload(to_counter(n)))
            .await
    }

    /// Move `entity_types` to `MERGE_FAILED`. Already failed rows are left as is.
    pub async fn mark_merge_failed(
        &self,
        ctx: &ReindexContext,
        entity_types: &[ReindexEntityType],
    ) -> Result<(), ReindexError> {
        for entity_type in entity_types {
            self.update(ctx, *entity_type, StatusUpdate::MergeFailed)
                .await?;
        }
        Ok(())
    }

    pub async fn mark_upload_failed(
        &self,
        ctx: &ReindexContext,
        entity_type: ReindexEntityType,
    ) -> Result<(), ReindexError> {
        self.update(ctx, entity_type, StatusUpdate::UploadFailed).await
    }

    /// Move a failed merge back to `MERGE_IN_PROGRESS` for an operator retry.
    pub async fn mark_merge_retried(
        &self,
        ctx: &ReindexContext,
        entity_type: ReindexEntityType,
    ) -> Result<(), ReindexError> {
        self.update(ctx, entity_type, StatusUpdate::MergeRetried).await
    }

    /// Move the merge-only types of a claimed merge phase to `COMPLETED`.
    pub async fn mark_merge_completed(&self, ctx: &ReindexContext) -> Result<(), ReindexError> {
        for entity_type in ReindexEntityType::merge_types() {
            if !entity_type.supports_upload() {
                self.update(ctx, entity_type, StatusUpdate::MergeCompleted)
                    .await?;
            }
        }
        Ok(())
    }

    /// Claim the end of the merge phase; `Some` for exactly one caller.
    pub async fn complete_merge(
        &self,
        ctx: &ReindexContext,
    ) -> Result<Option<MergeCompletion>, ReindexError> {
        Ok(self.repository.complete_merge(ctx).await?)
    }

    pub async fn statuses(&self, ctx: &ReindexContext) -> Result<Vec<ReindexStatus>, ReindexError> {
        Ok(self.repository.fetch_all(ctx).await?)
    }

    async fn update(
        &self,
        ctx: &ReindexContext,
        entity_type: ReindexEntityType,
        update: StatusUpdate,
    ) -> Result<(), ReindexError> {
        let changed = self.repository.apply(ctx, entity_type, update).await?;

        if changed {
            debug!(entity_type = %entity_type, update = ?update, "Updated reindex status");
        } else if matches!(update, StatusUpdate::MergeStarted { .. } | StatusUpdate::UploadStarted { .. }) {
            warn!(entity_type = %entity_type, update = ?update, "Status update ignored");
        }
        Ok(())
    }
}

fn to_counter(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
