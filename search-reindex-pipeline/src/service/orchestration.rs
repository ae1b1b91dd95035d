//! Indexing of one upload range.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use search_reindex_repository::SearchIndexWriter;
use search_reindex_shared::{ReindexContext, ReindexRangeIndexEvent};

use crate::errors::ReindexError;
use crate::service::converter::DocumentConverter;
use crate::service::status::ReindexStatusService;
use crate::service::upload_range::UploadRangeService;

/// Progress of one range-index event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeIndexState {
    Fetching,
    Converting,
    Writing,
    Completed,
    Failed,
}

impl fmt::Display for RangeIndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetching => "fetching",
            Self::Converting => "converting",
            Self::Writing => "writing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Fetches, converts and bulk writes one upload range.
///
/// No retries happen here; a failed range is redelivered by the consumer.
pub struct ReindexOrchestrationService {
    upload: Arc<UploadRangeService>,
    converter: Arc<dyn DocumentConverter>,
    writer: Arc<dyn SearchIndexWriter>,
    status: ReindexStatusService,
}

impl ReindexOrchestrationService {
    pub fn new(
        upload: Arc<UploadRangeService>,
        converter: Arc<dyn DocumentConverter>,
        writer: Arc<dyn SearchIndexWriter>,
        status: ReindexStatusService,
    ) -> Self {
        Self {
            upload,
            converter,
            writer,
            status,
        }
    }

    /// Index the range of `event`.
    ///
    /// A rejected bulk write marks the entity type `UPLOAD_FAILED` and
    /// returns a [`ReindexError::ReindexFailure`] carrying the engine's
    /// message.
    ///
    /// The processed-upload counter counts ranges, not documents: it moves by
    /// one the first time a range is finished, so it never exceeds the total
    /// range count the status row completes on.
    #[instrument(skip(self, ctx, event), fields(tenant_id = %ctx.tenant_id(), range_id = %event.id, entity_type = %event.entity_type))]
    pub async fn process(
        &self,
        ctx: &ReindexContext,
        event: &ReindexRangeIndexEvent,
    ) -> Result<RangeIndexState, ReindexError> {
        let mut state = RangeIndexState::Fetching;

        match self.run(ctx, event, &mut state).await {
            Ok(()) => {
                transition(&mut state, RangeIndexState::Completed);
                Ok(state)
            }
            Err(e) => {
                error!(state = %state, error = %e, "Range indexing failed");
                transition(&mut state, RangeIndexState::Failed);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        ctx: &ReindexContext,
        event: &ReindexRangeIndexEvent,
        state: &mut RangeIndexState,
    ) -> Result<(), ReindexError> {
        debug!(state = %state, "Fetching range");
        let resources = self.upload.fetch_record_range(ctx, event).await?;

        transition(state, RangeIndexState::Converting);
        let documents = self.converter.convert(ctx, &resources)?;

        transition(state, RangeIndexState::Writing);
        let failure = match self.writer.bulk_index(&documents).await {
            Ok(summary) if summary.is_success() => None,
            Ok(summary) => Some(summary.error_message()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(message) = failure {
            self.status
                .mark_upload_failed(ctx, event.entity_type)
                .await?;
            return Err(ReindexError::reindex(message));
        }

        // One per range; a redelivered range is not counted twice.
        if self.upload.update_finish_date(ctx, event).await? {
            self.status
                .add_processed_upload_ranges(ctx, event.entity_type, 1)
                .await?;
        } else {
            debug!("Range was already finished");
        }

        info!(documents = documents.len(), "Indexed range");
        Ok(())
    }
}

fn transition(state: &mut RangeIndexState, next: RangeIndexState) {
    debug!(from = %state, to = %next, "Range state changed");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, Harness};
    use search_reindex_repository::FetchedRecord;
    use search_reindex_shared::{ReindexEntityType, StatusKind, UploadBounds, UploadRange};
    use serde_json::json;

    async fn prepared(harness: &Harness, ctx: &ReindexContext) -> ReindexRangeIndexEvent {
        harness.instance_uploads.set_count(2);
        harness.instance_uploads.set_records(vec![
            FetchedRecord {
                id: "00000000-0000-0000-0000-000000000001".into(),
                tenant_id: "central".into(),
                json: json!({"id": "00000000-0000-0000-0000-000000000001"}),
            },
            FetchedRecord {
                id: "00000000-0000-0000-0000-000000000002".into(),
                tenant_id: "member".into(),
                json: json!({"id": "00000000-0000-0000-0000-000000000002"}),
            },
        ]);
        harness.recreate_statuses(ctx).await;
        harness
            .services
            .upload
            .prepare_and_send_index_ranges(ctx, ReindexEntityType::Instance)
            .await
            .unwrap();
        harness.publisher.events()[0].clone()
    }

    #[tokio::test]
    async fn test_successful_range_completes_upload() {
        let harness = Harness::new();
        let ctx = context("central");
        let event = prepared(&harness, &ctx).await;

        let state = harness.orchestration.process(&ctx, &event).await.unwrap();

        assert_eq!(state, RangeIndexState::Completed);
        assert_eq!(harness.writer.documents().len(), 2);
        let status = harness.statuses.status(ReindexEntityType::Instance);
        assert_eq!(status.processed_upload_ranges, 1);
        assert_eq!(status.status, StatusKind::Completed);
    }

    #[tokio::test]
    async fn test_redelivered_range_counts_once() {
        let harness = Harness::new();
        let ctx = context("central");
        harness.instance_uploads.set_count(1500);
        harness.recreate_statuses(&ctx).await;
        harness
            .services
            .upload
            .prepare_and_send_index_ranges(&ctx, ReindexEntityType::Instance)
            .await
            .unwrap();
        let event = harness.publisher.events()[0].clone();

        harness.orchestration.process(&ctx, &event).await.unwrap();
        harness.orchestration.process(&ctx, &event).await.unwrap();

        let status = harness.statuses.status(ReindexEntityType::Instance);
        assert_eq!(status.total_upload_ranges, 2);
        assert_eq!(status.processed_upload_ranges, 1);
        assert_eq!(status.status, StatusKind::UploadInProgress);
    }

    #[tokio::test]
    async fn test_bulk_error_marks_upload_failed() {
        let harness = Harness::new();
        let ctx = context("central");
        let event = prepared(&harness, &ctx).await;
        harness.writer.reject_items("mapper_parsing_exception");

        let result = harness.orchestration.process(&ctx, &event).await;

        assert!(matches!(result, Err(ReindexError::ReindexFailure(msg)) if msg.contains("mapper_parsing_exception")));
        let status = harness.statuses.status(ReindexEntityType::Instance);
        assert_eq!(status.status, StatusKind::UploadFailed);
        assert_eq!(status.processed_upload_ranges, 0);
        assert!(harness.upload_ranges.ranges(ReindexEntityType::Instance)[0]
            .finished_at
            .is_none());
    }

    #[tokio::test]
    async fn test_unregistered_type_fails_without_status_change() {
        let harness = Harness::new();
        let ctx = context("central");
        harness.recreate_statuses(&ctx).await;
        let event = ReindexRangeIndexEvent::for_range(
            &UploadRange::new(ReindexEntityType::Item, UploadBounds::Page { offset: 0, limit: 10 }),
            "central",
        );

        let result = harness.orchestration.process(&ctx, &event).await;

        assert!(matches!(result, Err(ReindexError::UnsupportedOperation(_))));
        assert_eq!(
            harness.statuses.status(ReindexEntityType::Item).status,
            StatusKind::MergeInProgress
        );
    }
}
