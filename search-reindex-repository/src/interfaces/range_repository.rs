//! Merge and upload range bookkeeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::RepositoryError;
use search_reindex_shared::{MergeRange, ReindexContext, ReindexEntityType, UploadRange};

/// Persists the merge ranges of the current cycle.
#[async_trait]
pub trait MergeRangeRepository: Send + Sync {
    async fn save_ranges(
        &self,
        ctx: &ReindexContext,
        ranges: &[MergeRange],
    ) -> Result<(), RepositoryError>;

    /// Ranges of `entity_type` for every tenant sharing the schema, ordered
    /// by tenant and lower bound.
    async fn fetch_ranges(
        &self,
        ctx: &ReindexContext,
        entity_type: ReindexEntityType,
    ) -> Result<Vec<MergeRange>, RepositoryError>;

    /// Ranges with a recorded fail cause.
    async fn fetch_failed(&self, ctx: &ReindexContext) -> Result<Vec<MergeRange>, RepositoryError>;

    /// Finish `range_id`, recording `fail_cause` when it failed.
    ///
    /// Returns false if the range was already finished; a range is finished
    /// at most once.
    async fn finish_range(
        &self,
        ctx: &ReindexContext,
        range_id: Uuid,
        finished_at: DateTime<Utc>,
        fail_cause: Option<String>,
    ) -> Result<bool, RepositoryError>;

    /// Clear the finish time and fail cause of `range_id` so it can be pulled again.
    async fn reset_range(&self, ctx: &ReindexContext, range_id: Uuid) -> Result<(), RepositoryError>;

    async fn truncate(&self, ctx: &ReindexContext) -> Result<(), RepositoryError>;

    /// Delete the ranges owned by one tenant, returning how many were removed.
    async fn delete_for_tenant(
        &self,
        ctx: &ReindexContext,
        tenant_id: &str,
    ) -> Result<u64, RepositoryError>;
}

/// Persists the upload ranges of the current cycle.
#[async_trait]
pub trait UploadRangeRepository: Send + Sync {
    /// Replace the ranges of `entity_type` with `ranges`.
    async fn replace_ranges(
        &self,
        ctx: &ReindexContext,
        entity_type: ReindexEntityType,
        ranges: &[UploadRange],
    ) -> Result<(), RepositoryError>;

    /// Stamp the finish time of `range_id`, returning false if it was already set.
    async fn set_finished(
        &self,
        ctx: &ReindexContext,
        range_id: Uuid,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn truncate(&self, ctx: &ReindexContext) -> Result<(), RepositoryError>;
}
