//! Record repositories, one per entity type.

use async_trait::async_trait;

use crate::errors::RepositoryError;
use crate::types::{FetchedRecord, UploadRangeStrategy};
use search_reindex_shared::{ChildRows, RecordBatch, ReindexContext, ReindexEntityType, UploadBounds};

/// Stores pulled records of one entity type.
///
/// In reindex mode rows land in the staging table, otherwise directly in the
/// canonical table.
#[async_trait]
pub trait MergeRecordRepository: Send + Sync {
    fn entity_type(&self) -> ReindexEntityType;

    /// Save the rows of this repository's entity type from `batch`.
    async fn save_entities(
        &self,
        ctx: &ReindexContext,
        batch: &RecordBatch,
    ) -> Result<u64, RepositoryError>;
}

/// Stores dictionary and relationship rows extracted from instances and items.
#[async_trait]
pub trait ChildRecordRepository: Send + Sync {
    async fn save_children(
        &self,
        ctx: &ReindexContext,
        children: &ChildRows,
    ) -> Result<u64, RepositoryError>;
}

/// Reads one canonical table for upload.
#[async_trait]
pub trait UploadRecordRepository: Send + Sync {
    fn entity_type(&self) -> ReindexEntityType;

    fn strategy(&self) -> UploadRangeStrategy;

    /// Row count of the canonical table.
    async fn count(&self, ctx: &ReindexContext) -> Result<i64, RepositoryError>;

    /// Rows within `bounds`, as search document sources.
    async fn fetch_range(
        &self,
        ctx: &ReindexContext,
        bounds: &UploadBounds,
    ) -> Result<Vec<FetchedRecord>, RepositoryError>;
}
