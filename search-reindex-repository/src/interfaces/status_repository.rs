//! Per-entity-type reindex status rows.

use async_trait::async_trait;

use crate::errors::RepositoryError;
use search_reindex_shared::{
    MergeCompletion, ReindexContext, ReindexEntityType, ReindexStatus, StatusUpdate,
};

/// Stores one [`ReindexStatus`] row per entity type.
///
/// Implementations serialize concurrent updates of the same row; the
/// transition rules themselves are [`ReindexStatus::apply`].
#[async_trait]
pub trait StatusRepository: Send + Sync {
    /// Replace every status row with `rows` in one transaction.
    async fn recreate(
        &self,
        ctx: &ReindexContext,
        rows: &[ReindexStatus],
    ) -> Result<(), RepositoryError>;

    /// Apply `update` to the row of `entity_type`; false if the row is
    /// missing or the update was a no-op.
    async fn apply(
        &self,
        ctx: &ReindexContext,
        entity_type: ReindexEntityType,
        update: StatusUpdate,
    ) -> Result<bool, RepositoryError>;

    async fn fetch_all(&self, ctx: &ReindexContext) -> Result<Vec<ReindexStatus>, RepositoryError>;

    /// Claim the end of the merge phase. Exactly one caller per cycle gets `Some`.
    async fn complete_merge(
        &self,
        ctx: &ReindexContext,
    ) -> Result<Option<MergeCompletion>, RepositoryError>;
}
