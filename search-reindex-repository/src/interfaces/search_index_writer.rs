//! Search engine write interface.

use async_trait::async_trait;

use crate::errors::SearchError;
use crate::types::BulkWriteSummary;
use search_reindex_shared::SearchDocument;

/// Writes converted documents to the search engine.
#[async_trait]
pub trait SearchIndexWriter: Send + Sync {
    /// Index `documents` in one bulk request.
    ///
    /// Item-level rejections are reported in the summary; `Err` means the
    /// request as a whole failed.
    async fn bulk_index(&self, documents: &[SearchDocument]) -> Result<BulkWriteSummary, SearchError>;

    /// Drop `index` if present and create it again empty.
    async fn recreate_index(&self, index: &str) -> Result<(), SearchError>;

    async fn health_check(&self) -> Result<bool, SearchError>;
}
