//! Pipeline configuration.

use std::time::Duration;

use search_reindex_repository::postgres::MergeStrategy;

/// Default number of source records per merge range.
pub const DEFAULT_MERGE_RANGE_SIZE: i64 = 500;

/// Default number of canonical rows per upload range.
pub const DEFAULT_UPLOAD_RANGE_SIZE: i64 = 1000;

/// Default hex prefix length of dictionary upload ranges.
pub const DEFAULT_UPLOAD_RANGE_LEVEL: usize = 3;

/// Default search index prefix.
pub const DEFAULT_INDEX_PREFIX: &str = "reindex";

/// Default suffix of tenant schema names.
pub const DEFAULT_SCHEMA_SUFFIX: &str = "search";

/// Knobs of the reindex services and consumers.
#[derive(Debug, Clone)]
pub struct ReindexConfig {
    /// Source records per merge range.
    pub merge_range_size: i64,
    /// Canonical rows per identifier-space or paging upload range.
    pub upload_range_size: i64,
    /// Hex prefix length of dictionary upload ranges.
    pub upload_range_level: usize,
    pub merge_strategy: MergeStrategy,
    /// Drop and recreate search indices at the start of a full reindex.
    pub recreate_indices: bool,
    pub index_prefix: String,
    pub schema_suffix: String,
    /// Delivery attempts per message, including the first one.
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// Messages processed concurrently per listener.
    pub listener_concurrency: usize,
}

impl Default for ReindexConfig {
    fn default() -> Self {
        Self {
            merge_range_size: DEFAULT_MERGE_RANGE_SIZE,
            upload_range_size: DEFAULT_UPLOAD_RANGE_SIZE,
            upload_range_level: DEFAULT_UPLOAD_RANGE_LEVEL,
            merge_strategy: MergeStrategy::default(),
            recreate_indices: true,
            index_prefix: DEFAULT_INDEX_PREFIX.to_string(),
            schema_suffix: DEFAULT_SCHEMA_SUFFIX.to_string(),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            listener_concurrency: 2,
        }
    }
}
