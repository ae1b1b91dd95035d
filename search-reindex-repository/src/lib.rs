//! # Search Reindex Repository
//!
//! Storage seams of the reindex pipeline: traits for range, status and record
//! repositories, their PostgreSQL implementations, the per-entity-type
//! repository registry and the OpenSearch bulk writer.

pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod postgres;
pub mod registry;
pub mod types;

pub use errors::{RepositoryError, SearchError};
pub use interfaces::{
    ChildRecordRepository, MergeRangeRepository, MergeRecordRepository, MigrationStore,
    SearchIndexWriter, StatusRepository, UploadRangeRepository, UploadRecordRepository,
};
pub use opensearch::OpenSearchClient;
pub use registry::RepositoryRegistry;
pub use types::{BulkWriteSummary, FetchedRecord, SqlStatement, UploadRangeStrategy};
