//! Interfaces for the reindex repositories.
//!
//! The pipeline depends on these traits only, so every service can be tested
//! against in-memory implementations.

mod migration_store;
mod range_repository;
mod record_repository;
mod search_index_writer;
mod status_repository;

pub use migration_store::MigrationStore;
pub use range_repository::{MergeRangeRepository, UploadRangeRepository};
pub use record_repository::{ChildRecordRepository, MergeRecordRepository, UploadRecordRepository};
pub use search_index_writer::SearchIndexWriter;
pub use status_repository::StatusRepository;
