//! # Search Reindex Shared
//!
//! Types shared by every crate of the reindex pipeline: entity types, the
//! range partitioner, range and status bookkeeping rows, message-bus events,
//! the tenant execution context and the staging row model.

pub mod context;
pub mod entity_type;
pub mod error;
pub mod events;
pub mod model;
pub mod range;
pub mod records;

pub use context::{ReindexContext, SchemaName};
pub use entity_type::ReindexEntityType;
pub use error::RangeError;
pub use events::{
    ReindexRangeIndexEvent, ReindexRecordsEvent, ResourceEvent, ResourceEventType, SearchDocument,
};
pub use model::{
    MergeCompletion, MergeRange, ReindexStatus, StatusKind, StatusUpdate, UploadBounds,
    UploadRange,
};
pub use range::RangeBound;
pub use records::{ChildRows, RecordBatch};
