//! Reindex services.

mod controller;
mod converter;
mod merge_range;
mod migration;
mod orchestration;
mod records;
mod status;
mod upload_range;

use std::sync::Arc;

use search_reindex_repository::{
    ChildRecordRepository, MergeRangeRepository, MigrationStore, RepositoryRegistry,
    StatusRepository, UploadRangeRepository,
};

use crate::config::ReindexConfig;
use crate::integration::RecordSourceClient;
use crate::producer::RangeEventPublisher;

pub use controller::{PublishHandle, ReindexController};
pub use converter::{index_name, DocumentConverter, IndexDocumentConverter};
pub use merge_range::MergeRangeService;
pub use migration::{MigrationResult, StagingMigrationService};
pub use orchestration::{RangeIndexState, ReindexOrchestrationService};
pub use records::RecordsEventService;
pub use status::ReindexStatusService;
pub use upload_range::{upload_bounds, UploadRangeService};

/// Repositories the services are built on.
pub struct ReindexStores {
    pub merge_ranges: Arc<dyn MergeRangeRepository>,
    pub upload_ranges: Arc<dyn UploadRangeRepository>,
    pub statuses: Arc<dyn StatusRepository>,
    pub children: Arc<dyn ChildRecordRepository>,
    pub migrations: Arc<dyn MigrationStore>,
    pub registry: RepositoryRegistry,
}

/// The services shared by the controller and the consumers.
#[derive(Clone)]
pub struct ReindexServices {
    pub merge: Arc<MergeRangeService>,
    pub upload: Arc<UploadRangeService>,
    pub status: ReindexStatusService,
    pub migration: Arc<StagingMigrationService>,
}

impl ReindexServices {
    pub fn new(
        stores: ReindexStores,
        source: Arc<dyn RecordSourceClient>,
        publisher: Arc<dyn RangeEventPublisher>,
        config: &ReindexConfig,
    ) -> Self {
        let status = ReindexStatusService::new(stores.statuses);

        let merge = MergeRangeService::new(
            stores.merge_ranges,
            stores.upload_ranges.clone(),
            stores.children,
            stores.registry.clone(),
            source,
            config.merge_range_size,
        );
        let upload = UploadRangeService::new(
            stores.upload_ranges,
            stores.registry,
            status.clone(),
            publisher,
            config.upload_range_size,
            config.upload_range_level,
        );
        let migration = StagingMigrationService::new(stores.migrations, config.merge_strategy);

        Self {
            merge: Arc::new(merge),
            upload: Arc::new(upload),
            status,
            migration: Arc::new(migration),
        }
    }

    /// Handler of records events built on these services.
    pub fn records_service(&self) -> RecordsEventService {
        RecordsEventService::new(
            self.merge.clone(),
            self.upload.clone(),
            self.status.clone(),
            self.migration.clone(),
        )
    }
}
