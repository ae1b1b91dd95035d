//! Explicit entity type to repository dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::RepositoryError;
use crate::interfaces::{MergeRecordRepository, UploadRecordRepository};
use search_reindex_shared::ReindexEntityType;

/// Record repositories keyed by the entity type they serve.
///
/// Built once at startup; a lookup for an unregistered type is a
/// configuration error.
#[derive(Clone, Default)]
pub struct RepositoryRegistry {
    merge: HashMap<ReindexEntityType, Arc<dyn MergeRecordRepository>>,
    upload: HashMap<ReindexEntityType, Arc<dyn UploadRecordRepository>>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a merge repository under its own entity type.
    pub fn with_merge(mut self, repository: Arc<dyn MergeRecordRepository>) -> Self {
        self.merge.insert(repository.entity_type(), repository);
        self
    }

    /// Register an upload repository under its own entity type.
    pub fn with_upload(mut self, repository: Arc<dyn UploadRecordRepository>) -> Self {
        self.upload.insert(repository.entity_type(), repository);
        self
    }

    pub fn merge(
        &self,
        entity_type: ReindexEntityType,
    ) -> Result<Arc<dyn MergeRecordRepository>, RepositoryError> {
        self.merge
            .get(&entity_type)
            .cloned()
            .ok_or(RepositoryError::Unsupported(entity_type))
    }

    pub fn upload(
        &self,
        entity_type: ReindexEntityType,
    ) -> Result<Arc<dyn UploadRecordRepository>, RepositoryError> {
        self.upload
            .get(&entity_type)
            .cloned()
            .ok_or(RepositoryError::Unsupported(entity_type))
    }

    /// Entity types with an upload repository, in declaration order.
    pub fn upload_types(&self) -> Vec<ReindexEntityType> {
        ReindexEntityType::ALL
            .iter()
            .copied()
            .filter(|entity_type| self.upload.contains_key(entity_type))
            .collect()
    }
}
