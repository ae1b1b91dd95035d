//! Message-bus events and search documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::entity_type::ReindexEntityType;
use crate::model::{UploadBounds, UploadRange};

/// A batch of raw records pushed by the system of record for one merge range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexRecordsEvent {
    pub range_id: Uuid,
    pub tenant: String,
    pub record_type: ReindexEntityType,
    #[serde(default)]
    pub records: Vec<Value>,
}

/// A request to index one upload range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexRangeIndexEvent {
    pub id: Uuid,
    pub entity_type: ReindexEntityType,
    pub tenant: String,
    #[serde(flatten)]
    pub bounds: UploadBounds,
}

impl ReindexRangeIndexEvent {
    /// Build the event announcing `range` for `tenant`.
    pub fn for_range(range: &UploadRange, tenant: impl Into<String>) -> Self {
        Self {
            id: range.id,
            entity_type: range.entity_type,
            tenant: tenant.into(),
            bounds: range.bounds.clone(),
        }
    }
}

/// Kind of change carried by a [`ResourceEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceEventType {
    Create,
    Update,
    Delete,
    Reindex,
}

/// A generic "resource changed" record read back from a canonical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEvent {
    pub id: String,
    pub tenant: String,
    pub resource_name: String,
    #[serde(rename = "type")]
    pub event_type: ResourceEventType,
    pub new: Value,
}

impl ResourceEvent {
    /// A reindex event for `new`, owned by `tenant`.
    pub fn reindex(
        id: impl Into<String>,
        tenant: impl Into<String>,
        entity_type: ReindexEntityType,
        new: Value,
    ) -> Self {
        Self {
            id: id.into(),
            tenant: tenant.into(),
            resource_name: entity_type.resource_name().to_string(),
            event_type: ResourceEventType::Reindex,
            new,
        }
    }
}

/// A converted document ready for a bulk write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    pub index: String,
    pub body: Value,
}
