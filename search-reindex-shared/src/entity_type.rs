//! Entity types taking part in a reindex cycle.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RangeError;

/// Record and dictionary types handled by the reindex pipeline.
///
/// Merge-capable types are pulled from the system of record into staging
/// tables. Upload-capable types are read back from the canonical tables and
/// written to the search engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReindexEntityType {
    Instance,
    Holdings,
    Item,
    Subject,
    Contributor,
    Classification,
    CallNumber,
}

impl ReindexEntityType {
    /// Every entity type, in record-type order.
    pub const ALL: [ReindexEntityType; 7] = [
        Self::Instance,
        Self::Holdings,
        Self::Item,
        Self::Subject,
        Self::Contributor,
        Self::Classification,
        Self::CallNumber,
    ];

    /// Returns true if records of this type are pulled during the merge phase.
    pub fn supports_merge(&self) -> bool {
        matches!(self, Self::Instance | Self::Holdings | Self::Item)
    }

    /// Returns true if this type is written to its own search index.
    pub fn supports_upload(&self) -> bool {
        matches!(
            self,
            Self::Instance
                | Self::Subject
                | Self::Contributor
                | Self::Classification
                | Self::CallNumber
        )
    }

    /// Merge-capable types in record-type order.
    pub fn merge_types() -> Vec<ReindexEntityType> {
        Self::ALL.into_iter().filter(|t| t.supports_merge()).collect()
    }

    /// Upload-capable types in record-type order.
    pub fn upload_types() -> Vec<ReindexEntityType> {
        Self::ALL.into_iter().filter(|t| t.supports_upload()).collect()
    }

    /// The stored/wire name, e.g. `CALL_NUMBER`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instance => "INSTANCE",
            Self::Holdings => "HOLDINGS",
            Self::Item => "ITEM",
            Self::Subject => "SUBJECT",
            Self::Contributor => "CONTRIBUTOR",
            Self::Classification => "CLASSIFICATION",
            Self::CallNumber => "CALL_NUMBER",
        }
    }

    /// The search resource name used for index naming, e.g. `call_number`.
    pub fn resource_name(&self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::Holdings => "holdings",
            Self::Item => "item",
            Self::Subject => "instance_subject",
            Self::Contributor => "instance_contributor",
            Self::Classification => "instance_classification",
            Self::CallNumber => "instance_call_number",
        }
    }
}

impl fmt::Display for ReindexEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReindexEntityType {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RangeError::invalid_value(format!("Unknown entity type: {}", s)))
    }
}
