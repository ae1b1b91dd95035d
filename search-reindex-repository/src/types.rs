//! Value types passed across the repository seams.

use serde_json::Value;

/// How upload ranges are laid over a canonical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadRangeStrategy {
    /// Equal-width ranges over the 128-bit identifier space, one per
    /// `range_size` rows.
    IdentifierSpace,
    /// Fixed-length hex prefixes, for tables keyed by hex digests.
    HexSpace,
    /// Offset/limit pages over the table ordered by id.
    Paging,
}

/// One canonical row read for upload, with the tenant owning it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRecord {
    pub id: String,
    pub tenant_id: String,
    pub json: Value,
}

/// A statement run by a [`MigrationStore`](crate::MigrationStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    /// Name reported with the affected row count, e.g. `instance`.
    pub label: String,
    pub sql: String,
    /// Bound as `$1` when present.
    pub tenant_id: Option<String>,
}

impl SqlStatement {
    pub fn new(label: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sql: sql.into(),
            tenant_id: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Outcome of one bulk write to the search engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteSummary {
    /// Number of documents submitted.
    pub total: usize,
    /// Number of documents the engine rejected.
    pub failed: usize,
    /// Error reasons reported by the engine, one per failed item.
    pub errors: Vec<String>,
}

impl BulkWriteSummary {
    pub fn succeeded(total: usize) -> Self {
        Self {
            total,
            failed: 0,
            errors: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Joined error reasons, suitable for a failure message.
    pub fn error_message(&self) -> String {
        if self.errors.is_empty() {
            format!("{} of {} documents failed", self.failed, self.total)
        } else {
            self.errors.join("; ")
        }
    }
}
