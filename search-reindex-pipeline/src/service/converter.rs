//! Conversion of resource events into search documents.

use serde_json::Value;

use search_reindex_shared::{ReindexContext, ResourceEvent, SearchDocument};

use crate::errors::ReindexError;

/// Turns canonical rows into documents for the search engine.
pub trait DocumentConverter: Send + Sync {
    fn convert(
        &self,
        ctx: &ReindexContext,
        events: &[ResourceEvent],
    ) -> Result<Vec<SearchDocument>, ReindexError>;
}

/// Index holding `resource_name` documents of `tenant_id`.
pub fn index_name(prefix: &str, resource_name: &str, tenant_id: &str) -> String {
    format!("{}_{}_{}", prefix, resource_name, tenant_id).to_ascii_lowercase()
}

/// Writes each row as-is to the index of its resource, adding the owning
/// tenant when the row lacks one.
#[derive(Debug, Clone)]
pub struct IndexDocumentConverter {
    index_prefix: String,
}

impl IndexDocumentConverter {
    pub fn new(index_prefix: impl Into<String>) -> Self {
        Self {
            index_prefix: index_prefix.into(),
        }
    }
}

impl DocumentConverter for IndexDocumentConverter {
    fn convert(
        &self,
        ctx: &ReindexContext,
        events: &[ResourceEvent],
    ) -> Result<Vec<SearchDocument>, ReindexError> {
        events
            .iter()
            .map(|event| {
                let Value::Object(mut body) = event.new.clone() else {
                    return Err(ReindexError::parse(format!(
                        "Document {} of {} is not a JSON object",
                        event.id, event.resource_name
                    )));
                };
                body.entry("tenantId")
                    .or_insert_with(|| Value::String(event.tenant.clone()));

                Ok(SearchDocument {
                    id: event.id.clone(),
                    index: index_name(
                        &self.index_prefix,
                        &event.resource_name,
                        ctx.schema_tenant_id(),
                    ),
                    body: Value::Object(body),
                })
            })
            .collect()
    }
}
