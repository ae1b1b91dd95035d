//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `SearchIndexWriter`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    cluster::ClusterHealthParts,
    http::request::JsonBody,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesDeleteParts},
    BulkParts, OpenSearch,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::errors::SearchError;
use crate::interfaces::SearchIndexWriter;
use crate::opensearch::index_settings::index_settings;
use crate::types::BulkWriteSummary;
use search_reindex_shared::SearchDocument;

/// OpenSearch client implementation.
///
/// # Example
///
/// ```no_run
/// # use search_reindex_repository::{OpenSearchClient, SearchError, SearchIndexWriter};
/// # use search_reindex_shared::SearchDocument;
/// # async fn index(documents: Vec<SearchDocument>) -> Result<(), SearchError> {
/// let client = OpenSearchClient::new("http://localhost:9200").await?;
/// let summary = client.bulk_index(&documents).await?;
/// if !summary.is_success() {
///     eprintln!("{}", summary.error_message());
/// }
/// # Ok(())
/// # }
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchClient)` - A new client instance
    /// * `Err(SearchError)` - If connection setup fails
    pub async fn new(url: &str) -> Result<Self, SearchError> {
        let parsed_url = Url::parse(url).map_err(|e| SearchError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(url = %url, "Created OpenSearch client");

        Ok(Self { client })
    }

    /// Build the NDJSON body of a bulk request: an action line followed by
    /// the document source for every document.
    fn bulk_body(documents: &[SearchDocument]) -> Vec<JsonBody<Value>> {
        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(documents.len() * 2);

        for doc in documents {
            body.push(json!({"index": {"_index": doc.index, "_id": doc.id}}).into());
            body.push(doc.body.clone().into());
        }

        body
    }

    /// Collect the error reasons of rejected items from a bulk response.
    fn item_errors(response: &Value) -> Vec<String> {
        response
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("index"))
                    .filter_map(|action| {
                        let error = action.get("error")?;
                        let id = action.get("_id").and_then(Value::as_str).unwrap_or("?");
                        let reason = error
                            .get("reason")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| error.to_string());
                        Some(format!("{}: {}", id, reason))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl SearchIndexWriter for OpenSearchClient {
    /// Index documents in a single bulk request.
    ///
    /// Documents may target different indices; each action line names its own.
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn bulk_index(&self, documents: &[SearchDocument]) -> Result<BulkWriteSummary, SearchError> {
        if documents.is_empty() {
            return Ok(BulkWriteSummary::succeeded(0));
        }

        let response = self
            .client
            .bulk(BulkParts::None)
            .body(Self::bulk_body(documents))
            .send()
            .await
            .map_err(|e| SearchError::bulk_index(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(SearchError::bulk_index(format!(
                "Bulk request failed with status {}: {}",
                status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;

        let has_errors = body.get("errors").and_then(Value::as_bool).unwrap_or(false);
        if !has_errors {
            debug!("Bulk request succeeded");
            return Ok(BulkWriteSummary::succeeded(documents.len()));
        }

        let errors = Self::item_errors(&body);
        warn!(failed = errors.len(), "Bulk request had item failures");

        Ok(BulkWriteSummary {
            total: documents.len(),
            failed: errors.len().max(1),
            errors,
        })
    }

    async fn recreate_index(&self, index: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchError::index_management(e.to_string()))?;

        // 404 is acceptable - the index may not exist yet
        let status = response.status_code();
        if !status.is_success() && status.as_u16() != 404 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SearchError::index_management(format!(
                "Failed to delete index {} with status {}: {}",
                index, status, error_body
            )));
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(index_settings())
            .send()
            .await
            .map_err(|e| SearchError::index_management(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SearchError::index_management(format!(
                "Failed to create index {} with status {}: {}",
                index, status, error_body
            )));
        }

        info!(index = %index, "Recreated index");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let health: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;
        let status = health
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        debug!(status = %status, "OpenSearch cluster status");
        Ok(status == "green" || status == "yellow")
    }
}
