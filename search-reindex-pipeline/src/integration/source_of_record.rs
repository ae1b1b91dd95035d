//! Client of the system of record that owns the raw records.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;
use uuid::Uuid;

use search_reindex_shared::{MergeRange, ReindexContext, ReindexEntityType};

use crate::errors::ReindexError;

/// Header carrying the tenant a request acts for.
pub const TENANT_HEADER: &str = "x-tenant-id";

const PUBLISH_PATH: &str = "inventory-reindex-records/publish";

/// Source of the records pulled during the merge phase.
#[async_trait]
pub trait RecordSourceClient: Send + Sync {
    /// Approximate number of records of `record_type` owned by the acting tenant.
    async fn fetch_record_count(
        &self,
        ctx: &ReindexContext,
        record_type: ReindexEntityType,
    ) -> Result<i64, ReindexError>;

    /// Ask the system of record to push the records of `range` as records events.
    async fn publish_records_range(
        &self,
        ctx: &ReindexContext,
        range: &MergeRange,
    ) -> Result<(), ReindexError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountResponse {
    total_records: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishRequest<'a> {
    id: Uuid,
    record_type: ReindexEntityType,
    record_ids_range: IdsRange<'a>,
}

#[derive(Debug, Serialize)]
struct IdsRange<'a> {
    from: &'a str,
    to: &'a str,
}

/// [`RecordSourceClient`] over the system of record's HTTP API.
pub struct HttpRecordSourceClient {
    client: Client,
    base_url: Url,
}

impl HttpRecordSourceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ReindexError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ReindexError::validation(format!("Invalid source of record URL: {}", e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReindexError::integration(format!("Failed to create HTTP client: {}", e)))?;

        info!(base_url = %base_url, "Created source of record client");
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ReindexError> {
        self.base_url
            .join(path)
            .map_err(|e| ReindexError::integration(format!("Invalid endpoint '{}': {}", path, e)))
    }
}

/// Storage endpoint listing the records of `record_type`.
fn storage_path(record_type: ReindexEntityType) -> Result<&'static str, ReindexError> {
    match record_type {
        ReindexEntityType::Instance => Ok("instance-storage/instances"),
        ReindexEntityType::Holdings => Ok("holdings-storage/holdings"),
        ReindexEntityType::Item => Ok("item-storage/items"),
        other => Err(ReindexError::unsupported(format!(
            "Entity type {} is not pulled from the system of record",
            other
        ))),
    }
}

#[async_trait]
impl RecordSourceClient for HttpRecordSourceClient {
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()))]
    async fn fetch_record_count(
        &self,
        ctx: &ReindexContext,
        record_type: ReindexEntityType,
    ) -> Result<i64, ReindexError> {
        let mut url = self.endpoint(storage_path(record_type)?)?;
        url.query_pairs_mut().append_pair("limit", "0");

        let response = self
            .client
            .get(url)
            .header(TENANT_HEADER, ctx.tenant_id())
            .send()
            .await
            .map_err(|e| ReindexError::integration(format!("Record count request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| ReindexError::integration(format!("Record count request failed: {}", e)))?;

        let body: CountResponse = response
            .json()
            .await
            .map_err(|e| ReindexError::integration(format!("Invalid record count response: {}", e)))?;

        debug!(record_type = %record_type, count = body.total_records, "Fetched record count");
        Ok(body.total_records)
    }

    #[instrument(skip(self, ctx, range), fields(tenant_id = %ctx.tenant_id(), range_id = %range.id))]
    async fn publish_records_range(
        &self,
        ctx: &ReindexContext,
        range: &MergeRange,
    ) -> Result<(), ReindexError> {
        let request = PublishRequest {
            id: range.id,
            record_type: range.entity_type,
            record_ids_range: IdsRange {
                from: &range.lower_bound,
                to: &range.upper_bound,
            },
        };

        self.client
            .post(self.endpoint(PUBLISH_PATH)?)
            .header(TENANT_HEADER, ctx.tenant_id())
            .json(&request)
            .send()
            .await
            .map_err(|e| ReindexError::integration(format!("Publish request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| {
                ReindexError::integration(format!(
                    "Publish of range {} failed: {}",
                    range.id, e
                ))
            })?;

        debug!(entity_type = %range.entity_type, "Published records range");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_reindex_shared::range::empty_range;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client =
            HttpRecordSourceClient::new("http://okapi:9130/api", Duration::from_secs(5)).unwrap();

        assert_eq!(
            client.endpoint(PUBLISH_PATH).unwrap().as_str(),
            "http://okapi:9130/api/inventory-reindex-records/publish"
        );
    }

    #[test]
    fn test_dictionary_types_are_not_pulled() {
        assert!(storage_path(ReindexEntityType::Item).is_ok());
        assert!(matches!(
            storage_path(ReindexEntityType::Subject),
            Err(ReindexError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_publish_request_shape() {
        let range = MergeRange::new(ReindexEntityType::Holdings, "member", empty_range());
        let request = PublishRequest {
            id: range.id,
            record_type: range.entity_type,
            record_ids_range: IdsRange {
                from: &range.lower_bound,
                to: &range.upper_bound,
            },
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["recordType"], "HOLDINGS");
        assert_eq!(json["recordIdsRange"]["from"], "0".repeat(32));
        assert_eq!(json["recordIdsRange"]["to"], "f".repeat(32));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpRecordSourceClient::new("not a url", Duration::from_secs(5)),
            Err(ReindexError::ValidationError(_))
        ));
    }
}
