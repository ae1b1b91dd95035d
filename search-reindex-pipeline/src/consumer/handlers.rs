//! Handlers of the range-index and records topics.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{error, warn};

use search_reindex_shared::{ReindexRangeIndexEvent, ReindexRecordsEvent};

use crate::consumer::MessageHandler;
use crate::context::TenantContextResolver;
use crate::errors::ReindexError;
use crate::service::{RecordsEventService, ReindexOrchestrationService, ReindexStatusService};

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ReindexError> {
    serde_json::from_slice(payload)
        .map_err(|e| ReindexError::parse(format!("Failed to decode message: {}", e)))
}

/// Indexes upload ranges announced on the range-index topic.
pub struct RangeIndexHandler {
    resolver: TenantContextResolver,
    orchestration: Arc<ReindexOrchestrationService>,
    status: ReindexStatusService,
}

impl RangeIndexHandler {
    pub fn new(
        resolver: TenantContextResolver,
        orchestration: Arc<ReindexOrchestrationService>,
        status: ReindexStatusService,
    ) -> Self {
        Self {
            resolver,
            orchestration,
            status,
        }
    }
}

#[async_trait]
impl MessageHandler for RangeIndexHandler {
    fn name(&self) -> &'static str {
        "range-index"
    }

    async fn handle(&self, payload: &[u8]) -> Result<(), ReindexError> {
        let event: ReindexRangeIndexEvent = decode(payload)?;
        let ctx = self.resolver.resolve(&event.tenant).await?;
        self.orchestration.process(&ctx, &event).await?;
        Ok(())
    }

    async fn on_retries_exhausted(&self, payload: &[u8], error: &ReindexError) {
        let Ok(event) = decode::<ReindexRangeIndexEvent>(payload) else {
            warn!(error = %error, "Dropping undecodable range-index message");
            return;
        };

        let result = match self.resolver.resolve(&event.tenant).await {
            Ok(ctx) => self.status.mark_upload_failed(&ctx, event.entity_type).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(range_id = %event.id, error = %e, "Failed to mark upload failed");
        }
    }
}

/// Stages the records pushed by the system of record.
pub struct RecordsHandler {
    resolver: TenantContextResolver,
    records: Arc<RecordsEventService>,
}

impl RecordsHandler {
    pub fn new(resolver: TenantContextResolver, records: Arc<RecordsEventService>) -> Self {
        Self { resolver, records }
    }
}

#[async_trait]
impl MessageHandler for RecordsHandler {
    fn name(&self) -> &'static str {
        "reindex-records"
    }

    async fn handle(&self, payload: &[u8]) -> Result<(), ReindexError> {
        let event: ReindexRecordsEvent = decode(payload)?;
        let ctx = self.resolver.resolve(&event.tenant).await?;
        self.records.process(&ctx, &event).await
    }
}
