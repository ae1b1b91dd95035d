//! Top-level control of reindex cycles.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use search_reindex_repository::SearchIndexWriter;
use search_reindex_shared::{
    MergeRange, ReindexContext, ReindexEntityType, ReindexStatus, StatusKind,
};

use crate::config::ReindexConfig;
use crate::context::TenantContextResolver;
use crate::errors::ReindexError;
use crate::integration::{ConsortiumTenantProvider, RecordSourceClient};
use crate::service::converter::index_name;
use crate::service::ReindexServices;

/// Handle of the background task publishing a cycle's merge ranges.
pub type PublishHandle = JoinHandle<Result<usize, ReindexError>>;

/// Starts full reindex cycles, member re-syncs and operator retries.
#[derive(Clone)]
pub struct ReindexController {
    services: ReindexServices,
    resolver: TenantContextResolver,
    consortium: Arc<dyn ConsortiumTenantProvider>,
    source: Arc<dyn RecordSourceClient>,
    writer: Arc<dyn SearchIndexWriter>,
    config: Arc<ReindexConfig>,
}

impl ReindexController {
    pub fn new(
        services: ReindexServices,
        resolver: TenantContextResolver,
        consortium: Arc<dyn ConsortiumTenantProvider>,
        source: Arc<dyn RecordSourceClient>,
        writer: Arc<dyn SearchIndexWriter>,
        config: ReindexConfig,
    ) -> Self {
        Self {
            services,
            resolver,
            consortium,
            source,
            writer,
            config: Arc::new(config),
        }
    }

    /// Start a full reindex of `tenant_id` and its consortium members.
    ///
    /// Returns once the tenant's merge ranges exist and publishing has been
    /// dispatched. Member ranges are created in background tasks; the
    /// returned handle publishes every range once those tasks finish.
    #[instrument(skip(self))]
    pub async fn init_full_reindex(&self, tenant_id: &str) -> Result<PublishHandle, ReindexError> {
        if let Some(central) = self.consortium.central_tenant(tenant_id).await? {
            return Err(ReindexError::validation(format!(
                "Tenant {} is a member of consortium {}; start the full reindex from the central tenant",
                tenant_id, central
            )));
        }

        let ctx = self.resolver.own_context(tenant_id)?;
        self.cleanup(&ctx).await?;
        self.services
            .status
            .recreate(&ctx, &ReindexEntityType::ALL, None)
            .await?;

        if let Err(e) = self.services.merge.create_merge_ranges(&ctx).await {
            self.fail_merge(&ctx).await;
            return Err(e);
        }

        let members = self.consortium.member_tenants(tenant_id).await?;
        let member_tasks: Vec<(String, JoinHandle<Result<Vec<MergeRange>, ReindexError>>)> = members
            .into_iter()
            .map(|member| {
                let merge = self.services.merge.clone();
                let member_ctx = ctx.acting_as(member.as_str());
                let task = tokio::spawn(async move { merge.create_merge_ranges(&member_ctx).await });
                (member, task)
            })
            .collect();

        info!(members = member_tasks.len(), "Full reindex started");

        let controller = self.clone();
        Ok(tokio::spawn(async move {
            controller.await_members(&ctx, member_tasks).await?;
            controller.publish_merge_ranges(&ctx, None).await
        }))
    }

    /// Re-synchronize one consortium member without touching other tenants.
    ///
    /// The member's canonical rows are replaced when the merge phase ends.
    #[instrument(skip(self))]
    pub async fn init_tenant_resync(
        &self,
        central_tenant_id: &str,
        member_tenant_id: &str,
    ) -> Result<PublishHandle, ReindexError> {
        let central = self.consortium.central_tenant(member_tenant_id).await?;
        if central.as_deref() != Some(central_tenant_id) {
            return Err(ReindexError::validation(format!(
                "Tenant {} is not a member of consortium {}",
                member_tenant_id, central_tenant_id
            )));
        }

        let ctx = self.resolver.own_context(central_tenant_id)?;
        self.services
            .merge
            .delete_ranges_for_tenant(&ctx, member_tenant_id)
            .await?;
        self.services
            .status
            .recreate(&ctx, &ReindexEntityType::ALL, Some(member_tenant_id))
            .await?;

        let member_ctx = ctx.acting_as(member_tenant_id);
        if let Err(e) = self.services.merge.create_merge_ranges(&member_ctx).await {
            self.fail_merge(&ctx).await;
            return Err(e);
        }

        info!("Tenant re-sync started");

        let controller = self.clone();
        let member = member_tenant_id.to_string();
        Ok(tokio::spawn(async move {
            controller.publish_merge_ranges(&ctx, Some(member.as_str())).await
        }))
    }

    /// Publish every failed merge range again, returning how many were sent.
    #[instrument(skip(self))]
    pub async fn retry_failed_merge_ranges(&self, tenant_id: &str) -> Result<usize, ReindexError> {
        let ctx = self.resolver.resolve(tenant_id).await?;
        let failed = self.services.merge.fetch_failed_merge_ranges(&ctx).await?;
        if failed.is_empty() {
            info!("No failed merge ranges");
            return Ok(0);
        }

        let entity_types: BTreeSet<ReindexEntityType> =
            failed.iter().map(|range| range.entity_type).collect();
        for entity_type in entity_types {
            self.services
                .status
                .mark_merge_retried(&ctx, entity_type)
                .await?;
        }

        for range in &failed {
            self.services.merge.reset_range(&ctx, range.id).await?;
            self.source
                .publish_records_range(&ctx.acting_as(range.tenant_id.as_str()), range)
                .await?;
        }

        info!(count = failed.len(), "Republished failed merge ranges");
        Ok(failed.len())
    }

    /// Run the staging migration and the upload phase again after a failed
    /// migration.
    ///
    /// Only valid when every merge range was processed and the merge types
    /// were failed by the migration; staging rows are still in place then.
    #[instrument(skip(self))]
    pub async fn retry_migration(&self, tenant_id: &str) -> Result<(), ReindexError> {
        let resolved = self.resolver.resolve(tenant_id).await?;
        let ctx = resolved.acting_as(resolved.schema_tenant_id());

        let statuses = self.services.status.statuses(&ctx).await?;
        let merge_rows: Vec<&ReindexStatus> = statuses
            .iter()
            .filter(|row| row.entity_type.supports_merge())
            .collect();
        let migration_failed = !merge_rows.is_empty()
            && merge_rows.iter().all(|row| {
                row.status == StatusKind::MergeFailed
                    && row.total_merge_ranges > 0
                    && row.processed_merge_ranges >= row.total_merge_ranges
            });
        if !migration_failed {
            return Err(ReindexError::validation(format!(
                "Tenant {} has no failed staging migration to retry",
                tenant_id
            )));
        }
        if !self.services.merge.fetch_failed_merge_ranges(&ctx).await?.is_empty() {
            return Err(ReindexError::validation(format!(
                "Tenant {} has failed merge ranges; retry those first",
                tenant_id
            )));
        }

        for row in &merge_rows {
            self.services
                .status
                .mark_merge_retried(&ctx, row.entity_type)
                .await?;
        }

        let Some(completion) = self.services.status.complete_merge(&ctx).await? else {
            return Err(ReindexError::reindex(
                "Merge phase was claimed concurrently; migration not retried",
            ));
        };

        info!(target_tenant_id = ?completion.target_tenant_id, "Retrying staging migration");
        self.services
            .records_service()
            .finish_merge_phase(&ctx, completion.target_tenant_id.as_deref())
            .await
    }

    pub async fn status(&self, tenant_id: &str) -> Result<Vec<ReindexStatus>, ReindexError> {
        let ctx = self.resolver.resolve(tenant_id).await?;
        self.services.status.statuses(&ctx).await
    }

    /// Clear the previous cycle: ranges, canonical rows and search indices.
    async fn cleanup(&self, ctx: &ReindexContext) -> Result<(), ReindexError> {
        self.services.merge.delete_all_range_records(ctx).await?;
        self.services.migration.truncate_canonical(ctx).await?;

        if self.config.recreate_indices {
            for entity_type in self.services.upload.upload_types() {
                let index = index_name(
                    &self.config.index_prefix,
                    entity_type.resource_name(),
                    ctx.schema_tenant_id(),
                );
                self.writer.recreate_index(&index).await?;
            }
        }
        Ok(())
    }

    /// Wait for member range creation; any failure fails the merge phase.
    async fn await_members(
        &self,
        ctx: &ReindexContext,
        tasks: Vec<(String, JoinHandle<Result<Vec<MergeRange>, ReindexError>>)>,
    ) -> Result<(), ReindexError> {
        for (member, task) in tasks {
            let failure = match task.await {
                Ok(Ok(ranges)) => {
                    info!(member = %member, ranges = ranges.len(), "Created member merge ranges");
                    None
                }
                Ok(Err(e)) => Some(e),
                Err(e) => Some(ReindexError::channel(e.to_string())),
            };

            if let Some(e) = failure {
                error!(member = %member, error = %e, "Failed to create member merge ranges");
                self.fail_merge(ctx).await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Publish merge ranges type by type, in record-type order.
    ///
    /// The first failure stops publishing and fails the merge phase.
    async fn publish_merge_ranges(
        &self,
        ctx: &ReindexContext,
        only_tenant: Option<&str>,
    ) -> Result<usize, ReindexError> {
        match self.publish_all(ctx, only_tenant).await {
            Ok(published) => {
                info!(published = published, "Published merge ranges");
                Ok(published)
            }
            Err(e) => {
                error!(error = %e, "Publishing merge ranges failed");
                self.fail_merge(ctx).await;
                Err(e)
            }
        }
    }

    async fn publish_all(
        &self,
        ctx: &ReindexContext,
        only_tenant: Option<&str>,
    ) -> Result<usize, ReindexError> {
        let mut published = 0;

        for entity_type in ReindexEntityType::merge_types() {
            let ranges: Vec<MergeRange> = self
                .services
                .merge
                .fetch_merge_ranges(ctx, entity_type)
                .await?
                .into_iter()
                .filter(|range| only_tenant.map_or(true, |tenant| range.tenant_id == tenant))
                .collect();

            self.services
                .status
                .mark_merge_started(ctx, entity_type, ranges.len())
                .await?;

            for range in &ranges {
                self.source
                    .publish_records_range(&ctx.acting_as(range.tenant_id.as_str()), range)
                    .await?;
                published += 1;
            }
        }

        Ok(published)
    }

    async fn fail_merge(&self, ctx: &ReindexContext) {
        if let Err(e) = self
            .services
            .status
            .mark_merge_failed(ctx, &ReindexEntityType::merge_types())
            .await
        {
            warn!(error = %e, "Failed to mark merge phase failed");
        }
    }
}
