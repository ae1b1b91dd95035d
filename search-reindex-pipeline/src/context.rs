//! Tenant context resolution.
//!
//! Consortium members keep their reindex data in the central tenant's
//! schema, so every incoming tenant id is mapped to the schema that owns it.

use std::sync::Arc;

use search_reindex_shared::{ReindexContext, SchemaName};
use tracing::debug;

use crate::errors::ReindexError;
use crate::integration::ConsortiumTenantProvider;

/// Builds the [`ReindexContext`] a tenant's work executes in.
#[derive(Clone)]
pub struct TenantContextResolver {
    consortium: Arc<dyn ConsortiumTenantProvider>,
    schema_suffix: String,
}

impl TenantContextResolver {
    pub fn new(consortium: Arc<dyn ConsortiumTenantProvider>, schema_suffix: impl Into<String>) -> Self {
        Self {
            consortium,
            schema_suffix: schema_suffix.into(),
        }
    }

    /// Context of `tenant_id`'s own schema, ignoring consortium membership.
    pub fn own_context(&self, tenant_id: &str) -> Result<ReindexContext, ReindexError> {
        let schema = SchemaName::for_tenant(tenant_id, &self.schema_suffix)
            .map_err(|e| ReindexError::validation(e.to_string()))?;
        Ok(ReindexContext::new(tenant_id, schema))
    }

    /// Context for work done on behalf of `tenant_id`.
    ///
    /// A consortium member acts as itself inside the central tenant's schema.
    pub async fn resolve(&self, tenant_id: &str) -> Result<ReindexContext, ReindexError> {
        match self.consortium.central_tenant(tenant_id).await? {
            Some(central) => {
                debug!(tenant_id = %tenant_id, central_tenant_id = %central, "Resolved consortium member");
                Ok(self.own_context(&central)?.acting_as(tenant_id))
            }
            None => self.own_context(tenant_id),
        }
    }
}
