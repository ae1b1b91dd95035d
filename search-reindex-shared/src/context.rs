//! Tenant execution context.
//!
//! Every repository and service call receives a [`ReindexContext`] instead of
//! reading ambient state: the acting tenant, the validated schema holding the
//! tables, and whether the call is part of a reindex cycle.

use std::fmt;

use crate::error::RangeError;

/// PostgreSQL identifier length limit.
const MAX_SCHEMA_LENGTH: usize = 63;

/// A schema name that is safe to interpolate into SQL text.
///
/// Only lowercase ASCII letters, digits and underscores are accepted, the first
/// character must be a letter, and the length is capped at 63.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaName(String);

impl SchemaName {
    /// Validate and wrap a schema name.
    pub fn parse(name: impl Into<String>) -> Result<Self, RangeError> {
        let name = name.into();

        let starts_with_letter = name
            .chars()
            .next()
            .map(|c| c.is_ascii_lowercase())
            .unwrap_or(false);
        let allowed = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

        if !starts_with_letter || !allowed || name.len() > MAX_SCHEMA_LENGTH {
            return Err(RangeError::invalid_argument(format!(
                "Invalid schema name '{}'",
                name
            )));
        }

        Ok(Self(name))
    }

    /// Build the schema name of a tenant: `<tenant>_<suffix>`.
    pub fn for_tenant(tenant_id: &str, suffix: &str) -> Result<Self, RangeError> {
        Self::parse(format!("{}_{}", tenant_id.to_ascii_lowercase(), suffix))
    }

    /// The validated name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Qualify a table name with this schema.
    pub fn table(&self, table: &str) -> String {
        format!("{}.{}", self.0, table)
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The context a reindex operation executes in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexContext {
    tenant_id: String,
    schema: SchemaName,
    schema_tenant_id: String,
    reindex_mode: bool,
}

impl ReindexContext {
    /// A reindex-mode context for a tenant that owns its own schema.
    pub fn new(tenant_id: impl Into<String>, schema: SchemaName) -> Self {
        let tenant_id = tenant_id.into();
        Self {
            schema_tenant_id: tenant_id.clone(),
            tenant_id,
            schema,
            reindex_mode: true,
        }
    }

    /// Act on behalf of `tenant_id` while keeping this context's schema.
    ///
    /// Used for consortium members whose reindex data lives in the central
    /// tenant's schema. The original context is left untouched.
    pub fn acting_as(&self, tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            schema: self.schema.clone(),
            schema_tenant_id: self.schema_tenant_id.clone(),
            reindex_mode: self.reindex_mode,
        }
    }

    /// A copy of this context with reindex mode switched on or off.
    pub fn with_reindex_mode(mut self, reindex_mode: bool) -> Self {
        self.reindex_mode = reindex_mode;
        self
    }

    /// The tenant the operation acts as.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// The tenant owning the schema (the central tenant for consortia).
    pub fn schema_tenant_id(&self) -> &str {
        &self.schema_tenant_id
    }

    pub fn schema(&self) -> &SchemaName {
        &self.schema
    }

    /// Returns true while the call belongs to a full reindex cycle.
    pub fn is_reindex(&self) -> bool {
        self.reindex_mode
    }
}
