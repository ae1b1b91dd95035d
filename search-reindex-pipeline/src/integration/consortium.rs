//! Consortium membership lookup.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::ReindexError;

/// Answers which tenants form a consortium.
#[async_trait]
pub trait ConsortiumTenantProvider: Send + Sync {
    /// The central tenant of `tenant_id`, if it is a consortium member.
    async fn central_tenant(&self, tenant_id: &str) -> Result<Option<String>, ReindexError>;

    /// Member tenants of `central_tenant_id`; empty for non-consortium tenants.
    async fn member_tenants(&self, central_tenant_id: &str) -> Result<Vec<String>, ReindexError>;
}

/// Membership read from configuration.
///
/// The format is `central:member1,member2;other:memberX`.
#[derive(Debug, Clone, Default)]
pub struct StaticConsortiumProvider {
    members: HashMap<String, Vec<String>>,
}

impl StaticConsortiumProvider {
    pub fn parse(spec: &str) -> Result<Self, ReindexError> {
        let mut members: HashMap<String, Vec<String>> = HashMap::new();

        for group in spec.split(';').map(str::trim).filter(|g| !g.is_empty()) {
            let (central, list) = group.split_once(':').ok_or_else(|| {
                ReindexError::validation(format!("Invalid consortium entry '{}'", group))
            })?;

            let central = central.trim();
            if central.is_empty() {
                return Err(ReindexError::validation(format!(
                    "Missing central tenant in consortium entry '{}'",
                    group
                )));
            }

            let tenants: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty() && *t != central)
                .map(String::from)
                .collect();

            members.entry(central.to_string()).or_default().extend(tenants);
        }

        Ok(Self { members })
    }
}

#[async_trait]
impl ConsortiumTenantProvider for StaticConsortiumProvider {
    async fn central_tenant(&self, tenant_id: &str) -> Result<Option<String>, ReindexError> {
        Ok(self
            .members
            .iter()
            .find(|(_, members)| members.iter().any(|m| m == tenant_id))
            .map(|(central, _)| central.clone()))
    }

    async fn member_tenants(&self, central_tenant_id: &str) -> Result<Vec<String>, ReindexError> {
        Ok(self
            .members
            .get(central_tenant_id)
            .cloned()
            .unwrap_or_default())
    }
}
