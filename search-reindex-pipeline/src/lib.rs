//! # Search Reindex Pipeline
//!
//! Services driving a full reindex cycle and the Kafka plumbing around them.
//!
//! ## Flow
//!
//! 1. **Controller**: clears bookkeeping, creates merge ranges per tenant and
//!    asks the system of record to push each range
//! 2. **Merge**: records events land in staging tables
//! 3. **Migration**: the last merged range moves staging rows into the
//!    canonical tables
//! 4. **Upload**: upload ranges over the canonical tables are published
//! 5. **Orchestration**: each upload range is fetched, converted and bulk
//!    written to the search engine

pub mod config;
pub mod consumer;
pub mod context;
pub mod errors;
pub mod integration;
pub mod producer;
pub mod runner;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::ReindexConfig;
pub use context::TenantContextResolver;
pub use errors::ReindexError;
pub use runner::{Listener, PipelineRunner};
