//! PostgreSQL implementations of the repository interfaces.
//!
//! Every statement targets the schema of the [`ReindexContext`] it receives.
//! Schema names are validated when the context is built, so interpolating
//! them into SQL text is safe; all values are bound parameters.
//!
//! [`ReindexContext`]: search_reindex_shared::ReindexContext

mod children;
mod dictionary;
mod merge_range;
pub mod migration;
mod migration_store;
mod records;
mod status;
pub mod tables;
mod upload_range;

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

pub use children::PgChildRecordRepository;
pub use dictionary::{DictionarySource, PgDictionaryRepository};
pub use merge_range::PgMergeRangeRepository;
pub use migration::{MergeStrategy, MigrationPlan};
pub use migration_store::PgMigrationStore;
pub use records::{PgHoldingRepository, PgInstanceRepository, PgItemRepository};
pub use status::PgStatusRepository;
pub use upload_range::PgUploadRangeRepository;

use crate::errors::RepositoryError;
use crate::registry::RepositoryRegistry;

/// Rows per multi-row `INSERT`, well below the bind parameter limit.
pub(crate) const INSERT_CHUNK_SIZE: usize = 1000;

/// Open a connection pool to `database_url`.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, RepositoryError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| RepositoryError::connection(e.to_string()))?;

    info!(max_connections = max_connections, "Connected to PostgreSQL");
    Ok(pool)
}

/// Registry of every PostgreSQL record repository.
pub fn registry(pool: &PgPool) -> RepositoryRegistry {
    let instances = Arc::new(PgInstanceRepository::new(pool.clone()));

    RepositoryRegistry::new()
        .with_merge(instances.clone())
        .with_merge(Arc::new(PgHoldingRepository::new(pool.clone())))
        .with_merge(Arc::new(PgItemRepository::new(pool.clone())))
        .with_upload(instances)
        .with_upload(Arc::new(PgDictionaryRepository::new(pool.clone(), DictionarySource::Subject)))
        .with_upload(Arc::new(PgDictionaryRepository::new(
            pool.clone(),
            DictionarySource::Contributor,
        )))
        .with_upload(Arc::new(PgDictionaryRepository::new(
            pool.clone(),
            DictionarySource::Classification,
        )))
        .with_upload(Arc::new(PgDictionaryRepository::new(
            pool.clone(),
            DictionarySource::CallNumber,
        )))
}

/// Keep the last row for every key, ordered by that last occurrence.
///
/// A multi-row upsert must not touch the same key twice.
pub(crate) fn last_by_key<T, K, F>(rows: &[T], key: F) -> Vec<&T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    let mut kept: Vec<&T> = rows.iter().rev().filter(|row| seen.insert(key(row))).collect();
    kept.reverse();
    kept
}
