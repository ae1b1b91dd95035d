//! Settings read from the environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use search_reindex_pipeline::config::{
    DEFAULT_INDEX_PREFIX, DEFAULT_MERGE_RANGE_SIZE, DEFAULT_SCHEMA_SUFFIX,
    DEFAULT_UPLOAD_RANGE_LEVEL, DEFAULT_UPLOAD_RANGE_SIZE,
};
use search_reindex_pipeline::ReindexConfig;
use search_reindex_repository::postgres::MergeStrategy;

use crate::ReindexAppError;

/// Default maximum size of the PostgreSQL pool.
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default Kafka broker address.
const DEFAULT_KAFKA_BROKER: &str = "localhost:9092";

/// Default Kafka consumer group ID.
const DEFAULT_KAFKA_GROUP_ID: &str = "search-reindex";

const DEFAULT_RANGE_INDEX_TOPIC: &str = "search.reindex.range-index";

const DEFAULT_RECORDS_TOPIC: &str = "inventory.reindex-records";

/// Default base URL of the system of record.
const DEFAULT_SOURCE_OF_RECORD_URL: &str = "http://localhost:9130";

/// Timeout of one request to the system of record.
const SOURCE_OF_RECORD_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest accepted dictionary upload prefix.
const MAX_UPLOAD_RANGE_LEVEL: usize = 4;

/// Every setting of the service.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub db_max_connections: u32,
    pub opensearch_url: String,
    pub kafka_broker: String,
    pub kafka_group_id: String,
    pub range_index_topic: String,
    pub records_topic: String,
    pub source_of_record_url: String,
    pub source_of_record_timeout: Duration,
    /// Consortium membership, `central:member1,member2;other:memberX`.
    pub consortium_tenants: String,
    pub reindex: ReindexConfig,
}

impl Settings {
    /// Read settings from the process environment, loading `.env` first when
    /// present.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: PostgreSQL connection string (required)
    /// - `DB_MAX_CONNECTIONS`: pool size (default: 10)
    /// - `DB_SCHEMA_SUFFIX`: tenant schema suffix (default: search)
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `SEARCH_INDEX_PREFIX`: index name prefix (default: reindex)
    /// - `KAFKA_BROKER`: Kafka broker address (default: localhost:9092)
    /// - `KAFKA_GROUP_ID`: consumer group ID (default: search-reindex)
    /// - `KAFKA_RANGE_INDEX_TOPIC`, `KAFKA_RECORDS_TOPIC`: consumed topics
    /// - `REINDEX_*`: range sizes, merge strategy, retry and concurrency knobs
    /// - `SOURCE_OF_RECORD_URL`: system of record base URL
    /// - `CONSORTIUM_TENANTS`: consortium membership
    pub fn from_env() -> Result<Self, ReindexAppError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup` and validate them.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ReindexAppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ReindexAppError::config("DATABASE_URL must be set"))?;

        let merge_strategy = match lookup("REINDEX_MERGE_STRATEGY") {
            Some(value) => MergeStrategy::from_str(&value)
                .map_err(|e| ReindexAppError::config(e.to_string()))?,
            None => MergeStrategy::default(),
        };

        let reindex = ReindexConfig {
            merge_range_size: parse(&lookup, "REINDEX_MERGE_RANGE_SIZE", DEFAULT_MERGE_RANGE_SIZE)?,
            upload_range_size: parse(&lookup, "REINDEX_UPLOAD_RANGE_SIZE", DEFAULT_UPLOAD_RANGE_SIZE)?,
            upload_range_level: parse(&lookup, "REINDEX_UPLOAD_RANGE_LEVEL", DEFAULT_UPLOAD_RANGE_LEVEL)?,
            merge_strategy,
            recreate_indices: parse(&lookup, "REINDEX_RECREATE_INDICES", true)?,
            index_prefix: text("SEARCH_INDEX_PREFIX", DEFAULT_INDEX_PREFIX),
            schema_suffix: text("DB_SCHEMA_SUFFIX", DEFAULT_SCHEMA_SUFFIX),
            retry_attempts: parse(&lookup, "REINDEX_RETRY_ATTEMPTS", 3)?,
            retry_delay: Duration::from_millis(parse(&lookup, "REINDEX_RETRY_DELAY_MS", 1000)?),
            listener_concurrency: parse(&lookup, "REINDEX_LISTENER_CONCURRENCY", 2)?,
        };

        let settings = Self {
            database_url,
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            opensearch_url: text("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL),
            kafka_broker: text("KAFKA_BROKER", DEFAULT_KAFKA_BROKER),
            kafka_group_id: text("KAFKA_GROUP_ID", DEFAULT_KAFKA_GROUP_ID),
            range_index_topic: text("KAFKA_RANGE_INDEX_TOPIC", DEFAULT_RANGE_INDEX_TOPIC),
            records_topic: text("KAFKA_RECORDS_TOPIC", DEFAULT_RECORDS_TOPIC),
            source_of_record_url: text("SOURCE_OF_RECORD_URL", DEFAULT_SOURCE_OF_RECORD_URL),
            source_of_record_timeout: SOURCE_OF_RECORD_TIMEOUT,
            consortium_tenants: text("CONSORTIUM_TENANTS", ""),
            reindex,
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ReindexAppError> {
        for (name, value) in [
            ("OPENSEARCH_URL", &self.opensearch_url),
            ("SOURCE_OF_RECORD_URL", &self.source_of_record_url),
        ] {
            let url = Url::parse(value)
                .map_err(|e| ReindexAppError::config(format!("{} is not a valid URL: {}", name, e)))?;
            if url.host_str().map_or(true, |host| !is_valid_hostname(host)) {
                return Err(ReindexAppError::config(format!("{} has an invalid host", name)));
            }
        }

        for broker in self.kafka_broker.split(',') {
            let host = broker.trim().rsplit_once(':').map_or(broker.trim(), |(host, _)| host);
            if !is_valid_hostname(host) {
                return Err(ReindexAppError::config(format!("Invalid Kafka broker '{}'", broker)));
            }
        }

        let suffix = &self.reindex.schema_suffix;
        if suffix.is_empty()
            || !suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ReindexAppError::config(format!(
                "DB_SCHEMA_SUFFIX '{}' may only contain lowercase letters, digits and underscores",
                suffix
            )));
        }

        if self.reindex.merge_range_size <= 0 || self.reindex.upload_range_size <= 0 {
            return Err(ReindexAppError::config("Range sizes must be positive"));
        }
        if !(1..=MAX_UPLOAD_RANGE_LEVEL).contains(&self.reindex.upload_range_level) {
            return Err(ReindexAppError::config(format!(
                "REINDEX_UPLOAD_RANGE_LEVEL must be between 1 and {}",
                MAX_UPLOAD_RANGE_LEVEL
            )));
        }
        if self.reindex.listener_concurrency == 0 || self.reindex.retry_attempts == 0 {
            return Err(ReindexAppError::config(
                "Listener concurrency and retry attempts must be at least 1",
            ));
        }
        if self.db_max_connections == 0 {
            return Err(ReindexAppError::config("DB_MAX_CONNECTIONS must be at least 1"));
        }

        Ok(())
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ReindexAppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| ReindexAppError::config(format!("Invalid {} '{}': {}", key, value, e))),
        None => Ok(default),
    }
}

fn is_valid_hostname(host: &str) -> bool {
    !host.is_empty()
        && host.len() <= 253
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
}
