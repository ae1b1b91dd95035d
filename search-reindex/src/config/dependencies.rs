//! Dependency initialization and wiring for the search reindex service.

use std::sync::Arc;

use tracing::info;

use search_reindex_pipeline::consumer::{KafkaConsumer, RangeIndexHandler, RecordsHandler, RetryPolicy};
use search_reindex_pipeline::integration::{
    ConsortiumTenantProvider, HttpRecordSourceClient, StaticConsortiumProvider,
};
use search_reindex_pipeline::producer::KafkaProducer;
use search_reindex_pipeline::service::{
    IndexDocumentConverter, ReindexController, ReindexOrchestrationService, ReindexServices,
    ReindexStores,
};
use search_reindex_pipeline::{Listener, PipelineRunner, TenantContextResolver};
use search_reindex_repository::postgres::{
    self, PgChildRecordRepository, PgMergeRangeRepository, PgMigrationStore, PgStatusRepository,
    PgUploadRangeRepository,
};
use search_reindex_repository::{OpenSearchClient, SearchIndexWriter};

use crate::{ReindexAppError, Settings};

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// Entry point of operator commands.
    pub controller: ReindexController,
    settings: Settings,
    services: ReindexServices,
    resolver: TenantContextResolver,
    search: Arc<OpenSearchClient>,
    producer: Arc<KafkaProducer>,
}

impl Dependencies {
    /// Connect to PostgreSQL, OpenSearch, the system of record and Kafka, and
    /// build the services on top of them.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(ReindexAppError)` - If a connection or client cannot be set up
    pub async fn new(settings: Settings) -> Result<Self, ReindexAppError> {
        info!(
            opensearch_url = %settings.opensearch_url,
            kafka_broker = %settings.kafka_broker,
            kafka_group_id = %settings.kafka_group_id,
            merge_strategy = %settings.reindex.merge_strategy,
            "Initializing dependencies"
        );

        let pool = postgres::connect(&settings.database_url, settings.db_max_connections).await?;

        let search = OpenSearchClient::new(&settings.opensearch_url)
            .await
            .map_err(|e| ReindexAppError::config(format!("Failed to create OpenSearch client: {}", e)))?;

        let healthy = search
            .health_check()
            .await
            .map_err(|e| ReindexAppError::config(format!("OpenSearch health check failed: {}", e)))?;
        if !healthy {
            return Err(ReindexAppError::config("OpenSearch cluster is unhealthy"));
        }

        info!("OpenSearch connection verified");

        let source = Arc::new(HttpRecordSourceClient::new(
            &settings.source_of_record_url,
            settings.source_of_record_timeout,
        )?);

        let producer = Arc::new(
            KafkaProducer::new(&settings.kafka_broker, settings.range_index_topic.clone())
                .map_err(|e| ReindexAppError::config(format!("Failed to create Kafka producer: {}", e)))?,
        );

        let consortium: Arc<dyn ConsortiumTenantProvider> =
            Arc::new(StaticConsortiumProvider::parse(&settings.consortium_tenants)?);
        let resolver =
            TenantContextResolver::new(consortium.clone(), settings.reindex.schema_suffix.clone());

        let stores = ReindexStores {
            merge_ranges: Arc::new(PgMergeRangeRepository::new(pool.clone())),
            upload_ranges: Arc::new(PgUploadRangeRepository::new(pool.clone())),
            statuses: Arc::new(PgStatusRepository::new(pool.clone())),
            children: Arc::new(PgChildRecordRepository::new(pool.clone())),
            migrations: Arc::new(PgMigrationStore::new(pool.clone())),
            registry: postgres::registry(&pool),
        };

        let search = Arc::new(search);
        let services = ReindexServices::new(stores, source.clone(), producer.clone(), &settings.reindex);
        let controller = ReindexController::new(
            services.clone(),
            resolver.clone(),
            consortium,
            source,
            search.clone(),
            settings.reindex.clone(),
        );

        Ok(Self {
            controller,
            settings,
            services,
            resolver,
            search,
            producer,
        })
    }

    /// Build the range-index and records listeners.
    pub fn runner(&self) -> Result<PipelineRunner, ReindexAppError> {
        let settings = &self.settings;

        let orchestration = Arc::new(ReindexOrchestrationService::new(
            self.services.upload.clone(),
            Arc::new(IndexDocumentConverter::new(settings.reindex.index_prefix.clone())),
            self.search.clone(),
            self.services.status.clone(),
        ));

        let range_index = Listener {
            consumer: KafkaConsumer::new(
                &settings.kafka_broker,
                &settings.kafka_group_id,
                settings.range_index_topic.clone(),
            )?,
            handler: Arc::new(RangeIndexHandler::new(
                self.resolver.clone(),
                orchestration,
                self.services.status.clone(),
            )),
        };

        let records = Listener {
            consumer: KafkaConsumer::new(
                &settings.kafka_broker,
                &settings.kafka_group_id,
                settings.records_topic.clone(),
            )?,
            handler: Arc::new(RecordsHandler::new(
                self.resolver.clone(),
                Arc::new(self.services.records_service()),
            )),
        };

        info!(
            range_index_topic = %settings.range_index_topic,
            records_topic = %settings.records_topic,
            "Kafka consumers created"
        );

        Ok(PipelineRunner::new(
            vec![range_index, records],
            self.producer.clone(),
            RetryPolicy::from(&settings.reindex),
            settings.reindex.listener_concurrency,
        ))
    }
}
