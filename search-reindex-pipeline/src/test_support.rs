//! In-memory collaborators for the pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use search_reindex_repository::{
    BulkWriteSummary, ChildRecordRepository, FetchedRecord, MergeRangeRepository,
    MergeRecordRepository, MigrationStore, RepositoryError, RepositoryRegistry, SearchError,
    SearchIndexWriter, SqlStatement, StatusRepository, UploadRangeRepository,
    UploadRangeStrategy, UploadRecordRepository,
};
use search_reindex_shared::model::complete_merge_phase;
use search_reindex_shared::{
    ChildRows, MergeCompletion, MergeRange, RecordBatch, ReindexContext, ReindexEntityType,
    ReindexRangeIndexEvent, ReindexStatus, SchemaName, SearchDocument, StatusUpdate, UploadBounds,
    UploadRange,
};

use crate::config::ReindexConfig;
use crate::consumer::{RangeIndexHandler, RecordsHandler};
use crate::context::TenantContextResolver;
use crate::errors::ReindexError;
use crate::integration::{RecordSourceClient, StaticConsortiumProvider};
use crate::producer::RangeEventPublisher;
use crate::service::{
    IndexDocumentConverter, RecordsEventService, ReindexController, ReindexOrchestrationService,
    ReindexServices, ReindexStores,
};

/// Context of `tenant_id` in its own `<tenant>_search` schema.
pub fn context(tenant_id: &str) -> ReindexContext {
    ReindexContext::new(tenant_id, SchemaName::for_tenant(tenant_id, "search").unwrap())
}

#[derive(Default)]
pub struct InMemoryMergeRangeRepository {
    ranges: Mutex<Vec<MergeRange>>,
}

impl InMemoryMergeRangeRepository {
    pub fn ranges(&self) -> Vec<MergeRange> {
        self.ranges.lock().unwrap().clone()
    }
}

#[async_trait]
impl MergeRangeRepository for InMemoryMergeRangeRepository {
    async fn save_ranges(&self, _ctx: &ReindexContext, ranges: &[MergeRange]) -> Result<(), RepositoryError> {
        self.ranges.lock().unwrap().extend(ranges.iter().cloned());
        Ok(())
    }

    async fn fetch_ranges(
        &self,
        _ctx: &ReindexContext,
        entity_type: ReindexEntityType,
    ) -> Result<Vec<MergeRange>, RepositoryError> {
        let mut ranges: Vec<MergeRange> = self
            .ranges()
            .into_iter()
            .filter(|r| r.entity_type == entity_type)
            .collect();
        ranges.sort_by(|a, b| (&a.tenant_id, &a.lower_bound).cmp(&(&b.tenant_id, &b.lower_bound)));
        Ok(ranges)
    }

    async fn fetch_failed(&self, _ctx: &ReindexContext) -> Result<Vec<MergeRange>, RepositoryError> {
        Ok(self.ranges().into_iter().filter(|r| r.is_failed()).collect())
    }

    async fn finish_range(
        &self,
        _ctx: &ReindexContext,
        range_id: Uuid,
        finished_at: DateTime<Utc>,
        fail_cause: Option<String>,
    ) -> Result<bool, RepositoryError> {
        let mut ranges = self.ranges.lock().unwrap();
        match ranges.iter_mut().find(|r| r.id == range_id && r.finished_at.is_none()) {
            Some(range) => {
                range.finished_at = Some(finished_at);
                range.fail_cause = fail_cause;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reset_range(&self, _ctx: &ReindexContext, range_id: Uuid) -> Result<(), RepositoryError> {
        if let Some(range) = self.ranges.lock().unwrap().iter_mut().find(|r| r.id == range_id) {
            range.finished_at = None;
            range.fail_cause = None;
        }
        Ok(())
    }

    async fn truncate(&self, _ctx: &ReindexContext) -> Result<(), RepositoryError> {
        self.ranges.lock().unwrap().clear();
        Ok(())
    }

    async fn delete_for_tenant(&self, _ctx: &ReindexContext, tenant_id: &str) -> Result<u64, RepositoryError> {
        let mut ranges = self.ranges.lock().unwrap();
        let before = ranges.len();
        ranges.retain(|r| r.tenant_id != tenant_id);
        Ok((before - ranges.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryUploadRangeRepository {
    ranges: Mutex<Vec<UploadRange>>,
    truncations: AtomicUsize,
}

impl InMemoryUploadRangeRepository {
    pub fn ranges(&self, entity_type: ReindexEntityType) -> Vec<UploadRange> {
        self.ranges
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.entity_type == entity_type)
            .cloned()
            .collect()
    }

    pub fn truncations(&self) -> usize {
        self.truncations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UploadRangeRepository for InMemoryUploadRangeRepository {
    async fn replace_ranges(
        &self,
        _ctx: &ReindexContext,
        entity_type: ReindexEntityType,
        ranges: &[UploadRange],
    ) -> Result<(), RepositoryError> {
        let mut stored = self.ranges.lock().unwrap();
        stored.retain(|r| r.entity_type != entity_type);
        stored.extend(ranges.iter().cloned());
        Ok(())
    }

    async fn set_finished(
        &self,
        _ctx: &ReindexContext,
        range_id: Uuid,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut ranges = self.ranges.lock().unwrap();
        match ranges.iter_mut().find(|r| r.id == range_id && r.finished_at.is_none()) {
            Some(range) => {
                range.finished_at = Some(finished_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn truncate(&self, _ctx: &ReindexContext) -> Result<(), RepositoryError> {
        self.ranges.lock().unwrap().clear();
        self.truncations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryStatusRepository {
    rows: Mutex<Vec<ReindexStatus>>,
}

impl InMemoryStatusRepository {
    pub fn rows(&self) -> Vec<ReindexStatus> {
        self.rows.lock().unwrap().clone()
    }

    pub fn status(&self, entity_type: ReindexEntityType) -> ReindexStatus {
        self.rows()
            .into_iter()
            .find(|row| row.entity_type == entity_type)
            .expect("status row")
    }
}

#[async_trait]
impl StatusRepository for InMemoryStatusRepository {
    async fn recreate(&self, _ctx: &ReindexContext, rows: &[ReindexStatus]) -> Result<(), RepositoryError> {
        *self.rows.lock().unwrap() = rows.to_vec();
        Ok(())
    }

    async fn apply(
        &self,
        _ctx: &ReindexContext,
        entity_type: ReindexEntityType,
        update: StatusUpdate,
    ) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .iter_mut()
            .find(|row| row.entity_type == entity_type)
            .map(|row| row.apply(update, Utc::now()))
            .unwrap_or(false))
    }

    async fn fetch_all(&self, _ctx: &ReindexContext) -> Result<Vec<ReindexStatus>, RepositoryError> {
        Ok(self.rows())
    }

    async fn complete_merge(&self, _ctx: &ReindexContext) -> Result<Option<MergeCompletion>, RepositoryError> {
        Ok(complete_merge_phase(&mut self.rows.lock().unwrap(), Utc::now()))
    }
}

/// Counts the rows of its own entity type in every saved batch.
pub struct RecordingMergeRecordRepository {
    entity_type: ReindexEntityType,
    rows: AtomicUsize,
    tenants: Mutex<Vec<String>>,
    schemas: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingMergeRecordRepository {
    pub fn new(entity_type: ReindexEntityType) -> Self {
        Self {
            entity_type,
            rows: AtomicUsize::new(0),
            tenants: Mutex::new(Vec::new()),
            schemas: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn saved_rows(&self) -> usize {
        self.rows.load(Ordering::SeqCst)
    }

    pub fn tenants(&self) -> Vec<String> {
        self.tenants.lock().unwrap().clone()
    }

    pub fn schemas(&self) -> Vec<String> {
        self.schemas.lock().unwrap().clone()
    }

    pub fn fail_saves(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MergeRecordRepository for RecordingMergeRecordRepository {
    fn entity_type(&self) -> ReindexEntityType {
        self.entity_type
    }

    async fn save_entities(&self, ctx: &ReindexContext, batch: &RecordBatch) -> Result<u64, RepositoryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepositoryError::database("staging insert failed"));
        }

        let tenants: Vec<String> = match self.entity_type {
            ReindexEntityType::Instance => batch.instances.iter().map(|r| r.tenant_id.clone()).collect(),
            ReindexEntityType::Holdings => batch.holdings.iter().map(|r| r.tenant_id.clone()).collect(),
            _ => batch.items.iter().map(|r| r.tenant_id.clone()).collect(),
        };

        self.rows.fetch_add(tenants.len(), Ordering::SeqCst);
        self.schemas.lock().unwrap().push(ctx.schema().to_string());
        let saved = tenants.len() as u64;
        self.tenants.lock().unwrap().extend(tenants);
        Ok(saved)
    }
}

#[derive(Default)]
pub struct RecordingChildRepository {
    saved: Mutex<Vec<ChildRows>>,
}

impl RecordingChildRepository {
    /// The last saved children.
    pub fn saved(&self) -> ChildRows {
        self.saved.lock().unwrap().last().cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

#[async_trait]
impl ChildRecordRepository for RecordingChildRepository {
    async fn save_children(&self, _ctx: &ReindexContext, children: &ChildRows) -> Result<u64, RepositoryError> {
        self.saved.lock().unwrap().push(children.clone());
        Ok((children.subjects.len() + children.contributors.len()) as u64)
    }
}

/// Upload repository returning whatever rows it was given.
pub struct StubUploadRecordRepository {
    entity_type: ReindexEntityType,
    strategy: UploadRangeStrategy,
    count: AtomicI64,
    records: Mutex<Vec<FetchedRecord>>,
}

impl StubUploadRecordRepository {
    pub fn new(entity_type: ReindexEntityType, strategy: UploadRangeStrategy) -> Self {
        Self {
            entity_type,
            strategy,
            count: AtomicI64::new(0),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn set_count(&self, count: i64) {
        self.count.store(count, Ordering::SeqCst);
    }

    pub fn set_records(&self, records: Vec<FetchedRecord>) {
        *self.records.lock().unwrap() = records;
    }
}

#[async_trait]
impl UploadRecordRepository for StubUploadRecordRepository {
    fn entity_type(&self) -> ReindexEntityType {
        self.entity_type
    }

    fn strategy(&self) -> UploadRangeStrategy {
        self.strategy
    }

    async fn count(&self, _ctx: &ReindexContext) -> Result<i64, RepositoryError> {
        Ok(self.count.load(Ordering::SeqCst))
    }

    async fn fetch_range(
        &self,
        _ctx: &ReindexContext,
        _bounds: &UploadBounds,
    ) -> Result<Vec<FetchedRecord>, RepositoryError> {
        Ok(self.records.lock().unwrap().clone())
    }
}

/// Records every successful transaction; affects one row per statement.
#[derive(Default)]
pub struct RecordingMigrationStore {
    runs: Mutex<Vec<Vec<SqlStatement>>>,
    fail: AtomicBool,
}

impl RecordingMigrationStore {
    pub fn runs(&self) -> Vec<Vec<SqlStatement>> {
        self.runs.lock().unwrap().clone()
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.fail.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl MigrationStore for RecordingMigrationStore {
    async fn execute_in_transaction(&self, statements: &[SqlStatement]) -> Result<Vec<u64>, RepositoryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepositoryError::database("deadlock detected"));
        }
        self.runs.lock().unwrap().push(statements.to_vec());
        Ok(vec![1; statements.len()])
    }
}

#[derive(Default)]
pub struct RecordingSearchWriter {
    documents: Mutex<Vec<SearchDocument>>,
    recreated: Mutex<Vec<String>>,
    requests: AtomicUsize,
    rejection: Mutex<Option<String>>,
    fail_requests: AtomicBool,
}

impl RecordingSearchWriter {
    pub fn documents(&self) -> Vec<SearchDocument> {
        self.documents.lock().unwrap().clone()
    }

    pub fn recreated(&self) -> Vec<String> {
        self.recreated.lock().unwrap().clone()
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Reject every document of later bulk writes with `reason`.
    pub fn reject_items(&self, reason: &str) {
        *self.rejection.lock().unwrap() = Some(reason.to_string());
    }

    /// Fail later bulk requests as a whole.
    pub fn fail_requests(&self) {
        self.fail_requests.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SearchIndexWriter for RecordingSearchWriter {
    async fn bulk_index(&self, documents: &[SearchDocument]) -> Result<BulkWriteSummary, SearchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(SearchError::connection("connection refused"));
        }
        if let Some(reason) = self.rejection.lock().unwrap().clone() {
            return Ok(BulkWriteSummary {
                total: documents.len(),
                failed: documents.len().max(1),
                errors: vec![reason],
            });
        }

        self.documents.lock().unwrap().extend(documents.iter().cloned());
        Ok(BulkWriteSummary::succeeded(documents.len()))
    }

    async fn recreate_index(&self, index: &str) -> Result<(), SearchError> {
        self.recreated.lock().unwrap().push(index.to_string());
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        Ok(true)
    }
}

/// System of record with configurable counts and failures.
#[derive(Default)]
pub struct RecordingRecordSource {
    counts: Mutex<HashMap<(String, ReindexEntityType), i64>>,
    published: Mutex<Vec<(String, MergeRange)>>,
    publish_calls: AtomicUsize,
    fail_at: Mutex<Option<usize>>,
    failing_tenants: Mutex<Vec<String>>,
}

impl RecordingRecordSource {
    pub fn set_count(&self, tenant_id: &str, entity_type: ReindexEntityType, count: i64) {
        self.counts
            .lock()
            .unwrap()
            .insert((tenant_id.to_string(), entity_type), count);
    }

    /// Fail the `call`-th publish (1-based).
    pub fn fail_publish_at(&self, call: usize) {
        *self.fail_at.lock().unwrap() = Some(call);
    }

    pub fn fail_count_for(&self, tenant_id: &str) {
        self.failing_tenants.lock().unwrap().push(tenant_id.to_string());
    }

    /// Successfully published ranges with the tenant they were sent as.
    pub fn published(&self) -> Vec<(String, MergeRange)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSourceClient for RecordingRecordSource {
    async fn fetch_record_count(
        &self,
        ctx: &ReindexContext,
        record_type: ReindexEntityType,
    ) -> Result<i64, ReindexError> {
        if self.failing_tenants.lock().unwrap().iter().any(|t| t == ctx.tenant_id()) {
            return Err(ReindexError::integration("record count unavailable"));
        }
        Ok(self
            .counts
            .lock()
            .unwrap()
            .get(&(ctx.tenant_id().to_string(), record_type))
            .copied()
            .unwrap_or(0))
    }

    async fn publish_records_range(&self, ctx: &ReindexContext, range: &MergeRange) -> Result<(), ReindexError> {
        let call = self.publish_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_at.lock().unwrap() == Some(call) {
            return Err(ReindexError::integration("publish failed"));
        }
        self.published
            .lock()
            .unwrap()
            .push((ctx.tenant_id().to_string(), range.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<ReindexRangeIndexEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<ReindexRangeIndexEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl RangeEventPublisher for RecordingPublisher {
    async fn publish_range_events(&self, events: &[ReindexRangeIndexEvent]) -> Result<(), ReindexError> {
        self.events.lock().unwrap().extend(events.iter().cloned());
        Ok(())
    }
}

/// Every service wired to in-memory collaborators.
pub struct Harness {
    pub merge_ranges: Arc<InMemoryMergeRangeRepository>,
    pub upload_ranges: Arc<InMemoryUploadRangeRepository>,
    pub statuses: Arc<InMemoryStatusRepository>,
    pub children: Arc<RecordingChildRepository>,
    pub migrations: Arc<RecordingMigrationStore>,
    pub instances: Arc<RecordingMergeRecordRepository>,
    pub holdings: Arc<RecordingMergeRecordRepository>,
    pub items: Arc<RecordingMergeRecordRepository>,
    pub instance_uploads: Arc<StubUploadRecordRepository>,
    pub subjects: Arc<StubUploadRecordRepository>,
    pub source: Arc<RecordingRecordSource>,
    pub publisher: Arc<RecordingPublisher>,
    pub writer: Arc<RecordingSearchWriter>,
    pub resolver: TenantContextResolver,
    pub services: ReindexServices,
    pub orchestration: Arc<ReindexOrchestrationService>,
    pub records: Arc<RecordsEventService>,
    pub controller: ReindexController,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_consortium("")
    }

    pub fn with_consortium(spec: &str) -> Self {
        let merge_ranges = Arc::new(InMemoryMergeRangeRepository::default());
        let upload_ranges = Arc::new(InMemoryUploadRangeRepository::default());
        let statuses = Arc::new(InMemoryStatusRepository::default());
        let children = Arc::new(RecordingChildRepository::default());
        let migrations = Arc::new(RecordingMigrationStore::default());
        let instances = Arc::new(RecordingMergeRecordRepository::new(ReindexEntityType::Instance));
        let holdings = Arc::new(RecordingMergeRecordRepository::new(ReindexEntityType::Holdings));
        let items = Arc::new(RecordingMergeRecordRepository::new(ReindexEntityType::Item));
        let instance_uploads = Arc::new(StubUploadRecordRepository::new(
            ReindexEntityType::Instance,
            UploadRangeStrategy::IdentifierSpace,
        ));
        let subjects = Arc::new(StubUploadRecordRepository::new(
            ReindexEntityType::Subject,
            UploadRangeStrategy::HexSpace,
        ));
        let source = Arc::new(RecordingRecordSource::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let writer = Arc::new(RecordingSearchWriter::default());

        let mut registry = RepositoryRegistry::new()
            .with_merge(instances.clone())
            .with_merge(holdings.clone())
            .with_merge(items.clone())
            .with_upload(instance_uploads.clone())
            .with_upload(subjects.clone());
        for entity_type in [
            ReindexEntityType::Contributor,
            ReindexEntityType::Classification,
            ReindexEntityType::CallNumber,
        ] {
            registry = registry.with_upload(Arc::new(StubUploadRecordRepository::new(
                entity_type,
                UploadRangeStrategy::HexSpace,
            )));
        }

        let consortium = Arc::new(StaticConsortiumProvider::parse(spec).unwrap());
        let resolver = TenantContextResolver::new(consortium.clone(), "search");
        let config = ReindexConfig::default();

        let services = ReindexServices::new(
            ReindexStores {
                merge_ranges: merge_ranges.clone(),
                upload_ranges: upload_ranges.clone(),
                statuses: statuses.clone(),
                children: children.clone(),
                migrations: migrations.clone(),
                registry,
            },
            source.clone(),
            publisher.clone(),
            &config,
        );
        let orchestration = Arc::new(ReindexOrchestrationService::new(
            services.upload.clone(),
            Arc::new(IndexDocumentConverter::new(config.index_prefix.clone())),
            writer.clone(),
            services.status.clone(),
        ));
        let records = Arc::new(services.records_service());
        let controller = ReindexController::new(
            services.clone(),
            resolver.clone(),
            consortium,
            source.clone(),
            writer.clone(),
            config,
        );

        Self {
            merge_ranges,
            upload_ranges,
            statuses,
            children,
            migrations,
            instances,
            holdings,
            items,
            instance_uploads,
            subjects,
            source,
            publisher,
            writer,
            resolver,
            services,
            orchestration,
            records,
            controller,
        }
    }

    /// Fresh status rows for every entity type.
    pub async fn recreate_statuses(&self, ctx: &ReindexContext) {
        self.services
            .status
            .recreate(ctx, &ReindexEntityType::ALL, None)
            .await
            .unwrap();
    }

    pub fn range_index_handler(&self) -> RangeIndexHandler {
        RangeIndexHandler::new(
            self.resolver.clone(),
            self.orchestration.clone(),
            self.services.status.clone(),
        )
    }

    pub fn records_handler(&self) -> RecordsHandler {
        RecordsHandler::new(self.resolver.clone(), self.records.clone())
    }
}
