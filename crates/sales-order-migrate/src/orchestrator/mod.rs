//! Migration orchestrator - main workflow coordinator.
//!
//! Walks the configured source documents in order. Each mapped document has
//! its destination cleared, then is streamed through the
//! [`PagedBatchProcessor`](crate::transfer::PagedBatchProcessor). The
//! attribute metadata index is built once, on the first mapped document,
//! and the sink rows of its attribute ids are deleted before anything is
//! derived, so a re-run replaces rather than duplicates them.

use crate::config::Config;
use crate::core::{
    Document, MapDirection, MapReader, ProgressReporter, ResourceStore, TransformerFactory, Value,
};
use crate::eav::{check_sink, AttributeIndex, AttributeResolver, DerivationStats, EavRowDeriver};
use crate::error::{MigrateError, Result};
use crate::mapping::{ConfigMapReader, MappingTransformerFactory};
use crate::progress::{NoProgress, ProgressMode};
use crate::state::MigrationState;
use crate::transfer::{DocumentJob, DocumentStats, PagedBatchProcessor};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn ResourceStore>,
    destination: Arc<dyn ResourceStore>,
    map_reader: Arc<dyn MapReader>,
    transformer_factory: Arc<dyn TransformerFactory>,
    progress: Arc<dyn ProgressReporter>,
    progress_mode: ProgressMode,
    state_file: Option<PathBuf>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Configured source documents.
    pub documents_total: usize,

    /// Documents migrated.
    pub documents_migrated: usize,

    /// Unmapped documents that were skipped.
    pub skipped_documents: Vec<String>,

    /// Destination rows written.
    pub rows_migrated: u64,

    /// Attribute-value rows written.
    pub attribute_rows: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: u64,

    /// Derivation counters across all documents.
    pub derivation: DerivationStats,
}

/// Row counts for one mapped document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCount {
    /// Destination document.
    pub destination: String,
    /// Rows in the source document.
    pub source_rows: u64,
    /// Rows in the destination document.
    pub destination_rows: u64,
}

impl DocumentCount {
    /// Check whether the counts agree.
    pub fn matches(&self) -> bool {
        self.source_rows == self.destination_rows
    }
}

/// Connectivity of both stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub destination_connected: bool,
    pub destination_latency_ms: u64,
    pub destination_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator {
    /// Create an orchestrator over two stores.
    ///
    /// Mapping comes from the `map` config section and transformation from
    /// [`MappingTransformerFactory`]; both can be replaced with the builders.
    pub fn new(
        config: Config,
        source: Arc<dyn ResourceStore>,
        destination: Arc<dyn ResourceStore>,
    ) -> Self {
        let map_reader = Arc::new(ConfigMapReader::new(config.map.clone()));
        Self {
            config,
            source,
            destination,
            map_reader,
            transformer_factory: Arc::new(MappingTransformerFactory),
            progress: Arc::new(NoProgress),
            progress_mode: ProgressMode::Document,
            state_file: None,
        }
    }

    /// Connect MySQL stores for both sides of the configuration.
    #[cfg(feature = "mysql")]
    pub async fn connect(config: Config) -> Result<Self> {
        use crate::drivers::MysqlStore;

        let max_conns = config.migration.max_connections;
        let page_size = config.migration.page_size;
        let source = MysqlStore::new(&config.source, max_conns, page_size).await?;
        let destination = MysqlStore::new(&config.destination, max_conns, page_size).await?;
        Ok(Self::new(config, Arc::new(source), Arc::new(destination)))
    }

    /// Replace the map reader.
    pub fn with_map_reader(mut self, map_reader: Arc<dyn MapReader>) -> Self {
        self.map_reader = map_reader;
        self
    }

    /// Replace the transformer factory.
    pub fn with_transformer_factory(mut self, factory: Arc<dyn TransformerFactory>) -> Self {
        self.transformer_factory = factory;
        self
    }

    /// Set the progress reporter and its granularity.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>, mode: ProgressMode) -> Self {
        self.progress = progress;
        self.progress_mode = mode;
        self
    }

    /// Set the state file path for the run report.
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }

    /// Run the migration.
    ///
    /// Returns once every configured document has been processed. The first
    /// fatal error aborts the run; documents already written stay written.
    pub async fn perform(&self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut state = MigrationState::new(run_id.clone(), self.config.hash());

        info!("Starting migration run: {}", run_id);

        let documents = &self.config.migration.documents;
        let coarse = self.progress_mode == ProgressMode::Document;
        if coarse {
            self.progress.start(documents.len() as u64);
        }

        let mut index: Option<AttributeIndex> = None;
        let mut skipped = Vec::new();
        let mut migrated = 0usize;
        let mut rows_migrated = 0u64;
        let mut attribute_rows = 0u64;
        let mut derivation = DerivationStats::default();

        for name in documents {
            if coarse {
                self.progress.advance();
            }

            match self.migrate_document(name, &mut state, &mut index).await {
                Ok(Some(stats)) => {
                    migrated += 1;
                    rows_migrated += stats.rows;
                    attribute_rows += stats.attribute_rows;
                    derivation.merge(&stats.derivation);
                }
                Ok(None) => skipped.push(name.clone()),
                Err(e) => {
                    error!("Document {} failed: {}", name, e);
                    state.mark_failed();
                    if let Err(save_err) = self.save_state(&mut state) {
                        warn!("Failed to save state: {}", save_err);
                    }
                    if coarse {
                        self.progress.finish();
                    }
                    return Err(e);
                }
            }
        }

        if coarse {
            self.progress.finish();
        }

        state.mark_completed();
        self.save_state(&mut state)?;

        let completed_at = Utc::now();
        let duration = timer.elapsed().as_secs_f64();
        let rows_per_second = if duration > 0.0 {
            (rows_migrated as f64 / duration) as u64
        } else {
            0
        };

        info!(
            "Migration completed: {} documents, {} rows, {} attribute rows in {:.1}s",
            migrated, rows_migrated, attribute_rows, duration
        );
        if derivation.missing_join_keys > 0 {
            warn!(
                "{} source rows lacked store_id or entity_id; their attributes were not mirrored",
                derivation.missing_join_keys
            );
        }

        Ok(MigrationResult {
            run_id,
            status: "completed".to_string(),
            duration_seconds: duration,
            started_at,
            completed_at,
            documents_total: documents.len(),
            documents_migrated: migrated,
            skipped_documents: skipped,
            rows_migrated,
            attribute_rows,
            rows_per_second,
            derivation,
        })
    }

    /// Always fails: a partially migrated destination cannot be restored.
    /// Re-run the migration instead; every document pass starts by clearing
    /// its destination, and earlier attribute rows are replaced.
    pub async fn rollback(&self) -> Result<()> {
        Err(MigrateError::RollbackUnsupported)
    }

    /// Whether [`rollback`](Self::rollback) can succeed.
    pub fn supports_rollback(&self) -> bool {
        false
    }

    /// Migrate one document. `Ok(None)` means it is unmapped and was skipped.
    async fn migrate_document(
        &self,
        name: &str,
        state: &mut MigrationState,
        index_slot: &mut Option<AttributeIndex>,
    ) -> Result<Option<DocumentStats>> {
        let Some(dest_name) = self.map_reader.document_map(name, MapDirection::Source) else {
            debug!("{}: not mapped, skipping", name);
            return Ok(None);
        };

        let job = self.open_job(name, &dest_name).await?;
        let rows_total = self.source.get_records_count(name).await?;

        state
            .add_document(name, &dest_name, rows_total)?
            .mark_in_progress()?;
        self.save_state(state)?;
        info!("{} -> {}: migrating {} rows", name, dest_name, rows_total);

        match self.run_pass(&job, index_slot).await {
            Ok(stats) => {
                state.document_mut(name)?.mark_completed(&stats)?;
                self.save_state(state)?;
                info!(
                    "{} -> {}: {} rows, {} attribute rows in {} pages (read {:.1}s, write {:.1}s)",
                    name,
                    dest_name,
                    stats.rows,
                    stats.attribute_rows,
                    stats.pages,
                    stats.read_time.as_secs_f64(),
                    stats.write_time.as_secs_f64()
                );
                Ok(Some(stats))
            }
            Err(e) => {
                state.document_mut(name)?.mark_failed(&e.to_string())?;
                Err(e)
            }
        }
    }

    async fn open_job(&self, source_name: &str, dest_name: &str) -> Result<DocumentJob> {
        let source = require(self.source.as_ref(), source_name).await?;
        let destination = require(self.destination.as_ref(), dest_name).await?;
        let eav_sink = require(self.destination.as_ref(), &self.config.migration.eav.document).await?;
        check_sink(&eav_sink)?;
        Ok(DocumentJob {
            source,
            destination,
            eav_sink,
        })
    }

    async fn run_pass(
        &self,
        job: &DocumentJob,
        index_slot: &mut Option<AttributeIndex>,
    ) -> Result<DocumentStats> {
        self.destination
            .clear_document(job.destination.name())
            .await?;

        if index_slot.is_none() {
            let index = self.build_attribute_index().await?;
            self.purge_attribute_rows(job.eav_sink.name(), &index).await?;
            *index_slot = Some(index);
        }
        let index = &*index_slot.get_or_insert_with(AttributeIndex::default);

        let mut transformer = self.transformer_factory.create(
            &job.source,
            &job.destination,
            self.map_reader.clone(),
        );
        let processor = PagedBatchProcessor::new(
            self.source.clone(),
            self.destination.clone(),
            EavRowDeriver::new(self.config.migration.eav.attributes.clone()),
        );
        let row_progress =
            (self.progress_mode == ProgressMode::Row).then_some(self.progress.as_ref());

        processor
            .process(job, transformer.as_mut(), index, row_progress)
            .await
    }

    async fn build_attribute_index(&self) -> Result<AttributeIndex> {
        let eav = &self.config.migration.eav;
        let resolver = AttributeResolver::new(
            self.destination.clone(),
            eav.metadata_document.clone(),
            eav.fields.clone(),
        );
        let index = resolver.build_index(&eav.attributes).await?;
        info!(
            "Resolved {}/{} attribute codes from {}",
            index.len(),
            eav.attributes.len(),
            eav.metadata_document
        );
        Ok(index)
    }

    /// Remove sink rows left by an earlier run for the resolved attributes.
    async fn purge_attribute_rows(&self, sink: &str, index: &AttributeIndex) -> Result<()> {
        let ids: Vec<Value> = index.attribute_ids().into_iter().map(Value::Int).collect();
        let removed = self
            .destination
            .delete_records(sink, "attribute_id", &ids)
            .await?;
        if removed > 0 {
            info!("{}: removed {} attribute rows from an earlier run", sink, removed);
        }
        Ok(())
    }

    /// Save state to file.
    fn save_state(&self, state: &mut MigrationState) -> Result<()> {
        if let Some(ref path) = self.state_file {
            state.save(path)?;
        }
        Ok(())
    }

    /// Compare source and destination row counts for every mapped document.
    pub async fn validate(&self) -> Result<IndexMap<String, DocumentCount>> {
        let mut results = IndexMap::new();

        for name in &self.config.migration.documents {
            let Some(dest_name) = self.map_reader.document_map(name, MapDirection::Source) else {
                continue;
            };
            let count = DocumentCount {
                source_rows: self.source.get_records_count(name).await?,
                destination_rows: self.destination.get_records_count(&dest_name).await?,
                destination: dest_name,
            };

            if count.matches() {
                info!("{}: {} rows (match)", name, count.source_rows);
            } else {
                warn!(
                    "{}: source={} destination={} (MISMATCH)",
                    name, count.source_rows, count.destination_rows
                );
            }
            results.insert(name.clone(), count);
        }

        Ok(results)
    }

    /// Test both store connections.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let (source_connected, source_latency_ms, source_error) =
            probe(self.source.as_ref()).await;
        let (destination_connected, destination_latency_ms, destination_error) =
            probe(self.destination.as_ref()).await;

        Ok(HealthCheckResult {
            source_connected,
            source_latency_ms,
            source_error,
            destination_connected,
            destination_latency_ms,
            destination_error,
            healthy: source_connected && destination_connected,
        })
    }

    /// Close both stores.
    pub async fn close(&self) {
        self.source.close().await;
        self.destination.close().await;
    }
}

async fn require(store: &dyn ResourceStore, name: &str) -> Result<Document> {
    store
        .get_document(name)
        .await?
        .ok_or_else(|| MigrateError::DocumentNotFound(name.to_string()))
}

async fn probe(store: &dyn ResourceStore) -> (bool, u64, Option<String>) {
    let start = Instant::now();
    let outcome = store.test_connection().await;
    let latency = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(()) => (true, latency, None),
        Err(e) => (false, latency, Some(e.to_string())),
    }
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
