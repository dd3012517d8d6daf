//! Paged batch processing for a single document.
//!
//! One pass reads the source document page by page until the first empty
//! page. Each page is transformed into a destination collection plus an
//! attribute-value collection, and both are saved before the next page is
//! read. Everything is awaited in sequence; earlier pages stay written when a
//! later page fails.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{
    Document, ProgressReporter, Record, RecordCollection, RecordTransformer, ResourceStore,
};
use crate::eav::{AttributeIndex, DerivationStats, EavRowDeriver};
use crate::error::{MigrateError, Result};

/// The three documents one pass touches.
#[derive(Debug, Clone)]
pub struct DocumentJob {
    /// Source document (read).
    pub source: Document,

    /// Mapped destination document (written).
    pub destination: Document,

    /// Attribute-value sink in the destination (written).
    pub eav_sink: Document,
}

/// Statistics from one document pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentStats {
    /// Non-empty pages processed.
    pub pages: u64,

    /// Destination rows written.
    pub rows: u64,

    /// Attribute-value rows written.
    pub attribute_rows: u64,

    /// Derivation counters accumulated across the document.
    pub derivation: DerivationStats,

    /// Time spent reading pages.
    #[serde(skip)]
    pub read_time: Duration,

    /// Time spent saving collections.
    #[serde(skip)]
    pub write_time: Duration,
}

/// Streams one source document into its destination and attribute sink.
pub struct PagedBatchProcessor {
    source: Arc<dyn ResourceStore>,
    destination: Arc<dyn ResourceStore>,
    deriver: EavRowDeriver,
}

impl PagedBatchProcessor {
    /// Create a processor over a source and destination store.
    pub fn new(
        source: Arc<dyn ResourceStore>,
        destination: Arc<dyn ResourceStore>,
        deriver: EavRowDeriver,
    ) -> Self {
        Self {
            source,
            destination,
            deriver,
        }
    }

    /// Run one pass.
    ///
    /// `transformer` is initialised here, exactly once, before the first
    /// fetch. When `row_progress` is set it receives `start(count)`, one
    /// `advance` per source row and `finish` after the last page.
    pub async fn process(
        &self,
        job: &DocumentJob,
        transformer: &mut dyn RecordTransformer,
        index: &AttributeIndex,
        row_progress: Option<&dyn ProgressReporter>,
    ) -> Result<DocumentStats> {
        let source_name = job.source.name();
        let dest_name = job.destination.name();
        let sink_name = job.eav_sink.name();

        transformer.init()?;

        if let Some(progress) = row_progress {
            progress.start(self.source.get_records_count(source_name).await?);
        }

        let mut stats = DocumentStats::default();
        let mut page = 0usize;
        loop {
            let read_start = Instant::now();
            let rows = self.source.get_records(source_name, page).await?;
            stats.read_time += read_start.elapsed();
            if rows.is_empty() {
                break;
            }

            let mut dest_records = RecordCollection::new(&job.destination);
            let mut attribute_records = RecordCollection::new(&job.eav_sink);

            for row in rows {
                let source_record = Record::with_data(&job.source, row);
                let mut dest_record = Record::new(&job.destination);
                transformer.transform(&source_record, &mut dest_record)?;
                dest_records.add_record(dest_record)?;

                let derivation = self.deriver.derive(source_record.data(), index);
                stats.derivation.merge(&derivation.stats);
                for derived in derivation.rows {
                    attribute_records.add_record(derived.into_record(&job.eav_sink)?)?;
                }

                if let Some(progress) = row_progress {
                    progress.advance();
                }
            }

            let write_start = Instant::now();
            stats.rows += self
                .destination
                .save_records(dest_name, &dest_records)
                .await
                .map_err(|e| MigrateError::save(dest_name, page, e))?;
            stats.attribute_rows += self
                .destination
                .save_records(sink_name, &attribute_records)
                .await
                .map_err(|e| MigrateError::save(sink_name, page, e))?;
            stats.write_time += write_start.elapsed();

            debug!(
                "{}: page {} saved {} rows, {} attribute rows",
                source_name,
                page,
                dest_records.len(),
                attribute_records.len()
            );

            stats.pages += 1;
            page += 1;
        }

        if let Some(progress) = row_progress {
            progress.finish();
        }

        Ok(stats)
    }
}
