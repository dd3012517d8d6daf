//! File-based run report.
//!
//! The state file records what one run did to each document. It is not a
//! resume point: every run starts from a cleared destination document.

use crate::eav::DerivationStats;
use crate::error::{MigrateError, Result};
use crate::transfer::DocumentStats;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

/// Migration state for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationState {
    /// Unique run identifier.
    pub run_id: String,

    /// SHA256 hash of the configuration.
    pub config_hash: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// Current run status.
    pub status: RunStatus,

    /// Per-document state, keyed by source document, in processing order.
    pub documents: IndexMap<String, DocumentState>,

    /// When the migration completed (if finished).
    pub completed_at: Option<DateTime<Utc>>,

    /// HMAC-SHA256 signature for integrity validation.
    /// Computed over serialized state (excluding this field) using config_hash as key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Per-document state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentState {
    /// Destination document the source maps to.
    pub destination: String,

    /// Task status.
    pub status: TaskStatus,

    /// Source rows at the start of the pass.
    pub rows_total: u64,

    /// Destination rows written.
    pub rows_migrated: u64,

    /// Pages processed.
    pub pages: u64,

    /// Attribute-value rows written.
    pub attribute_rows: u64,

    /// Derivation counters.
    #[serde(default)]
    pub derivation: DerivationStats,

    /// When the pass started.
    pub started_at: Option<DateTime<Utc>>,

    /// When the pass finished (either way).
    pub completed_at: Option<DateTime<Utc>>,

    /// Error message if failed.
    pub error: Option<String>,
}

impl MigrationState {
    /// Create a new migration state.
    pub fn new(run_id: String, config_hash: String) -> Self {
        Self {
            run_id,
            config_hash,
            started_at: Utc::now(),
            status: RunStatus::Running,
            documents: IndexMap::new(),
            completed_at: None,
            hmac: None, // Will be computed on first save
        }
    }

    /// Compute HMAC-SHA256 signature for state integrity validation.
    ///
    /// Uses config_hash as HMAC key.
    fn compute_hmac(&self) -> Result<String> {
        let mut state_for_signing = self.clone();
        state_for_signing.hmac = None;

        let content = serde_json::to_string(&state_for_signing)?;

        let mut mac = HmacSha256::new_from_slice(self.config_hash.as_bytes())
            .map_err(|e| MigrateError::State(format!("Failed to create HMAC: {}", e)))?;

        mac.update(content.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Load state from a file with integrity validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&content)?;

        match &state.hmac {
            Some(stored) if stored != &state.compute_hmac()? => Err(MigrateError::State(
                "State file integrity check failed: HMAC mismatch (possible tampering)".to_string(),
            )),
            Some(_) => Ok(state),
            None => Err(MigrateError::State(
                "State file has no HMAC signature".to_string(),
            )),
        }
    }

    /// Save state to a file (atomic write with HMAC).
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();

        self.hmac = Some(self.compute_hmac()?);
        let content = serde_json::to_string_pretty(self)?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Register a document as pending. Registering twice is an error.
    pub fn add_document(
        &mut self,
        source: &str,
        destination: &str,
        rows_total: u64,
    ) -> Result<&mut DocumentState> {
        if self.documents.contains_key(source) {
            return Err(MigrateError::State(format!(
                "document {} was already processed in this run",
                source
            )));
        }
        Ok(self
            .documents
            .entry(source.to_string())
            .or_insert_with(|| DocumentState::new(destination, rows_total)))
    }

    /// Get a document's state.
    pub fn document_mut(&mut self, source: &str) -> Result<&mut DocumentState> {
        self.documents
            .get_mut(source)
            .ok_or_else(|| MigrateError::State(format!("unknown document {}", source)))
    }

    /// Mark the migration as completed.
    pub fn mark_completed(&mut self) {
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the migration as failed.
    pub fn mark_failed(&mut self) {
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
    }
}

impl DocumentState {
    /// Create a pending document state.
    pub fn new(destination: &str, rows_total: u64) -> Self {
        Self {
            destination: destination.to_string(),
            status: TaskStatus::Pending,
            rows_total,
            rows_migrated: 0,
            pages: 0,
            attribute_rows: 0,
            derivation: DerivationStats::default(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Move to `next`. Only pending -> in_progress -> completed | failed is allowed.
    pub fn transition(&mut self, next: TaskStatus) -> Result<()> {
        let allowed = matches!(
            (self.status, next),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Failed)
        );
        if !allowed {
            return Err(MigrateError::State(format!(
                "invalid document transition {:?} -> {:?}",
                self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Mark the document as in progress.
    pub fn mark_in_progress(&mut self) -> Result<()> {
        self.transition(TaskStatus::InProgress)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the document as completed with its pass statistics.
    pub fn mark_completed(&mut self, stats: &DocumentStats) -> Result<()> {
        self.transition(TaskStatus::Completed)?;
        self.rows_migrated = stats.rows;
        self.pages = stats.pages;
        self.attribute_rows = stats.attribute_rows;
        self.derivation = stats.derivation;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the document as failed.
    pub fn mark_failed(&mut self, error: &str) -> Result<()> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.to_string());
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}
