//! Progress reporters.
//!
//! Reporters are observational only. The orchestrator drives them per
//! document ([`ProgressMode::Document`]) or per row ([`ProgressMode::Row`]).

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::core::ProgressReporter;

/// Granularity at which progress is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressMode {
    /// One step per source document.
    #[default]
    Document,
    /// One step per source row, restarted for each document.
    Row,
}

/// Reporter that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&self, _total: u64) {}
    fn advance(&self) {}
    fn finish(&self) {}
}

/// Reporter that logs through `tracing` every `every` steps.
#[derive(Debug)]
pub struct LogProgress {
    every: u64,
    total: AtomicU64,
    position: AtomicU64,
    started: std::sync::Mutex<Option<Instant>>,
}

impl LogProgress {
    /// Create a reporter that logs every `every` steps (minimum 1).
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            total: AtomicU64::new(0),
            position: AtomicU64::new(0),
            started: std::sync::Mutex::new(None),
        }
    }

    /// Steps completed since the last `start`.
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn elapsed_secs(&self) -> f64 {
        let started = self
            .started
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        started.map_or(0.0, |s| s.elapsed().as_secs_f64())
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl ProgressReporter for LogProgress {
    fn start(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.position.store(0, Ordering::Relaxed);
        *self
            .started
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Instant::now());
    }

    fn advance(&self) {
        let position = self.position.fetch_add(1, Ordering::Relaxed) + 1;
        if position % self.every == 0 {
            info!(
                "Progress: {}/{}",
                position,
                self.total.load(Ordering::Relaxed)
            );
        }
    }

    fn finish(&self) {
        info!(
            "Progress: {}/{} done in {:.1}s",
            self.position(),
            self.total.load(Ordering::Relaxed),
            self.elapsed_secs()
        );
    }
}

#[derive(Serialize)]
struct ProgressEvent {
    event: &'static str,
    position: u64,
    total: u64,
}

/// Reporter that writes JSON lines to stderr.
#[derive(Debug, Default)]
pub struct JsonProgress {
    total: AtomicU64,
    position: AtomicU64,
}

impl JsonProgress {
    /// Create a JSON-lines reporter.
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, event: &'static str) {
        let line = ProgressEvent {
            event,
            position: self.position.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
        };
        if let Ok(json) = serde_json::to_string(&line) {
            let _ = writeln!(std::io::stderr().lock(), "{}", json);
        }
    }
}

impl ProgressReporter for JsonProgress {
    fn start(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.position.store(0, Ordering::Relaxed);
        self.emit("start");
    }

    fn advance(&self) {
        self.position.fetch_add(1, Ordering::Relaxed);
        self.emit("advance");
    }

    fn finish(&self) {
        self.emit("finish");
    }
}
