//! Run progress: bounded log plus counters, published as value snapshots.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::types::ImportStats;

pub const DEFAULT_LOG_CAPACITY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportLogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl std::fmt::Display for ImportLogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Immutable copy of run progress. Log is ordered oldest to newest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub stats: ImportStats,
    pub log: Vec<ImportLogEntry>,
}

/// Owned by the run loop. Readers only ever see [`ProgressSnapshot`]s.
pub struct ProgressReporter {
    capacity: usize,
    entries: VecDeque<ImportLogEntry>,
    stats: ImportStats,
}

impl ProgressReporter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            stats: ImportStats::default(),
        }
    }

    /// Push an entry, dropping the oldest once full.
    pub fn append(&mut self, entry: ImportLogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.push(LogLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.push(LogLevel::Error, message);
    }

    fn push(&mut self, level: LogLevel, message: String) {
        self.append(ImportLogEntry {
            at: Utc::now(),
            level,
            message,
        });
    }

    pub fn record_imported(&mut self) {
        self.stats.imported += 1;
    }

    pub fn record_skipped(&mut self) {
        self.stats.skipped += 1;
    }

    pub fn record_failed(&mut self) {
        self.stats.failed += 1;
    }

    pub fn record_page(&mut self) {
        self.stats.pages_processed += 1;
    }

    pub fn stats(&self) -> ImportStats {
        self.stats
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            stats: self.stats,
            log: self.entries.iter().cloned().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

/// Receives a snapshot at every item and page boundary of a run.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync,
{
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self(snapshot)
    }
}

impl ProgressObserver for watch::Sender<ProgressSnapshot> {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.send_replace(snapshot.clone());
    }
}

pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}
}
