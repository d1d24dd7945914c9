//! Resume point persisted between runs: `{next_page, dedup, updated_at}` as JSON.
//!
//! Recovery is by re-running: load the checkpoint, start at `next_page` with
//! `dedup` as the seed, and failed items from earlier pages are retried by
//! starting lower.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ImportError, Result};
use crate::orchestrator::RunOutcome;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub next_page: u32,
    /// Sorted so the file diffs cleanly between runs.
    pub dedup: BTreeSet<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        Self {
            next_page: outcome.next_page,
            dedup: outcome.dedup.iter().cloned().collect(),
            updated_at: Some(Utc::now()),
        }
    }

    pub fn seed(&self) -> HashSet<String> {
        self.dedup.iter().cloned().collect()
    }

    /// `Ok(None)` when no checkpoint has been written yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)
            .map_err(|e| ImportError::Checkpoint(format!("read {}: {e}", path.display())))?;
        let checkpoint = serde_json::from_str(&json)
            .map_err(|e| ImportError::Checkpoint(format!("parse {}: {e}", path.display())))?;
        Ok(Some(checkpoint))
    }

    /// Write via a temp file and rename so a crash never leaves half a checkpoint.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| ImportError::Checkpoint(format!("create {}: {e}", dir.display())))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ImportError::Checkpoint(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| ImportError::Checkpoint(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| ImportError::Checkpoint(format!("rename to {}: {e}", path.display())))?;

        info!(
            path = %path.display(),
            next_page = self.next_page,
            known = self.dedup.len(),
            "Saved import checkpoint"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImportStats, RunState};

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Checkpoint::load(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn save_then_load_restores_resume_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("checkpoint.json");

        let outcome = RunOutcome {
            state: RunState::Cancelled,
            stats: ImportStats::default(),
            dedup: ["11-1111111".to_string(), "22-2222222".to_string()]
                .into_iter()
                .collect(),
            next_page: 4,
            log: Vec::new(),
        };
        Checkpoint::from_outcome(&outcome).save(&path).unwrap();

        let loaded = Checkpoint::load(&path).unwrap().unwrap();
        assert_eq!(loaded.next_page, 4);
        assert_eq!(loaded.seed(), outcome.dedup);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_a_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Checkpoint::load(&path),
            Err(ImportError::Checkpoint(_))
        ));
    }
}
