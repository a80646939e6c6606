//! Persist the registry to disk (JSON array) so tracked jobs survive a restart.
//!
//! Only `id`, `session` and `notifyTarget` are written; live status is
//! re-fetched from the daemon after loading.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::record::{JobRecord, PushTarget};
use super::store::Registry;

/// On-disk form of one tracked job. `hash` / `push` are accepted for older files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedJob {
    #[serde(alias = "hash")]
    pub id: String,
    pub session: String,
    #[serde(
        rename = "notifyTarget",
        alias = "push",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub notify_target: Option<PushTarget>,
}

impl PersistedJob {
    fn from_record(record: JobRecord) -> Self {
        let id = record
            .status
            .and_then(|s| s.daemon_id)
            .unwrap_or(record.id);
        Self {
            id,
            session: record.session,
            notify_target: record.notify_target,
        }
    }

    fn into_record(self) -> JobRecord {
        JobRecord::new(self.id, self.session, self.notify_target)
    }
}

/// What `load_from_path` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No snapshot file; the registry starts empty.
    Missing,
    /// Number of records restored.
    Restored(usize),
}

/// Read a snapshot file. A missing file is `Ok(None)`; anything else that goes
/// wrong is an error.
pub fn read_snapshot(path: &Path) -> Result<Option<Vec<PersistedJob>>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read job snapshot: {}", path.display())),
    };
    let jobs: Vec<PersistedJob> = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse job snapshot: {}", path.display()))?;
    Ok(Some(jobs))
}

/// Write a snapshot file, truncating previous contents (creates parent dir if needed).
pub fn write_snapshot(path: &Path, jobs: &[PersistedJob]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(jobs).context("serialize job snapshot")?;
    std::fs::write(path, json)
        .with_context(|| format!("write job snapshot: {}", path.display()))?;
    Ok(())
}

impl Registry {
    /// Save every tracked job to `path`. Returns the number of records written.
    pub fn save_to_path(&self, path: &Path) -> Result<usize> {
        let jobs: Vec<PersistedJob> = self
            .snapshot()
            .into_iter()
            .map(PersistedJob::from_record)
            .collect();
        write_snapshot(path, &jobs)?;
        Ok(jobs.len())
    }

    /// Add every job found in the snapshot at `path`. Restored records have no
    /// status until the next reconciliation pass.
    pub fn load_from_path(&self, path: &Path) -> Result<LoadOutcome> {
        let Some(jobs) = read_snapshot(path)? else {
            return Ok(LoadOutcome::Missing);
        };
        let restored = jobs.len();
        for job in jobs {
            self.add(job.into_record());
        }
        Ok(LoadOutcome::Restored(restored))
    }
}
