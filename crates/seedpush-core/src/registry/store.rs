//! In-memory job registry guarded by a single mutex.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::record::{JobId, JobRecord, JobStatus};

/// Shared map of job id -> record.
///
/// Every operation takes the lock once, copies what it needs and releases it;
/// callers never see a half-applied change and never hold the lock across I/O.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Mutex<HashMap<JobId, JobRecord>>,
    revisions: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<JobId, JobRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite a record. When the record carries a status with the
    /// daemon's id, that id becomes the key. Each call stamps a fresh revision,
    /// so an overwrite is distinguishable from the record it replaced.
    pub fn add(&self, mut record: JobRecord) {
        if let Some(daemon_id) = record.status.as_ref().and_then(|s| s.daemon_id.clone()) {
            record.id = daemon_id;
        }
        record.revision = self.revisions.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(job = %record.id, session = %record.session, "added job {}", record.display_name());
        self.entries().insert(record.id.clone(), record);
    }

    /// Copies of all records submitted by `session`, in no particular order.
    pub fn filter_by_session(&self, session: &str) -> Vec<JobRecord> {
        self.entries()
            .values()
            .filter(|r| r.session == session)
            .cloned()
            .collect()
    }

    /// Swap in a whole new map. Records missing from `records` are gone afterwards.
    /// The reconciler uses [`Registry::apply_live_status`], which builds the new
    /// map from a daemon query under the lock and swaps it in the same way.
    pub fn replace_all(&self, records: HashMap<JobId, JobRecord>) {
        let next = normalize_keys(records);
        *self.entries() = next;
    }

    pub fn remove(&self, id: &str) -> Option<JobRecord> {
        self.entries().remove(id)
    }

    /// Copies of every record, for persistence. Does not depend on status.
    pub fn snapshot(&self) -> Vec<JobRecord> {
        self.entries().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.entries().len()
    }

    pub fn ids(&self) -> Vec<JobId> {
        self.entries().keys().cloned().collect()
    }

    /// Rebuild the map from a daemon query over `queried` and swap it in.
    ///
    /// Every queried id the daemon reported gets its fresh status; every queried
    /// id it did not report is dropped. Ids added after the query was issued
    /// (not in `queried`) are carried over unchanged. Returns the dropped ids.
    pub fn apply_live_status(
        &self,
        queried: &[JobId],
        mut statuses: HashMap<JobId, JobStatus>,
    ) -> Vec<JobId> {
        let queried: HashSet<&str> = queried.iter().map(String::as_str).collect();
        let mut entries = self.entries();
        let mut next = HashMap::with_capacity(entries.len());
        let mut dropped = Vec::new();

        for (id, mut record) in entries.drain() {
            if !queried.contains(id.as_str()) {
                next.insert(id, record);
                continue;
            }
            match statuses.remove(&id) {
                Some(status) => {
                    record.status = Some(status);
                    next.insert(id, record);
                }
                None => dropped.push(id),
            }
        }

        *entries = next;
        dropped
    }

    /// Copies of records whose last status reports completion.
    pub fn completed(&self) -> Vec<JobRecord> {
        self.entries()
            .values()
            .filter(|r| r.is_complete())
            .cloned()
            .collect()
    }
}

fn normalize_keys(records: HashMap<JobId, JobRecord>) -> HashMap<JobId, JobRecord> {
    records
        .into_iter()
        .map(|(id, mut record)| {
            record.id = id.clone();
            (id, record)
        })
        .collect()
}
