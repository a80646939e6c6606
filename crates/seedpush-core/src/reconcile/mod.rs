//! Periodic reconciliation against the download daemon.
//!
//! Each pass:
//! 1. collects the tracked ids,
//! 2. asks the daemon for their live status (outside the registry lock),
//! 3. swaps in a rebuilt map holding only jobs the daemon still reports,
//! 4. sends a completion notice for every finished job that is owed one and
//!    evicts it once the notice went out (or immediately when none is owed).
//!
//! A failed notice keeps the job in place and is retried on the next tick.

mod policy;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::daemon::{DaemonError, JobDaemon};
use crate::push::{Notification, PushError, PushSender};
use crate::registry::{JobId, JobRecord, LoadOutcome, PushTarget, Registry};

pub use policy::{RetryDecision, RetryPolicy};

/// Failed-delivery bookkeeping for one job, tied to the record revision it
/// was recorded against.
#[derive(Debug, Clone, Copy)]
struct PendingNotice {
    revision: u64,
    failures: u32,
    not_before: Instant,
}

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records tracked after the pass.
    pub tracked: usize,
    /// Records dropped because the daemon no longer reports them.
    pub dropped: usize,
    /// Finished records seen by the completion scan.
    pub completed: usize,
    /// Notices delivered.
    pub notified: usize,
    /// Delivery attempts that failed.
    pub failed: usize,
    /// Notices skipped this tick because of backoff.
    pub deferred: usize,
    /// Records evicted by completion handling.
    pub evicted: usize,
}

pub struct Reconciler {
    registry: Arc<Registry>,
    daemon: Arc<dyn JobDaemon>,
    push: Arc<dyn PushSender>,
    base_uri: String,
    policy: RetryPolicy,
    /// Also serializes passes: whoever holds it is the pass in flight.
    pending: Mutex<HashMap<JobId, PendingNotice>>,
}

impl Reconciler {
    pub fn new(
        registry: Arc<Registry>,
        daemon: Arc<dyn JobDaemon>,
        push: Arc<dyn PushSender>,
        base_uri: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            daemon,
            push,
            base_uri: base_uri.into(),
            policy: RetryPolicy::default(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Restore the registry from a snapshot file and immediately run one pass
    /// so restored records get their status. A daemon failure here is returned.
    pub async fn restore(&self, path: &Path) -> anyhow::Result<LoadOutcome> {
        let outcome = self.registry.load_from_path(path)?;
        if let LoadOutcome::Restored(count) = outcome {
            tracing::info!(count, "restored jobs from {}", path.display());
            let report = self
                .run_pass()
                .await
                .context("initial sync after loading jobs")?;
            if report.dropped > 0 {
                tracing::info!(dropped = report.dropped, "restored jobs unknown to the daemon were dropped");
            }
        }
        Ok(outcome)
    }

    /// Run one pass, waiting for any pass already in flight.
    pub async fn run_pass(&self) -> Result<TickReport, DaemonError> {
        let mut pending = self.pending.lock().await;
        self.pass(&mut pending).await
    }

    /// Timer entry point. Skips when a pass is already in flight; a daemon
    /// failure is logged and leaves the registry untouched.
    pub async fn tick(&self) -> Option<TickReport> {
        let Ok(mut pending) = self.pending.try_lock() else {
            tracing::debug!("previous reconciliation still running; skipping tick");
            return None;
        };
        match self.pass(&mut pending).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!("failed to sync jobs: {}", e);
                None
            }
        }
    }

    /// Run `tick` every `interval` until the process exits.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                timer.tick().await;
                if let Some(report) = self.tick().await {
                    if report.dropped > 0 || report.completed > 0 {
                        tracing::debug!(?report, "reconciliation tick");
                    }
                }
            }
        })
    }

    async fn pass(&self, pending: &mut HashMap<JobId, PendingNotice>) -> Result<TickReport, DaemonError> {
        let mut report = TickReport::default();

        let ids = self.registry.ids();
        let live = self.daemon.query_live_status(&ids).await?;
        let dropped = self.registry.apply_live_status(&ids, live);
        for id in &dropped {
            tracing::info!(job = %id, "job no longer reported by daemon; dropped");
            pending.remove(id);
        }
        report.dropped = dropped.len();

        for record in self.registry.completed() {
            report.completed += 1;
            tracing::info!(job = %record.id, "Finished downloading {}", record.display_name());

            // A resubmitted job starts over with no failures or backoff.
            if pending
                .get(&record.id)
                .is_some_and(|p| p.revision != record.revision())
            {
                pending.remove(&record.id);
            }

            let Some(target) = record.notify_target.as_ref() else {
                self.evict(&record.id, pending, &mut report);
                continue;
            };

            if pending
                .get(&record.id)
                .is_some_and(|p| Instant::now() < p.not_before)
            {
                report.deferred += 1;
                continue;
            }

            match self.deliver(&record, target).await {
                Ok(()) => {
                    report.notified += 1;
                    self.evict(&record.id, pending, &mut report);
                }
                Err(e) => {
                    report.failed += 1;
                    let failures = pending.get(&record.id).map_or(0, |p| p.failures) + 1;
                    match self.policy.decide(failures) {
                        RetryDecision::RetryAfter(delay) => {
                            tracing::warn!(job = %record.id, failures, "failed to send notification: {}", e);
                            pending.insert(
                                record.id.clone(),
                                PendingNotice {
                                    revision: record.revision(),
                                    failures,
                                    not_before: Instant::now() + delay,
                                },
                            );
                        }
                        RetryDecision::GiveUp => {
                            tracing::warn!(job = %record.id, failures, "giving up on notification: {}", e);
                            self.evict(&record.id, pending, &mut report);
                        }
                    }
                }
            }
        }

        report.tracked = self.registry.count();
        Ok(report)
    }

    async fn deliver(&self, record: &JobRecord, target: &PushTarget) -> Result<(), PushError> {
        let payload = Notification::job_finished(record.display_name(), &self.base_uri).to_bytes()?;
        self.push.send(target, &payload).await
    }

    fn evict(&self, id: &str, pending: &mut HashMap<JobId, PendingNotice>, report: &mut TickReport) {
        pending.remove(id);
        if self.registry.remove(id).is_some() {
            report.evicted += 1;
        }
    }
}
