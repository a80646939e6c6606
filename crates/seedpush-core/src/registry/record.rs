//! Job record and live status types.

use serde::{Deserialize, Serialize};

/// Job identifier: the info-hash the daemon reports as `hashString`.
pub type JobId = String;

/// Web Push subscription supplied by a submitter who opted into completion alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTarget {
    pub endpoint: String,
    pub keys: PushKeys,
}

/// Client keys of a push subscription (base64url, as the browser hands them out).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Daemon-side torrent state, mapped from Transmission's numeric status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    Stopped,
    CheckWait,
    Checking,
    DownloadWait,
    Downloading,
    SeedWait,
    Seeding,
}

impl TorrentState {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(TorrentState::Stopped),
            1 => Some(TorrentState::CheckWait),
            2 => Some(TorrentState::Checking),
            3 => Some(TorrentState::DownloadWait),
            4 => Some(TorrentState::Downloading),
            5 => Some(TorrentState::SeedWait),
            6 => Some(TorrentState::Seeding),
            _ => None,
        }
    }
}

/// Live status of one job as last reported by the daemon.
///
/// Always replaced wholesale by the reconciler; never patched field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Authoritative id reported by the daemon.
    pub daemon_id: Option<String>,
    pub name: Option<String>,
    /// Completion fraction in [0.0, 1.0].
    pub percent_done: Option<f64>,
    pub state: Option<TorrentState>,
    pub total_size: Option<u64>,
    /// Download rate in bytes per second.
    pub rate_download: Option<u64>,
    /// Seconds remaining; `None` when the daemon does not know.
    pub eta_secs: Option<i64>,
    pub error_string: Option<String>,
}

impl JobStatus {
    pub fn is_complete(&self) -> bool {
        self.percent_done.is_some_and(|p| p >= 1.0)
    }
}

/// One tracked download job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub session: String,
    pub notify_target: Option<PushTarget>,
    pub status: Option<JobStatus>,
    /// Set by [`Registry::add`](super::Registry::add); changes whenever the record is (re)submitted.
    #[serde(skip)]
    pub(crate) revision: u64,
}

impl JobRecord {
    /// A record without live status, as restored from a snapshot.
    pub fn new(id: impl Into<JobId>, session: impl Into<String>, notify_target: Option<PushTarget>) -> Self {
        Self {
            id: id.into(),
            session: session.into(),
            notify_target,
            status: None,
            revision: 0,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Human name for logs and notifications; falls back to the id.
    pub fn display_name(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.name.as_deref())
            .unwrap_or(&self.id)
    }

    pub fn is_complete(&self) -> bool {
        self.status.as_ref().is_some_and(JobStatus::is_complete)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}
