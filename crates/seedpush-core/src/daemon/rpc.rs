//! Transmission RPC wire types and their mapping onto [`JobStatus`].

use serde::{Deserialize, Serialize};

use crate::registry::{JobStatus, TorrentState};

use super::DaemonVersion;

/// Header carrying the CSRF token Transmission hands out with a 409.
pub(super) const SESSION_HEADER: &str = "X-Transmission-Session-Id";

/// Fields requested by `torrent-get`.
pub(super) const TORRENT_FIELDS: &[&str] = &[
    "id",
    "name",
    "hashString",
    "percentDone",
    "status",
    "totalSize",
    "rateDownload",
    "eta",
    "errorString",
];

#[derive(Debug, Serialize)]
pub(super) struct RpcRequest<'a> {
    pub method: &'a str,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(super) struct RpcResponse<A> {
    pub result: String,
    pub arguments: Option<A>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RpcTorrent {
    pub hash_string: Option<String>,
    pub name: Option<String>,
    pub percent_done: Option<f64>,
    pub status: Option<i64>,
    pub total_size: Option<u64>,
    pub rate_download: Option<u64>,
    pub eta: Option<i64>,
    pub error_string: Option<String>,
}

impl RpcTorrent {
    /// Validate and convert. Entries without a hash cannot be keyed and are rejected.
    pub fn into_status(self) -> Option<(String, JobStatus)> {
        let hash = self.hash_string.filter(|h| !h.is_empty())?;
        let status = JobStatus {
            daemon_id: Some(hash.clone()),
            name: self.name,
            percent_done: self.percent_done.map(|p| p.clamp(0.0, 1.0)),
            state: self.status.and_then(TorrentState::from_code),
            total_size: self.total_size,
            rate_download: self.rate_download,
            // -1 = not available, -2 = unknown
            eta_secs: self.eta.filter(|e| *e >= 0),
            error_string: self.error_string.filter(|e| !e.is_empty()),
        };
        Some((hash, status))
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TorrentGetArgs {
    #[serde(default)]
    pub torrents: Vec<RpcTorrent>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TorrentAddArgs {
    #[serde(rename = "torrent-added")]
    pub added: Option<RpcTorrent>,
    #[serde(rename = "torrent-duplicate")]
    pub duplicate: Option<RpcTorrent>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SessionGetArgs {
    #[serde(rename = "rpc-version")]
    pub rpc_version: u32,
    #[serde(default)]
    pub version: String,
}

impl From<SessionGetArgs> for DaemonVersion {
    fn from(args: SessionGetArgs) -> Self {
        Self {
            rpc_version: args.rpc_version,
            version: args.version,
        }
    }
}

/// Find the session id in collected response header lines.
pub(super) fn session_id_from_headers(lines: &[String]) -> Option<String> {
    lines.iter().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case(SESSION_HEADER) {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}
