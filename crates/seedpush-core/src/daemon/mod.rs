//! Download daemon collaborator.
//!
//! The reconciler and the HTTP layer only see the [`JobDaemon`] trait; the
//! concrete [`TransmissionClient`] speaks Transmission's JSON RPC over curl.

mod client;
mod error;
mod rpc;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::registry::{JobId, JobStatus};

pub use client::TransmissionClient;
pub use error::DaemonError;

/// Something the daemon can start downloading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    /// Magnet link (or any URL the daemon can fetch a .torrent from).
    Magnet(String),
    /// Raw contents of a .torrent file.
    MetaInfo(Vec<u8>),
}

/// Daemon identity returned by the startup reachability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonVersion {
    pub rpc_version: u32,
    pub version: String,
}

/// Operations the core needs from the download daemon.
#[async_trait]
pub trait JobDaemon: Send + Sync {
    /// Live status for exactly `ids`, keyed by the daemon's id. Ids the daemon
    /// no longer knows are simply absent from the result.
    async fn query_live_status(&self, ids: &[JobId]) -> Result<HashMap<JobId, JobStatus>, DaemonError>;

    /// Hand a new job to the daemon. Returns the daemon-assigned identity
    /// (an already-known job comes back as itself).
    async fn submit(&self, source: JobSource) -> Result<JobStatus, DaemonError>;

    async fn version(&self) -> Result<DaemonVersion, DaemonError>;
}
