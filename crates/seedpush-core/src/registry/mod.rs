//! Session-partitioned job registry.
//!
//! Holds every job this process tracks, keyed by the daemon's info-hash:
//! - who submitted it (the browser session)
//! - where to push a completion notice, if anywhere
//! - the live status from the most recent reconciliation pass
//!
//! The registry is created once at startup and shared (as `Arc<Registry>`)
//! between the HTTP handlers and the reconciler.

mod persist;
mod record;
mod store;

pub use persist::{read_snapshot, write_snapshot, LoadOutcome, PersistedJob};
pub use record::{JobId, JobRecord, JobStatus, PushKeys, PushTarget, TorrentState};
pub use store::Registry;
