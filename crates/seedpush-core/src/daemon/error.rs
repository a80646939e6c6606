//! Daemon RPC error type.

/// Failure talking to the download daemon. All variants are transient from
/// the reconciler's point of view.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Curl reported an error (connect, timeout, TLS, ...).
    #[error("transport: {0}")]
    Transport(#[from] curl::Error),
    /// Endpoint answered with a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// The RPC `result` field was not "success".
    #[error("{method}: {result}")]
    Rpc { method: String, result: String },
    #[error("decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("protocol: {0}")]
    Protocol(String),
    /// The blocking worker running the request went away.
    #[error("rpc task: {0}")]
    Task(String),
}
