//! Transmission JSON RPC client.
//!
//! Uses the curl crate (libcurl) for the HTTP POSTs. Each call runs on the
//! blocking pool so the async callers (reconciler, HTTP handlers) never stall
//! a runtime worker.

use std::collections::HashMap;
use std::str;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::RpcConfig;
use crate::registry::{JobId, JobStatus};

use super::error::DaemonError;
use super::rpc::{
    session_id_from_headers, RpcRequest, RpcResponse, SessionGetArgs, TorrentAddArgs,
    TorrentGetArgs, SESSION_HEADER, TORRENT_FIELDS,
};
use super::{DaemonVersion, JobDaemon, JobSource};

/// Cheap to clone; clones share the session id.
#[derive(Clone)]
pub struct TransmissionClient {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: String,
    user: Option<String>,
    pass: Option<String>,
    timeout: Duration,
    session_id: Mutex<Option<String>>,
}

struct RawResponse {
    code: u32,
    headers: Vec<String>,
    body: Vec<u8>,
}

impl TransmissionClient {
    pub fn new(cfg: &RpcConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint: cfg.endpoint(),
                user: cfg.user.clone().filter(|u| !u.is_empty()),
                pass: cfg.pass.clone(),
                timeout: Duration::from_secs(cfg.timeout_secs.max(1)),
                session_id: Mutex::new(None),
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    async fn call<R>(&self, method: &'static str, arguments: serde_json::Value) -> Result<R, DaemonError>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.call_blocking(method, arguments))
            .await
            .map_err(|e| DaemonError::Task(e.to_string()))?
    }
}

impl Inner {
    fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_session_id(&self, id: String) {
        *self.session_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);
    }

    /// POST one RPC call. A 409 carries a fresh session id; store it and retry once.
    fn call_blocking<R: DeserializeOwned>(
        &self,
        method: &str,
        arguments: serde_json::Value,
    ) -> Result<R, DaemonError> {
        let body = serde_json::to_vec(&RpcRequest { method, arguments })?;

        for _ in 0..2 {
            let resp = self.post(&body)?;
            if resp.code == 409 {
                let id = session_id_from_headers(&resp.headers).ok_or_else(|| {
                    DaemonError::Protocol(format!("409 without {SESSION_HEADER}"))
                })?;
                tracing::debug!(method, "daemon issued a new session id");
                self.set_session_id(id);
                continue;
            }
            if !(200..300).contains(&resp.code) {
                return Err(DaemonError::Http(resp.code));
            }

            let parsed: RpcResponse<R> = serde_json::from_slice(&resp.body)?;
            if parsed.result != "success" {
                return Err(DaemonError::Rpc {
                    method: method.to_string(),
                    result: parsed.result,
                });
            }
            return parsed
                .arguments
                .ok_or_else(|| DaemonError::Protocol(format!("{method}: response has no arguments")));
        }

        Err(DaemonError::Protocol(format!(
            "{method}: session id handshake did not settle"
        )))
    }

    fn post(&self, body: &[u8]) -> Result<RawResponse, DaemonError> {
        let mut headers: Vec<String> = Vec::new();
        let mut data: Vec<u8> = Vec::new();

        let mut easy = curl::easy::Easy::new();
        easy.url(&self.endpoint)?;
        easy.post(true)?;
        easy.post_fields_copy(body)?;
        easy.connect_timeout(Duration::from_secs(10).min(self.timeout))?;
        easy.timeout(self.timeout)?;
        if let Some(user) = &self.user {
            easy.username(user)?;
            easy.password(self.pass.as_deref().unwrap_or(""))?;
        }

        let mut list = curl::easy::List::new();
        list.append("Content-Type: application/json")?;
        if let Some(id) = self.session_id() {
            list.append(&format!("{SESSION_HEADER}: {id}"))?;
        }
        easy.http_headers(list)?;

        {
            let mut transfer = easy.transfer();
            transfer.header_function(|line| {
                if let Ok(s) = str::from_utf8(line) {
                    headers.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|chunk| {
                data.extend_from_slice(chunk);
                Ok(chunk.len())
            })?;
            transfer.perform()?;
        }

        let code = easy.response_code()?;
        Ok(RawResponse {
            code,
            headers,
            body: data,
        })
    }
}

#[async_trait]
impl JobDaemon for TransmissionClient {
    async fn query_live_status(&self, ids: &[JobId]) -> Result<HashMap<JobId, JobStatus>, DaemonError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let args: TorrentGetArgs = self
            .call("torrent-get", json!({ "ids": ids, "fields": TORRENT_FIELDS }))
            .await?;

        let mut live = HashMap::with_capacity(args.torrents.len());
        for torrent in args.torrents {
            match torrent.into_status() {
                Some((id, status)) => {
                    live.insert(id, status);
                }
                None => tracing::debug!("skipping torrent without hashString"),
            }
        }
        Ok(live)
    }

    async fn submit(&self, source: JobSource) -> Result<JobStatus, DaemonError> {
        let arguments = match source {
            JobSource::Magnet(link) => json!({ "filename": link }),
            JobSource::MetaInfo(bytes) => json!({ "metainfo": STANDARD.encode(bytes) }),
        };
        let args: TorrentAddArgs = self.call("torrent-add", arguments).await?;
        let torrent = args
            .added
            .or(args.duplicate)
            .ok_or_else(|| DaemonError::Protocol("torrent-add: no torrent in response".to_string()))?;
        torrent
            .into_status()
            .map(|(_, status)| status)
            .ok_or_else(|| DaemonError::Protocol("torrent-add: response has no hashString".to_string()))
    }

    async fn version(&self) -> Result<DaemonVersion, DaemonError> {
        let args: SessionGetArgs = self
            .call("session-get", json!({ "fields": ["version", "rpc-version"] }))
            .await?;
        Ok(args.into())
    }
}
