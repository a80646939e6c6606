//! JSON HTTP surface: job submission and listing per browser session.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;

use seedpush_core::daemon::{JobDaemon, JobSource};
use seedpush_core::registry::{JobRecord, JobStatus, PushTarget, Registry};
use seedpush_core::session;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub daemon: Arc<dyn JobDaemon>,
    pub vapid_public_key: Arc<str>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/jobs", get(list_jobs).post(submit_jobs))
        .route("/api/vapid", get(vapid_key))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

/// Caller's session id, and the cookie to set when a new one was issued.
struct Session {
    id: String,
    issued: bool,
}

impl Session {
    fn from_headers(headers: &HeaderMap) -> Self {
        let existing = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(session::from_cookie_header);
        match existing {
            Some(id) => Self {
                id: id.to_string(),
                issued: false,
            },
            None => Self {
                id: session::new_session_id(),
                issued: true,
            },
        }
    }

    fn respond(&self, status: StatusCode, body: serde_json::Value) -> Response {
        let mut resp = (status, Json(body)).into_response();
        if self.issued {
            if let Ok(cookie) = HeaderValue::from_str(&session::set_cookie_value(&self.id)) {
                resp.headers_mut().insert(SET_COOKIE, cookie);
            }
        }
        resp
    }

    fn error(&self, status: StatusCode, message: impl std::fmt::Display) -> Response {
        self.respond(status, json!({ "error": message.to_string() }))
    }
}

/// What a browser sees of a job.
#[derive(Debug, Serialize)]
struct JobView<'a> {
    id: &'a str,
    name: &'a str,
    status: Option<&'a JobStatus>,
}

fn jobs_json(registry: &Registry, session: &str) -> serde_json::Value {
    let mut records = registry.filter_by_session(session);
    records.sort_by(|a, b| a.id.cmp(&b.id));
    let views: Vec<JobView> = records
        .iter()
        .map(|r| JobView {
            id: &r.id,
            name: r.display_name(),
            status: r.status.as_ref(),
        })
        .collect();
    json!({ "jobs": views })
}

async fn list_jobs(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = Session::from_headers(&headers);
    session.respond(StatusCode::OK, jobs_json(&state.registry, &session.id))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Magnets {
    One(String),
    Many(Vec<String>),
}

impl Magnets {
    /// Every non-blank line of every entry.
    fn links(&self) -> Vec<String> {
        let entries: Vec<&str> = match self {
            Magnets::One(s) => vec![s.as_str()],
            Magnets::Many(list) => list.iter().map(String::as_str).collect(),
        };
        entries
            .into_iter()
            .flat_map(str::lines)
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    #[serde(default)]
    magnets: Option<Magnets>,
    /// Base64 (standard alphabet) `.torrent` files.
    #[serde(default)]
    torrents: Vec<String>,
    #[serde(default)]
    subscription: Option<PushTarget>,
}

impl SubmitRequest {
    fn sources(&self) -> Result<Vec<JobSource>, String> {
        let mut sources: Vec<JobSource> = self
            .magnets
            .as_ref()
            .map(|m| m.links().into_iter().map(JobSource::Magnet).collect())
            .unwrap_or_default();
        for (i, encoded) in self.torrents.iter().enumerate() {
            let bytes = STANDARD
                .decode(encoded.trim())
                .map_err(|e| format!("torrent {i}: {e}"))?;
            sources.push(JobSource::MetaInfo(bytes));
        }
        Ok(sources)
    }
}

async fn submit_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let session = Session::from_headers(&headers);
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return session.error(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let sources = match request.sources() {
        Ok(s) if s.is_empty() => {
            return session.error(StatusCode::BAD_REQUEST, "no magnets or torrents given")
        }
        Ok(s) => s,
        Err(e) => return session.error(StatusCode::BAD_REQUEST, e),
    };

    for source in sources {
        let status = match state.daemon.submit(source).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(session = %session.id, "failed to add torrent: {}", e);
                return session.error(StatusCode::BAD_GATEWAY, e);
            }
        };
        let Some(id) = status.daemon_id.clone() else {
            return session.error(StatusCode::BAD_GATEWAY, "daemon returned no job id");
        };
        state.registry.add(
            JobRecord::new(id, session.id.clone(), request.subscription.clone()).with_status(status),
        );
    }

    session.respond(StatusCode::OK, jobs_json(&state.registry, &session.id))
}

async fn vapid_key(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "publicKey": &*state.vapid_public_key }))
}

#[cfg(test)]
mod tests;
