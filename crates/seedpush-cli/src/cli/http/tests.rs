//! Handler tests through the router with `tower::ServiceExt::oneshot`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use seedpush_core::daemon::{DaemonError, DaemonVersion, JobDaemon, JobSource};
use seedpush_core::registry::{JobId, JobRecord, JobStatus, Registry};

use super::{router, AppState};

#[derive(Default)]
struct FakeDaemon {
    submitted: Mutex<Vec<JobSource>>,
    fail: AtomicBool,
}

#[async_trait]
impl JobDaemon for FakeDaemon {
    async fn query_live_status(&self, _ids: &[JobId]) -> Result<HashMap<JobId, JobStatus>, DaemonError> {
        Ok(HashMap::new())
    }

    async fn submit(&self, source: JobSource) -> Result<JobStatus, DaemonError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DaemonError::Http(503));
        }
        let id = match &source {
            JobSource::Magnet(link) => link
                .rsplit("btih:")
                .next()
                .unwrap_or(link.as_str())
                .to_string(),
            JobSource::MetaInfo(bytes) => format!("meta{}", bytes.len()),
        };
        self.submitted.lock().unwrap().push(source);
        Ok(JobStatus {
            daemon_id: Some(id.clone()),
            name: Some(format!("{id}.iso")),
            percent_done: Some(0.0),
            ..Default::default()
        })
    }

    async fn version(&self) -> Result<DaemonVersion, DaemonError> {
        Ok(DaemonVersion {
            rpc_version: 17,
            version: "4.0.5".to_string(),
        })
    }
}

fn app() -> (Router, Arc<Registry>, Arc<FakeDaemon>) {
    let registry = Arc::new(Registry::new());
    let daemon = Arc::new(FakeDaemon::default());
    let app = router(AppState {
        registry: Arc::clone(&registry),
        daemon: daemon.clone(),
        vapid_public_key: "BPublicKey".into(),
    });
    (app, registry, daemon)
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut req = Request::builder().method("GET").uri(uri);
    if let Some(c) = cookie {
        req = req.header(COOKIE, c);
    }
    req.body(Body::empty()).unwrap()
}

fn post_jobs(body: Value, cookie: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/jobs")
        .header(CONTENT_TYPE, "application/json")
        .header(COOKIE, cookie)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn new_visitor_gets_a_session_cookie() {
    let (app, _, _) = app();
    let resp = app.oneshot(get("/api/jobs", None)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp.headers()[SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("session="), "{cookie}");
    assert!(cookie.contains("Max-Age=31536000"));
    assert_eq!(json_body(resp).await, json!({ "jobs": [] }));
}

#[tokio::test]
async fn list_shows_only_the_callers_jobs() {
    let (app, registry, _) = app();
    registry.add(JobRecord::new("a1", "mine", None));
    registry.add(JobRecord::new("b2", "theirs", None));

    let resp = app
        .oneshot(get("/api/jobs", Some("session=mine")))
        .await
        .unwrap();

    assert!(resp.headers().get(SET_COOKIE).is_none());
    let body = json_body(resp).await;
    let jobs = body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], "a1");
    assert_eq!(jobs[0]["name"], "a1");
}

#[tokio::test]
async fn submit_magnets_splits_lines_and_keeps_subscription() {
    let (app, registry, daemon) = app();
    let body = json!({
        "magnets": "magnet:?xt=urn:btih:aaa\n\n  \nmagnet:?xt=urn:btih:bbb\n",
        "subscription": {
            "endpoint": "https://push.example/sub/9",
            "keys": { "p256dh": "k", "auth": "a" }
        }
    });

    let resp = app.oneshot(post_jobs(body, "session=s1")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["jobs"].as_array().unwrap().len(), 2);
    assert_eq!(daemon.submitted.lock().unwrap().len(), 2);

    let records = registry.filter_by_session("s1");
    assert_eq!(records.len(), 2);
    for r in &records {
        let target = r.notify_target.as_ref().expect("subscription stored");
        assert_eq!(target.endpoint, "https://push.example/sub/9");
        assert!(r.status.is_some());
    }
}

#[tokio::test]
async fn submit_magnet_list_and_torrent_files() {
    let (app, registry, daemon) = app();
    let body = json!({
        "magnets": ["magnet:?xt=urn:btih:ccc"],
        "torrents": ["ZDQ6aW5mb2Vl"]
    });

    let resp = app.oneshot(post_jobs(body, "session=s2")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let submitted = daemon.submitted.lock().unwrap().clone();
    assert_eq!(
        submitted,
        vec![
            JobSource::Magnet("magnet:?xt=urn:btih:ccc".to_string()),
            JobSource::MetaInfo(b"d4:infoee".to_vec()),
        ]
    );
    let mut ids = registry.ids();
    ids.sort();
    assert_eq!(ids, vec!["ccc".to_string(), "meta9".to_string()]);
}

#[tokio::test]
async fn bad_base64_is_rejected_before_submitting() {
    let (app, registry, daemon) = app();
    let body = json!({ "magnets": "magnet:?xt=urn:btih:ddd", "torrents": ["%%%"] });

    let resp = app.oneshot(post_jobs(body, "session=s3")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(resp).await["error"].is_string());
    assert!(daemon.submitted.lock().unwrap().is_empty());
    assert_eq!(registry.count(), 0);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let (app, _, _) = app();
    let req = Request::builder()
        .method("POST")
        .uri("/api/jobs")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(resp.headers().get(SET_COOKIE).is_some());
    assert!(json_body(resp).await["error"].is_string());
}

#[tokio::test]
async fn empty_submission_is_a_bad_request() {
    let (app, _, _) = app();
    let resp = app
        .oneshot(post_jobs(json!({ "magnets": " \n " }), "session=s4"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn daemon_failure_is_a_bad_gateway() {
    let (app, registry, daemon) = app();
    daemon.fail.store(true, Ordering::SeqCst);

    let resp = app
        .oneshot(post_jobs(json!({ "magnets": "magnet:?xt=urn:btih:eee" }), "session=s5"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert!(json_body(resp).await["error"].is_string());
    assert_eq!(registry.count(), 0);
}

#[tokio::test]
async fn vapid_key_and_health() {
    let (app, _, _) = app();
    let resp = app.clone().oneshot(get("/api/vapid", None)).await.unwrap();
    assert_eq!(json_body(resp).await, json!({ "publicKey": "BPublicKey" }));

    let resp = app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}
