//! Minimal Transmission RPC stand-in for integration tests.
//!
//! Speaks just enough HTTP/1.1 for one request per connection. Requests
//! without the current `X-Transmission-Session-Id` get a 409 carrying it,
//! like the real daemon. Supports `session-get`, `torrent-get` and
//! `torrent-add`; torrents live in a shared map the test can edit.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};

const SESSION_ID: &str = "stub-session-7f3a";

#[derive(Debug, Clone)]
pub struct StubTorrent {
    pub name: String,
    pub percent_done: f64,
}

#[derive(Default)]
struct State {
    torrents: Mutex<HashMap<String, StubTorrent>>,
    handshakes: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

/// Handle to a running stub. The server runs until the process exits.
#[derive(Clone)]
pub struct RpcServer {
    pub host: String,
    pub port: u16,
    state: Arc<State>,
}

impl RpcServer {
    pub fn set_progress(&self, hash: &str, percent_done: f64) {
        let mut torrents = self.state.torrents.lock().unwrap();
        let entry = torrents.entry(hash.to_string()).or_insert_with(|| StubTorrent {
            name: format!("{hash}.iso"),
            percent_done: 0.0,
        });
        entry.percent_done = percent_done;
    }

    pub fn remove(&self, hash: &str) {
        self.state.torrents.lock().unwrap().remove(hash);
    }

    pub fn torrent(&self, hash: &str) -> Option<StubTorrent> {
        self.state.torrents.lock().unwrap().get(hash).cloned()
    }

    /// Number of 409 responses handed out.
    pub fn handshakes(&self) -> usize {
        self.state.handshakes.load(Ordering::SeqCst)
    }

    /// RPC methods served successfully, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().unwrap().clone()
    }
}

pub fn start() -> RpcServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(State::default());
    let shared = Arc::clone(&state);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&shared);
            thread::spawn(move || handle(stream, &state));
        }
    });
    RpcServer {
        host: "127.0.0.1".to_string(),
        port,
        state,
    }
}

fn handle(mut stream: TcpStream, state: &State) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));

    let Some((headers, body)) = read_request(&mut stream) else {
        return;
    };

    let session_ok = header(&headers, "x-transmission-session-id") == Some(SESSION_ID);
    if !session_ok {
        state.handshakes.fetch_add(1, Ordering::SeqCst);
        let response = format!(
            "HTTP/1.1 409 Conflict\r\nX-Transmission-Session-Id: {SESSION_ID}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    let reply = match serde_json::from_slice::<Value>(&body) {
        Ok(request) => dispatch(&request, state),
        Err(_) => json!({ "result": "invalid json" }),
    };
    let payload = reply.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        payload.len(),
        payload
    );
    let _ = stream.write_all(response.as_bytes());
}

fn dispatch(request: &Value, state: &State) -> Value {
    let method = request["method"].as_str().unwrap_or("");
    let args = &request["arguments"];
    let reply = match method {
        "session-get" => json!({
            "result": "success",
            "arguments": { "rpc-version": 17, "version": "4.0.5 (stub)" }
        }),
        "torrent-get" => {
            let torrents = state.torrents.lock().unwrap();
            let wanted: Vec<&str> = args["ids"]
                .as_array()
                .map(|ids| ids.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let list: Vec<Value> = wanted
                .iter()
                .filter_map(|id| torrents.get(*id).map(|t| torrent_json(id, t)))
                .collect();
            json!({ "result": "success", "arguments": { "torrents": list } })
        }
        "torrent-add" => {
            let hash = if let Some(link) = args["filename"].as_str() {
                magnet_hash(link)
            } else if let Some(meta) = args["metainfo"].as_str() {
                Some(format!("meta{}", meta.len()))
            } else {
                None
            };
            match hash {
                None => json!({ "result": "invalid or corrupt torrent file" }),
                Some(hash) => {
                    let mut torrents = state.torrents.lock().unwrap();
                    let key = if torrents.contains_key(&hash) {
                        "torrent-duplicate"
                    } else {
                        torrents.insert(
                            hash.clone(),
                            StubTorrent {
                                name: format!("{hash}.iso"),
                                percent_done: 0.0,
                            },
                        );
                        "torrent-added"
                    };
                    let t = torrents[&hash].clone();
                    json!({ "result": "success", "arguments": { (key): torrent_json(&hash, &t) } })
                }
            }
        }
        other => json!({ "result": format!("method name not recognized: {other}") }),
    };
    state.calls.lock().unwrap().push(method.to_string());
    reply
}

fn torrent_json(hash: &str, t: &StubTorrent) -> Value {
    // 6 = seeding, 4 = downloading
    let status = if t.percent_done >= 1.0 { 6 } else { 4 };
    json!({
        "id": 1,
        "hashString": hash,
        "name": t.name,
        "percentDone": t.percent_done,
        "status": status,
        "totalSize": 1024,
        "rateDownload": 0,
        "eta": -1,
        "errorString": ""
    })
}

fn magnet_hash(link: &str) -> Option<String> {
    let rest = link.split("xt=urn:btih:").nth(1)?;
    let hash: String = rest.chars().take_while(|c| *c != '&').collect();
    (!hash.is_empty()).then(|| hash.to_lowercase())
}

/// Read headers and a Content-Length body. Returns lowercase header pairs.
fn read_request(stream: &mut TcpStream) -> Option<(Vec<(String, String)>, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = std::str::from_utf8(&buf[..header_end]).ok()?;
    let headers: Vec<(String, String)> = head
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    if header(&headers, "expect").is_some_and(|v| v.eq_ignore_ascii_case("100-continue")) {
        let _ = stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n");
    }

    let len: usize = header(&headers, "content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[header_end..].to_vec();
    while body.len() < len {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Some((headers, body))
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}
