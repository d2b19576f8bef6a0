use async_trait::async_trait;
use serde_json::{json, Value};
use stablehorde_rs::{Result, Transport, TransportRequest, TransportResponse};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const BASE: &str = "https://horde.test/api/v2";

/// A recorded request and the (tokio) time it was made.
#[derive(Debug, Clone)]
pub struct Call {
    pub request: TransportRequest,
    pub at: Instant,
}

/// Transport that replays queued responses per URL and records every call.
/// Unscripted requests get HTTP 599.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<TransportResponse>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a response for `path` (relative to [`BASE`]) or an absolute URL.
    pub fn respond(&self, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        let url = if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", BASE, path)
        };
        self.routes
            .lock()
            .unwrap()
            .entry(url)
            .or_default()
            .push_back(TransportResponse::new(status, body));
    }

    pub fn respond_json(&self, path: &str, status: u16, body: Value) {
        self.respond(path, status, serde_json::to_vec(&body).unwrap());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls whose URL ends with `suffix`.
    pub fn count(&self, suffix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.request.url.ends_with(suffix))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse> {
        let response = self
            .routes
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| TransportResponse::new(599, b"unscripted".to_vec()));
        self.calls.lock().unwrap().push(Call {
            request,
            at: Instant::now(),
        });
        Ok(response)
    }
}

/// Wraps a [`ScriptedTransport`] and cancels `token` as soon as a status
/// check is answered, so the caller sees a finished job and a cancelled
/// token at the same time.
#[derive(Debug)]
pub struct CancelOnCheck {
    inner: Arc<ScriptedTransport>,
    token: CancellationToken,
}

impl CancelOnCheck {
    pub fn new(inner: Arc<ScriptedTransport>, token: CancellationToken) -> Arc<Self> {
        Arc::new(Self { inner, token })
    }
}

#[async_trait]
impl Transport for CancelOnCheck {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse> {
        let is_check = request.url.contains("/generate/check/");
        let response = self.inner.request(request).await;
        if is_check {
            self.token.cancel();
        }
        response
    }
}

/// In-memory sink for `tracing_subscriber::fmt` output.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

pub fn status_json(done: bool, faulted: bool, wait_time: Option<u64>) -> Value {
    let (finished, processing) = if done { (1, 0) } else { (0, 1) };
    let mut body = json!({
        "finished": finished,
        "processing": processing,
        "restarted": 0,
        "waiting": 0,
        "done": done,
        "faulted": faulted,
        "queue_position": 0,
        "kudos": 10.0,
        "is_possible": true
    });
    if let Some(wait) = wait_time {
        body["wait_time"] = json!(wait);
    }
    body
}

pub fn generation_json(img: &str, seed: &str) -> Value {
    json!({
        "worker_id": "worker-1",
        "worker_name": "alpha",
        "model": "stable_diffusion",
        "img": img,
        "seed": seed
    })
}

pub fn result_json(generations: Vec<Value>) -> Value {
    let mut body = status_json(true, false, Some(0));
    body["generations"] = Value::Array(generations);
    body
}
