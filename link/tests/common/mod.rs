#![allow(dead_code)]
//! In-process mock backend for integration tests.
//!
//! - [`MockBackend::transport`] serves object operations in memory and
//!   publishes change events to subscribers.
//! - A tokio-tungstenite server on 127.0.0.1 accepts notification
//!   connections, checks the identity headers and the subscribe handshake.
//! - [`spawn_http_responder`] is a one-shot raw HTTP server for exercising the
//!   reqwest transport.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backend_link::{
    BackendClient, ConnectionState, EventKind, FilterSpec, LinkTimeouts, NotificationMessage,
    Transport, TransportRequest, TransportResponse,
};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Map, Value as JsonValue};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message};

pub const BACKEND_ID: &str = "test-backend";
pub const BACKEND_SECRET: &str = "test-secret";
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How the mock WebSocket server treats a connection after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketBehavior {
    /// Answer pings and echo close frames.
    Normal,
    /// Read the client's Close but never acknowledge it.
    SwallowClose,
    /// Stop reading after the handshake (no pongs, no close echo).
    Silent,
}

#[derive(Default)]
struct Store {
    objects: HashMap<String, Map<String, JsonValue>>,
}

struct Subscriber {
    filter: FilterSpec,
    tx: mpsc::UnboundedSender<Message>,
}

struct BackendState {
    store: Mutex<Store>,
    next_object_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
    subscriber_count: watch::Sender<usize>,
    handshakes: Mutex<Vec<JsonValue>>,
    close_frames: Mutex<Vec<Option<u16>>>,
    requests: Mutex<Vec<TransportRequest>>,
    behavior: SocketBehavior,
    apply_filters: bool,
}

/// Mock backend: in-memory object store plus a notification endpoint.
pub struct MockBackend {
    pub addr: SocketAddr,
    state: Arc<BackendState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        Self::start_with(SocketBehavior::Normal, true).await
    }

    /// `apply_filters = false` makes the server broadcast every event,
    /// regardless of the subscriber's filter.
    pub async fn start_with(behavior: SocketBehavior, apply_filters: bool) -> Self {
        let (subscriber_count, _) = watch::channel(0);
        let state = Arc::new(BackendState {
            store: Mutex::new(Store::default()),
            next_object_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
            subscriber_count,
            handshakes: Mutex::new(Vec::new()),
            close_frames: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            behavior,
            apply_filters,
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_socket(stream, accept_state.clone()));
            }
        });

        Self { addr, state }
    }

    pub fn service_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(MockTransport {
            state: self.state.clone(),
        })
    }

    /// Client wired to this backend, with fast timeouts.
    pub fn client(&self) -> backend_link::BackendClientBuilder {
        BackendClient::builder()
            .service_url(self.service_url())
            .backend_id(BACKEND_ID)
            .backend_secret(BACKEND_SECRET)
            .timeouts(LinkTimeouts::fast())
            .transport(self.transport())
    }

    pub async fn wait_for_subscribers(&self, n: usize) {
        let mut rx = self.state.subscriber_count.subscribe();
        tokio::time::timeout(TEST_TIMEOUT, rx.wait_for(|count| *count >= n))
            .await
            .expect("subscriber did not register in time")
            .unwrap();
    }

    pub fn handshakes(&self) -> Vec<JsonValue> {
        self.state.handshakes.lock().unwrap().clone()
    }

    pub fn close_frames(&self) -> Vec<Option<u16>> {
        self.state.close_frames.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    /// Push a raw frame to every subscriber.
    pub fn push(&self, message: Message) {
        for sub in self.state.subscribers.lock().unwrap().iter() {
            let _ = sub.tx.send(message.clone());
        }
    }

    pub fn push_text(&self, text: &str) {
        self.push(Message::Text(text.to_string().into()));
    }

    /// Start a server-side close with `status`.
    pub fn close_all(&self, status: u16) {
        self.push(Message::Close(Some(CloseFrame {
            code: CloseCode::from(status),
            reason: "".into(),
        })));
    }

    pub fn publish(&self, event: EventKind, object_type: &str, object: Map<String, JsonValue>) {
        publish(&self.state, event, object_type, object);
    }
}

fn publish(state: &BackendState, event: EventKind, object_type: &str, object: Map<String, JsonValue>) {
    let text = NotificationMessage::data(event, object_type, object).to_json().to_string();
    for sub in state.subscribers.lock().unwrap().iter() {
        if state.apply_filters && !sub.filter.matches(event, object_type) {
            continue;
        }
        let _ = sub.tx.send(Message::Text(text.clone().into()));
    }
}

// ── Notification endpoint ───────────────────────────────────────────────────

async fn serve_socket(stream: TcpStream, state: Arc<BackendState>) {
    let check_identity = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let headers = request.headers();
        let id = headers.get("x-backend-id").and_then(|v| v.to_str().ok());
        let secret = headers.get("x-backend-secret").and_then(|v| v.to_str().ok());
        if id == Some(BACKEND_ID) && secret == Some(BACKEND_SECRET) {
            Ok(response)
        } else {
            let mut rejection = ErrorResponse::new(Some("bad credentials".to_string()));
            *rejection.status_mut() = StatusCode::UNAUTHORIZED;
            Err(rejection)
        }
    };

    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, check_identity).await else {
        return;
    };

    // First frame must be the subscribe handshake.
    let filter = match ws.next().await {
        Some(Ok(Message::Text(text))) => {
            let handshake: JsonValue = serde_json::from_str(&text).unwrap_or(JsonValue::Null);
            state.handshakes.lock().unwrap().push(handshake.clone());
            if handshake["messageType"] != "subscribe" || handshake["backendId"] != BACKEND_ID {
                let _ = ws.close(None).await;
                return;
            }
            serde_json::from_value::<FilterSpec>(handshake["filter"].clone()).unwrap_or_default()
        },
        Some(Ok(Message::Close(frame))) => {
            state.close_frames.lock().unwrap().push(frame.map(|f| u16::from(f.code)));
            let _ = ws.close(None).await;
            return;
        },
        _ => return,
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    state.subscribers.lock().unwrap().push(Subscriber { filter, tx });
    state.subscriber_count.send_modify(|count| *count += 1);

    if state.behavior == SocketBehavior::Silent {
        // Hold the socket open without ever polling it.
        tokio::time::sleep(Duration::from_secs(60)).await;
        return;
    }

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                let Some(message) = outgoing else { return };
                if ws.send(message).await.is_err() {
                    return;
                }
            }
            incoming = ws.next() => {
                match incoming {
                    Some(Ok(Message::Close(frame))) => {
                        state.close_frames.lock().unwrap().push(frame.map(|f| u16::from(f.code)));
                        if state.behavior == SocketBehavior::SwallowClose {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                            return;
                        }
                        // Flushes the echo tungstenite queued for us.
                        let _ = ws.close(None).await;
                    },
                    Some(Ok(_)) => {},
                    Some(Err(_)) | None => return,
                }
            }
        }
    }
}

// ── Object operations ───────────────────────────────────────────────────────

struct MockTransport {
    state: Arc<BackendState>,
}

impl Transport for MockTransport {
    fn send(&self, request: TransportRequest) -> BoxFuture<'static, backend_link::Result<TransportResponse>> {
        let state = self.state.clone();
        Box::pin(async move {
            state.requests.lock().unwrap().push(request.clone());
            Ok(handle_request(&state, &request))
        })
    }
}

fn respond(status: u16, body: JsonValue) -> TransportResponse {
    TransportResponse::new(status, body.to_string())
}

fn handle_request(state: &BackendState, request: &TransportRequest) -> TransportResponse {
    let segments = &request.request.path_segments;
    let (object_type, object_id) = match segments.as_slice() {
        [_, objects, name] if objects == "objects" => (format!("objects.{}", name), None),
        [_, objects, name, id] if objects == "objects" => (format!("objects.{}", name), Some(id.clone())),
        [_, name] => (name.clone(), None),
        [_, name, id] => (name.clone(), Some(id.clone())),
        _ => return respond(404, json!({"message": "no such route"})),
    };

    if object_type == "objects.Broken" {
        return respond(500, json!({"message": "storage unavailable"}));
    }

    let method = request.request.method.as_str();
    let key = |id: &str| format!("{}/{}", object_type, id);

    match (method, object_id) {
        ("POST", None) => {
            let id = state.next_object_id.fetch_add(1, Ordering::SeqCst).to_string();
            let mut object = match &request.request.body {
                Some(JsonValue::Object(map)) => map.clone(),
                _ => Map::new(),
            };
            object.insert("id".to_string(), json!(id));
            object.insert("createdAt".to_string(), json!("2026-01-01T00:00:00Z"));
            state.store.lock().unwrap().objects.insert(key(&id), object.clone());
            publish(state, EventKind::Create, &object_type, object.clone());
            respond(201, JsonValue::Object(object))
        },
        ("GET", None) => {
            let prefix = format!("{}/", object_type);
            let store = state.store.lock().unwrap();
            let mut results: Vec<_> = store
                .objects
                .iter()
                .filter(|(k, _)| k.starts_with(&prefix))
                .map(|(_, v)| JsonValue::Object(v.clone()))
                .collect();
            results.sort_by_key(|v| v["id"].as_str().unwrap_or_default().parse::<u64>().unwrap_or(0));
            respond(200, json!({ "results": results }))
        },
        ("GET", Some(id)) => match state.store.lock().unwrap().objects.get(&key(&id)) {
            Some(object) => respond(200, JsonValue::Object(object.clone())),
            None => respond(404, json!({"message": format!("{} not found", id)})),
        },
        ("PUT", Some(id)) => {
            let updated = {
                let mut store = state.store.lock().unwrap();
                let Some(object) = store.objects.get_mut(&key(&id)) else {
                    return respond(404, json!({"message": format!("{} not found", id)}));
                };
                if let Some(JsonValue::Object(fields)) = &request.request.body {
                    for (k, v) in fields {
                        object.insert(k.clone(), v.clone());
                    }
                }
                object.clone()
            };
            publish(state, EventKind::Update, &object_type, updated.clone());
            respond(200, JsonValue::Object(updated))
        },
        ("DELETE", Some(id)) => {
            let removed = state.store.lock().unwrap().objects.remove(&key(&id));
            match removed {
                Some(object) => {
                    publish(state, EventKind::Delete, &object_type, object);
                    respond(200, json!({}))
                },
                None => respond(404, json!({"message": format!("{} not found", id)})),
            }
        },
        _ => respond(405, json!({"message": "method not allowed"})),
    }
}

// ── Raw HTTP responder ──────────────────────────────────────────────────────

/// Captured request head and body.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Accept one HTTP/1.1 request, answer with `status` and `body`, and hand the
/// request back through the returned receiver.
pub async fn spawn_http_responder(status: u16, body: &'static str) -> (String, oneshot::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let (head_end, content_length) = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let content_length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                break (pos + 4, content_length);
            }
        };
        while buf.len() < head_end + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let head = String::from_utf8_lossy(&buf[..head_end - 4]).to_string();
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default().to_string();
        let headers = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            .collect();
        let request_body = String::from_utf8_lossy(&buf[head_end..]).to_string();

        let reason = if status < 400 { "OK" } else { "Error" };
        let response = format!(
            "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            reason,
            body.len(),
            body
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
        let _ = tx.send(CapturedRequest {
            request_line,
            headers,
            body: request_body,
        });
    });

    (url, rx)
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Wait until `conn` reaches `state`, panicking after [`TEST_TIMEOUT`].
pub async fn expect_state(conn: &backend_link::BackendConnection, state: ConnectionState) {
    conn.wait_for_state(state, TEST_TIMEOUT)
        .await
        .unwrap_or_else(|e| panic!("expected {}: {}", state, e));
}

/// Recorded callback invocations.
pub type Events<T> = Arc<Mutex<Vec<T>>>;

pub fn events<T>() -> Events<T> {
    Arc::new(Mutex::new(Vec::new()))
}
