//! Per-request reply handles.
//!
//! A [`ReplyHandle`] is returned by every dispatch before any I/O happens and
//! is resolved exactly once by the dispatcher's owner task. Clones share the
//! same state; the caller only ever gets the read-only view.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value as JsonValue;
use tokio::sync::watch;

use crate::error::{ErrorKind, LinkError};
use crate::models::OperationKind;

/// Correlation token for one request, unique for the dispatcher's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub(crate) u64);

impl RequestId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyState {
    Pending,
    Finished,
    Errored,
}

/// Failure details of an errored reply.
#[derive(Debug, Clone)]
pub struct ReplyError {
    pub kind: ErrorKind,
    /// HTTP status when the backend answered at all.
    pub backend_status: Option<u16>,
    pub message: String,
    /// Decoded error body, when there was one.
    pub body: Option<JsonValue>,
}

impl ReplyError {
    pub(crate) fn from_link_error(err: &LinkError) -> Self {
        let backend_status = match err {
            LinkError::ClientError { status_code, .. } | LinkError::ServerError { status_code, .. } => {
                Some(*status_code)
            },
            _ => None,
        };
        Self {
            kind: err.kind(),
            backend_status,
            message: err.to_string(),
            body: None,
        }
    }
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.backend_status {
            Some(status) => write!(f, "{} ({}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Finished { data: JsonValue, backend_status: u16 },
    Errored(ReplyError),
}

#[derive(Debug)]
struct ReplyInner {
    id: RequestId,
    kind: OperationKind,
    object_type: String,
    outcome: OnceLock<Outcome>,
    done: watch::Sender<bool>,
}

/// Handle to one in-flight backend operation.
///
/// # Examples
///
/// ```rust,no_run
/// use backend_link::BackendClient;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = BackendClient::builder()
///     .service_url("https://api.example.com")
///     .backend_id("5a1f...")
///     .backend_secret("3c9e...")
///     .build()?;
///
/// let reply = client.query(json!({"objectType": "objects.Todo"}))?;
/// reply.wait().await;
/// if let Some(data) = reply.data() {
///     println!("{} results", data["results"].as_array().map_or(0, Vec::len));
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ReplyHandle {
    inner: Arc<ReplyInner>,
}

impl ReplyHandle {
    pub(crate) fn new(id: RequestId, kind: OperationKind, object_type: impl Into<String>) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(ReplyInner {
                id,
                kind,
                object_type: object_type.into(),
                outcome: OnceLock::new(),
                done,
            }),
        }
    }

    pub fn id(&self) -> RequestId {
        self.inner.id
    }

    pub fn kind(&self) -> OperationKind {
        self.inner.kind
    }

    pub fn object_type(&self) -> &str {
        &self.inner.object_type
    }

    pub fn state(&self) -> ReplyState {
        match self.inner.outcome.get() {
            None => ReplyState::Pending,
            Some(Outcome::Finished { .. }) => ReplyState::Finished,
            Some(Outcome::Errored(_)) => ReplyState::Errored,
        }
    }

    /// The reply reached a terminal state, successful or not.
    pub fn is_finished(&self) -> bool {
        self.inner.outcome.get().is_some()
    }

    pub fn is_error(&self) -> bool {
        matches!(self.inner.outcome.get(), Some(Outcome::Errored(_)))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error().map(|e| e.kind)
    }

    pub fn error(&self) -> Option<&ReplyError> {
        match self.inner.outcome.get() {
            Some(Outcome::Errored(err)) => Some(err),
            _ => None,
        }
    }

    /// Result document. `None` while pending and for errored replies.
    pub fn data(&self) -> Option<&JsonValue> {
        match self.inner.outcome.get() {
            Some(Outcome::Finished { data, .. }) => Some(data),
            _ => None,
        }
    }

    /// HTTP status reported by the backend, once known.
    pub fn backend_status(&self) -> Option<u16> {
        match self.inner.outcome.get()? {
            Outcome::Finished { backend_status, .. } => Some(*backend_status),
            Outcome::Errored(err) => err.backend_status,
        }
    }

    /// Wait until the reply is resolved and return its terminal state.
    ///
    /// Returns immediately for an already-resolved reply.
    pub async fn wait(&self) -> ReplyState {
        let mut rx = self.inner.done.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|done| *done).await;
        self.state()
    }

    /// One-line summary for diagnostics.
    pub fn debug_info(&self) -> String {
        let head = format!(
            "request={} op={} type={}",
            self.inner.id,
            self.inner.kind.as_str(),
            self.inner.object_type
        );
        match self.inner.outcome.get() {
            None => format!("{} state=pending", head),
            Some(Outcome::Finished { backend_status, .. }) => {
                format!("{} state=finished status={}", head, backend_status)
            },
            Some(Outcome::Errored(err)) => format!("{} state=errored error=\"{}\"", head, err),
        }
    }

    pub(crate) fn resolve_finished(&self, data: JsonValue, backend_status: u16) -> bool {
        self.resolve(Outcome::Finished {
            data,
            backend_status,
        })
    }

    pub(crate) fn resolve_errored(&self, error: ReplyError) -> bool {
        self.resolve(Outcome::Errored(error))
    }

    fn resolve(&self, outcome: Outcome) -> bool {
        if let Err(rejected) = self.inner.outcome.set(outcome) {
            log::error!(
                "[LINK_DISPATCH] Reply {} resolved twice; ignoring {:?}",
                self.inner.id,
                rejected
            );
            if cfg!(debug_assertions) {
                panic!("reply {} resolved twice", self.inner.id);
            }
            return false;
        }
        self.inner.done.send_replace(true);
        true
    }
}

impl fmt::Debug for ReplyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyHandle")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("object_type", &self.inner.object_type)
            .field("state", &self.state())
            .finish()
    }
}
