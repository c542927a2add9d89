//! Notification connection management.
//!
//! This module contains:
//! - [`BackendConnection`]: public handle with the connect/close state machine
//! - `websocket`: URL resolution, upgrade and handshake helpers
//! - `task`: the background task that owns the socket

mod task;
mod websocket;

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::auth::Credentials;
use crate::error::{LinkError, Result};
use crate::event_handlers::ConnectionHandlers;
use crate::models::{ConnectionOptions, ConnectionState, FilterSpec};
use crate::router::EventRouter;
use crate::timeouts::LinkTimeouts;

use task::{connection_task, ConnCmd, TaskContext};

/// A duration far enough in the future (~100 years) to act as "never" for
/// deadline calculations without overflowing `Instant::now() + dur`.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Normal closure status.
pub const NORMAL_CLOSURE: u16 = 1000;

struct ActiveTask {
    cmd_tx: mpsc::UnboundedSender<ConnCmd>,
    task: JoinHandle<()>,
}

/// One persistent, filtered notification channel.
///
/// Dropping the handle makes the background task close the socket with
/// status 1001.
///
/// `connect()` returns immediately; progress is reported through the
/// [`ConnectionHandlers`], [`state`](Self::state) and
/// [`wait_for_state`](Self::wait_for_state). All handlers run on the
/// connection's background task.
///
/// # Examples
///
/// ```rust,no_run
/// use backend_link::{BackendClient, ConnectionHandlers, ConnectionState, EventKind, FilterSpec};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = BackendClient::builder()
///     .service_url("http://localhost:8080")
///     .backend_id("backend")
///     .backend_secret("secret")
///     .connection_handlers(
///         ConnectionHandlers::new().on_data_received(|m| println!("{}", m.to_json())),
///     )
///     .build()?;
///
/// let connection = client.connect(FilterSpec::event(EventKind::Update))?;
/// connection.wait_for_state(ConnectionState::Connected, Duration::from_secs(5)).await?;
///
/// // ... later
/// connection.close(1000);
/// connection.wait_for_state(ConnectionState::Closed, Duration::from_secs(5)).await?;
/// # Ok(())
/// # }
/// ```
pub struct BackendConnection {
    service_url: String,
    options: ConnectionOptions,
    timeouts: LinkTimeouts,
    handlers: ConnectionHandlers,
    state_tx: watch::Sender<ConnectionState>,
    active: Mutex<Option<ActiveTask>>,
}

impl BackendConnection {
    pub fn new(
        service_url: impl Into<String>,
        options: ConnectionOptions,
        timeouts: LinkTimeouts,
        handlers: ConnectionHandlers,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            service_url: service_url.into(),
            options,
            timeouts,
            handlers,
            state_tx,
            active: Mutex::new(None),
        }
    }

    /// Open the channel and subscribe with `filter`.
    ///
    /// Only valid while `Disconnected`; a connection that reached `Closed`
    /// cannot be reopened. Must be called inside a tokio runtime.
    pub fn connect(&self, credentials: Credentials, filter: FilterSpec) -> Result<()> {
        if !credentials.is_complete() {
            return Err(LinkError::ConfigurationError(
                "backend id and secret are required to connect".to_string(),
            ));
        }
        let ws_url = websocket::resolve_ws_url(&self.service_url, &self.options)?;

        // Held until the task is registered so a racing close() finds it.
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let moved = self.state_tx.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !moved {
            return Err(LinkError::InvalidState(format!(
                "connect() called while {}",
                self.state()
            )));
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctx = TaskContext {
            ws_url,
            credentials,
            router: EventRouter::new(filter, self.options.max_message_bytes),
            timeouts: self.timeouts.clone(),
            handlers: self.handlers.clone(),
            state_tx: self.state_tx.clone(),
        };
        let task = tokio::spawn(connection_task(ctx, cmd_rx));

        if let Some(previous) = active.replace(ActiveTask { cmd_tx, task }) {
            // Only reachable after the previous task reported Disconnected.
            previous.task.abort();
        }
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// True only in `Connected`.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Wait until the connection is in `target`.
    ///
    /// Fails with [`LinkError::TimeoutError`] if `timeout` elapses first.
    pub async fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> Result<()> {
        let mut rx = self.state_tx.subscribe();
        let reached = tokio::time::timeout(timeout, rx.wait_for(|state| *state == target))
            .await
            .map(|res| res.map(|_| ()));
        match reached {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(LinkError::InvalidState("connection state channel closed".to_string())),
            Err(_) => Err(LinkError::TimeoutError(format!(
                "state {} not reached within {:?} (currently {})",
                target,
                timeout,
                self.state()
            ))),
        }
    }

    /// Start the close handshake with `status`.
    ///
    /// Idempotent: only the first call in `Connecting`/`Connected` sends a
    /// Close frame; every other call is a no-op.
    pub fn close(&self, status: u16) {
        let moved = self.state_tx.send_if_modified(|state| {
            if matches!(state, ConnectionState::Connecting | ConnectionState::Connected) {
                *state = ConnectionState::Closing;
                true
            } else {
                false
            }
        });
        if !moved {
            log::debug!("[backend-link] close({}) ignored while {}", status, self.state());
            return;
        }

        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(active) = active.as_ref() {
            let _ = active.cmd_tx.send(ConnCmd::Close { status });
        }
    }
}

impl std::fmt::Debug for BackendConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConnection")
            .field("service_url", &self.service_url)
            .field("state", &self.state())
            .field("handlers", &self.handlers)
            .finish()
    }
}
