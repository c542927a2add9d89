//! Observer hooks for replies and notification connections.
//!
//! Two independent handler sets:
//!
//! - [`ReplyHandlers`]: fired by the dispatcher's owner task whenever a
//!   [`ReplyHandle`] reaches a terminal state.
//! - [`ConnectionHandlers`]: fired by a connection's background task for
//!   lifecycle changes and inbound change events.
//!
//! Several callbacks may be registered for the same event; they run in
//! registration order, on the task that owns the state they report.
//!
//! # Example
//!
//! ```rust,no_run
//! use backend_link::{BackendClient, ConnectionHandlers, ReplyHandlers};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let replies = ReplyHandlers::new()
//!     .on_finished(|reply| println!("done: {}", reply.debug_info()))
//!     .on_error(|reply| eprintln!("failed: {:?}", reply.error()));
//!
//! let connection = ConnectionHandlers::new()
//!     .on_connect(|| println!("Subscribed"))
//!     .on_data_received(|message| println!("{}", message.to_json()))
//!     .on_closed(|status| println!("Closed with status {}", status));
//!
//! let client = BackendClient::builder()
//!     .service_url("http://localhost:8080")
//!     .backend_id("backend")
//!     .backend_secret("secret")
//!     .reply_handlers(replies)
//!     .connection_handlers(connection)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::LinkError;
use crate::models::{ConnectionState, NotificationMessage};
use crate::reply::ReplyHandle;

/// Error reported through [`ConnectionHandlers::on_error`].
#[derive(Debug, Clone)]
pub struct ConnectionError {
    pub error: LinkError,
    /// Connection state at the moment the error was observed.
    pub state: ConnectionState,
}

impl ConnectionError {
    pub fn new(error: LinkError, state: ConnectionState) -> Self {
        Self { error, state }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (while {})", self.error, self.state)
    }
}

pub type OnReplyCallback = Arc<dyn Fn(&ReplyHandle) + Send + Sync>;

pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;

pub type OnDataCallback = Arc<dyn Fn(&NotificationMessage) + Send + Sync>;

pub type OnClosedCallback = Arc<dyn Fn(u16) + Send + Sync>;

pub type OnErrorCallback = Arc<dyn Fn(&ConnectionError) + Send + Sync>;

/// Raw frame hook (debug/tracing).
pub type OnRawCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Reply completion handlers.
#[derive(Clone, Default)]
pub struct ReplyHandlers {
    pub(crate) on_finished: Vec<OnReplyCallback>,
    pub(crate) on_error: Vec<OnReplyCallback>,
}

impl fmt::Debug for ReplyHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyHandlers")
            .field("on_finished", &self.on_finished.len())
            .field("on_error", &self.on_error.len())
            .finish()
    }
}

impl ReplyHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for every reply that reaches a terminal state, including
    /// errored ones.
    pub fn on_finished(mut self, f: impl Fn(&ReplyHandle) + Send + Sync + 'static) -> Self {
        self.on_finished.push(Arc::new(f));
        self
    }

    /// Called for errored replies, before the `on_finished` callbacks.
    pub fn on_error(mut self, f: impl Fn(&ReplyHandle) + Send + Sync + 'static) -> Self {
        self.on_error.push(Arc::new(f));
        self
    }

    pub fn has_any(&self) -> bool {
        !self.on_finished.is_empty() || !self.on_error.is_empty()
    }

    pub(crate) fn emit_resolved(&self, reply: &ReplyHandle) {
        if reply.is_error() {
            for cb in &self.on_error {
                cb(reply);
            }
        }
        for cb in &self.on_finished {
            cb(reply);
        }
    }
}

/// Notification connection handlers.
#[derive(Clone, Default)]
pub struct ConnectionHandlers {
    pub(crate) on_connect: Vec<OnConnectCallback>,
    pub(crate) on_data_received: Vec<OnDataCallback>,
    pub(crate) on_closed: Vec<OnClosedCallback>,
    pub(crate) on_error: Vec<OnErrorCallback>,
    pub(crate) on_receive: Vec<OnRawCallback>,
    pub(crate) on_send: Vec<OnRawCallback>,
}

impl fmt::Debug for ConnectionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandlers")
            .field("on_connect", &self.on_connect.len())
            .field("on_data_received", &self.on_data_received.len())
            .field("on_closed", &self.on_closed.len())
            .field("on_error", &self.on_error.len())
            .field("on_receive", &self.on_receive.len())
            .field("on_send", &self.on_send.len())
            .finish()
    }
}

impl ConnectionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the subscription handshake has been sent and the
    /// connection is `Connected`.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect.push(Arc::new(f));
        self
    }

    /// Called for every change event that passes the subscription filter,
    /// in arrival order, and once more with the Close message right before
    /// `on_closed`.
    pub fn on_data_received(
        mut self,
        f: impl Fn(&NotificationMessage) + Send + Sync + 'static,
    ) -> Self {
        self.on_data_received.push(Arc::new(f));
        self
    }

    /// Called exactly once per connection with the close status.
    pub fn on_closed(mut self, f: impl Fn(u16) + Send + Sync + 'static) -> Self {
        self.on_closed.push(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error.push(Arc::new(f));
        self
    }

    /// Debug hook receiving every raw inbound text frame before parsing.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive.push(Arc::new(f));
        self
    }

    /// Debug hook receiving every raw outbound text frame.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send.push(Arc::new(f));
        self
    }

    pub fn has_any(&self) -> bool {
        !self.on_connect.is_empty()
            || !self.on_data_received.is_empty()
            || !self.on_closed.is_empty()
            || !self.on_error.is_empty()
            || !self.on_receive.is_empty()
            || !self.on_send.is_empty()
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_connect(&self) {
        for cb in &self.on_connect {
            cb();
        }
    }

    pub(crate) fn emit_data(&self, message: &NotificationMessage) {
        for cb in &self.on_data_received {
            cb(message);
        }
    }

    pub(crate) fn emit_closed(&self, status: u16) {
        for cb in &self.on_closed {
            cb(status);
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        for cb in &self.on_error {
            cb(&error);
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        for cb in &self.on_receive {
            cb(raw);
        }
    }

    pub(crate) fn emit_send(&self, raw: &str) {
        for cb in &self.on_send {
            cb(raw);
        }
    }
}
