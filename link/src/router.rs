//! Inbound notification routing.
//!
//! The router turns raw frames into [`RouteOutcome`]s. It applies the
//! subscription filter and accepts exactly one Close per connection; the
//! connection task acts on the outcome.

use log::{debug, warn};
use serde_json::{Map, Value as JsonValue};

use crate::error::LinkError;
use crate::models::{EventKind, FilterSpec, NotificationMessage, OBJECT_TYPE_KEY};

/// Status reported when a WebSocket Close frame carries no code.
pub const NO_STATUS_RECEIVED: u16 = 1005;

const MESSAGE_TYPE_KEY: &str = "messageType";
const EVENT_KEY: &str = "event";
const STATUS_KEY: &str = "status";

/// What the connection should do with one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// A change event that passed the filter.
    Data(NotificationMessage),
    /// The first Close of the connection.
    Closed(u16),
    /// Valid event outside the subscription filter.
    Filtered,
    /// Frame rejected; already logged.
    Dropped(LinkError),
}

/// Per-connection frame demultiplexer.
#[derive(Debug, Clone)]
pub struct EventRouter {
    filter: FilterSpec,
    max_message_bytes: usize,
    close_seen: bool,
}

impl EventRouter {
    pub fn new(filter: FilterSpec, max_message_bytes: usize) -> Self {
        Self {
            filter,
            max_message_bytes,
            close_seen: false,
        }
    }

    pub fn filter(&self) -> &FilterSpec {
        &self.filter
    }

    /// A Close (JSON or frame) has already been routed.
    pub fn close_seen(&self) -> bool {
        self.close_seen
    }

    /// Route a text frame.
    pub fn route_text(&mut self, raw: &str) -> RouteOutcome {
        if raw.len() > self.max_message_bytes {
            return self.drop_frame(LinkError::MalformedMessage(format!(
                "frame of {} bytes exceeds limit of {}",
                raw.len(),
                self.max_message_bytes
            )));
        }

        let mut document = match serde_json::from_str::<JsonValue>(raw) {
            Ok(JsonValue::Object(map)) => map,
            Ok(_) => {
                return self.drop_frame(LinkError::MalformedMessage(
                    "notification is not a JSON object".to_string(),
                ))
            },
            Err(e) => return self.drop_frame(e.into()),
        };

        let message_type = match document.remove(MESSAGE_TYPE_KEY) {
            Some(JsonValue::String(s)) => s,
            _ => {
                return self.drop_frame(LinkError::MalformedMessage(
                    "notification has no messageType".to_string(),
                ))
            },
        };

        match message_type.as_str() {
            "data" => self.route_data(document),
            "close" => match parse_status(document.get(STATUS_KEY)) {
                Ok(status) => self.route_close(status),
                Err(e) => self.drop_frame(e),
            },
            other => self.drop_frame(LinkError::MalformedMessage(format!(
                "unknown messageType '{}'",
                other
            ))),
        }
    }

    /// Route a WebSocket Close frame.
    pub fn route_close_frame(&mut self, code: Option<u16>) -> RouteOutcome {
        self.route_close(code.unwrap_or(NO_STATUS_RECEIVED))
    }

    fn route_data(&self, mut document: Map<String, JsonValue>) -> RouteOutcome {
        let event = match document.remove(EVENT_KEY) {
            Some(JsonValue::String(s)) => match s.parse::<EventKind>() {
                Ok(kind) => kind,
                Err(e) => return self.drop_frame(LinkError::MalformedMessage(e)),
            },
            _ => {
                return self.drop_frame(LinkError::MalformedMessage(
                    "data notification has no event".to_string(),
                ))
            },
        };

        let object_type = match document.remove(OBJECT_TYPE_KEY) {
            Some(JsonValue::String(s)) => s,
            _ => {
                return self.drop_frame(LinkError::MalformedMessage(
                    "data notification has no objectType".to_string(),
                ))
            },
        };

        if !self.filter.matches(event, &object_type) {
            debug!(
                "[backend-link] Dropping {} on '{}': outside subscription filter",
                event, object_type
            );
            return RouteOutcome::Filtered;
        }

        RouteOutcome::Data(NotificationMessage::data(event, object_type, document))
    }

    fn route_close(&mut self, status: u16) -> RouteOutcome {
        if self.close_seen {
            return self.drop_frame(LinkError::ProtocolViolation(format!(
                "second close (status {}) on the same connection",
                status
            )));
        }
        self.close_seen = true;
        RouteOutcome::Closed(status)
    }

    fn drop_frame(&self, error: LinkError) -> RouteOutcome {
        warn!("[backend-link] Dropping notification: {}", error);
        RouteOutcome::Dropped(error)
    }
}

fn parse_status(value: Option<&JsonValue>) -> Result<u16, LinkError> {
    match value {
        None | Some(JsonValue::Null) => Ok(NO_STATUS_RECEIVED),
        Some(v) => v
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| LinkError::MalformedMessage(format!("invalid close status {}", v))),
    }
}
