use serde::{Deserialize, Serialize};

use super::event_kind::EventKind;

/// Server-side subscription predicate for a notification connection.
///
/// Sent as part of the handshake so the backend only pushes matching events.
///
/// # JSON Wire Format
///
/// ```json
/// {"event": "update", "objectType": "objects.Todo"}
/// ```
///
/// `event` is omitted for "any event", `objectType` when unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Event kind to receive; `None` accepts every kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventKind>,

    /// Object type to receive; `None` accepts every type.
    #[serde(rename = "objectType", default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
}

impl FilterSpec {
    /// Accept every event on every object type.
    pub fn any() -> Self {
        Self::default()
    }

    /// Accept a single event kind.
    pub fn event(kind: EventKind) -> Self {
        Self {
            event: Some(kind),
            object_type: None,
        }
    }

    pub fn with_object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    /// Whether an event of `kind` on `object_type` satisfies this filter.
    pub fn matches(&self, kind: EventKind, object_type: &str) -> bool {
        self.event.map_or(true, |wanted| wanted == kind)
            && self.object_type.as_deref().map_or(true, |wanted| wanted == object_type)
    }
}
