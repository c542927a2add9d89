use serde_json::{json, Map, Value as JsonValue};

use super::event_kind::EventKind;

/// Type of a notification frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Data-change event
    Data,

    /// Close notification carrying a status code
    Close,
}

/// Decoded notification received on a [`BackendConnection`](crate::BackendConnection).
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    /// Data or Close
    pub message_type: MessageType,

    /// Event kind (present iff Data)
    pub event: Option<EventKind>,

    /// Object type the event refers to (present iff Data)
    pub object_type: Option<String>,

    /// Remaining fields of the data frame (empty for Close)
    pub payload: Map<String, JsonValue>,

    /// Close status (present iff Close)
    pub status: Option<u16>,
}

impl NotificationMessage {
    pub fn data(event: EventKind, object_type: impl Into<String>, payload: Map<String, JsonValue>) -> Self {
        Self {
            message_type: MessageType::Data,
            event: Some(event),
            object_type: Some(object_type.into()),
            payload,
            status: None,
        }
    }

    pub fn close(status: u16) -> Self {
        Self {
            message_type: MessageType::Close,
            event: None,
            object_type: None,
            payload: Map::new(),
            status: Some(status),
        }
    }

    pub fn is_data(&self) -> bool {
        self.message_type == MessageType::Data
    }

    pub fn is_close(&self) -> bool {
        self.message_type == MessageType::Close
    }

    /// Render back to the wire document shape.
    pub fn to_json(&self) -> JsonValue {
        match self.message_type {
            MessageType::Data => {
                let mut doc = self.payload.clone();
                doc.insert("messageType".to_string(), json!("data"));
                if let Some(event) = self.event {
                    doc.insert("event".to_string(), json!(event.as_str()));
                }
                if let Some(object_type) = &self.object_type {
                    doc.insert("objectType".to_string(), json!(object_type));
                }
                JsonValue::Object(doc)
            },
            MessageType::Close => json!({
                "messageType": "close",
                "status": self.status,
            }),
        }
    }
}
