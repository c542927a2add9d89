use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{LinkError, Result};

/// Document key holding the object type.
pub const OBJECT_TYPE_KEY: &str = "objectType";

/// Document key holding the object id.
pub const OBJECT_ID_KEY: &str = "id";

/// Kind of backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Read,
    Update,
    Delete,
    Query,
}

impl OperationKind {
    /// Whether the operation addresses a single object by id.
    pub fn requires_id(&self) -> bool {
        matches!(self, OperationKind::Read | OperationKind::Update | OperationKind::Delete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Read => "read",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Query => "query",
        }
    }
}

/// Abstract description of one backend operation before wire encoding.
///
/// Validation happens in [`RequestCodec::encode`](crate::codec::RequestCodec::encode),
/// so any descriptor can be built; an invalid one is rejected at dispatch
/// time before any I/O.
///
/// # Examples
///
/// ```rust
/// use backend_link::{OperationDescriptor, OperationKind};
/// use serde_json::json;
///
/// let op = OperationDescriptor::from_document(
///     OperationKind::Update,
///     json!({"objectType": "objects.Todo", "id": "51b0", "title": "done"}),
/// )
/// .unwrap();
///
/// assert_eq!(op.object_type(), "objects.Todo");
/// assert_eq!(op.object_id(), Some("51b0"));
/// assert!(op.payload().contains_key("title"));
/// assert!(!op.payload().contains_key("objectType"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDescriptor {
    kind: OperationKind,
    object_type: String,
    object_id: Option<String>,
    payload: Map<String, JsonValue>,
}

impl OperationDescriptor {
    pub fn new(kind: OperationKind, object_type: impl Into<String>) -> Self {
        Self {
            kind,
            object_type: object_type.into(),
            object_id: None,
            payload: Map::new(),
        }
    }

    pub fn create(object_type: impl Into<String>, payload: Map<String, JsonValue>) -> Self {
        Self::new(OperationKind::Create, object_type).with_payload(payload)
    }

    pub fn read(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self::new(OperationKind::Read, object_type).with_id(object_id)
    }

    pub fn update(
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        payload: Map<String, JsonValue>,
    ) -> Self {
        Self::new(OperationKind::Update, object_type)
            .with_id(object_id)
            .with_payload(payload)
    }

    pub fn delete(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self::new(OperationKind::Delete, object_type).with_id(object_id)
    }

    /// Query a collection. `payload` may carry `query`, `limit`, `offset`,
    /// `sort` and `include`.
    pub fn query(object_type: impl Into<String>, payload: Map<String, JsonValue>) -> Self {
        Self::new(OperationKind::Query, object_type).with_payload(payload)
    }

    /// Build a descriptor from an application document that embeds its
    /// `objectType` (and `id`, when addressing one object).
    ///
    /// `objectType` is always lifted out of the payload; `id` only for kinds
    /// that address one object. A Create or Query keeps any `id` field in its
    /// payload. A missing `objectType` yields an empty type, rejected later by
    /// the codec.
    pub fn from_document(kind: OperationKind, document: JsonValue) -> Result<Self> {
        let JsonValue::Object(mut payload) = document else {
            return Err(LinkError::EncodingError(format!(
                "{} operation expects a JSON object document",
                kind.as_str()
            )));
        };

        let object_type = match payload.remove(OBJECT_TYPE_KEY) {
            Some(JsonValue::String(s)) => s,
            Some(JsonValue::Null) | None => String::new(),
            Some(other) => {
                return Err(LinkError::EncodingError(format!(
                    "'{}' must be a string, got {}",
                    OBJECT_TYPE_KEY, other
                )));
            },
        };

        if !kind.requires_id() {
            return Ok(Self {
                kind,
                object_type,
                object_id: None,
                payload,
            });
        }

        let object_id = match payload.remove(OBJECT_ID_KEY) {
            Some(JsonValue::String(s)) => Some(s),
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            Some(JsonValue::Null) | None => None,
            Some(other) => {
                return Err(LinkError::EncodingError(format!(
                    "'{}' must be a string or number, got {}",
                    OBJECT_ID_KEY, other
                )));
            },
        };

        Ok(Self {
            kind,
            object_type,
            object_id,
            payload,
        })
    }

    pub fn with_id(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }

    pub fn with_payload(mut self, payload: Map<String, JsonValue>) -> Self {
        self.payload = payload;
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }

    pub fn payload(&self) -> &Map<String, JsonValue> {
        &self.payload
    }
}
