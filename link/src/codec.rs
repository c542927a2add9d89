//! Stateless translation between operation descriptors and the backend's
//! REST wire format.
//!
//! | kind   | method | path                          | body    |
//! |--------|--------|-------------------------------|---------|
//! | create | POST   | `/v1/objects/<Name>`          | payload |
//! | read   | GET    | `/v1/objects/<Name>/<id>`     | -       |
//! | update | PUT    | `/v1/objects/<Name>/<id>`     | payload |
//! | delete | DELETE | `/v1/objects/<Name>/<id>`     | -       |
//! | query  | GET    | `/v1/objects/<Name>?q=...`    | -       |
//!
//! Object types outside the `objects.` namespace (`users`, `usergroups`,
//! ...) map to `/v1/<type>`.

use reqwest::Method;
use serde_json::{json, Map, Value as JsonValue};

use crate::error::{ErrorKind, LinkError, Result};
use crate::models::{OperationDescriptor, OperationKind};

const API_VERSION: &str = "v1";
const OBJECTS_PREFIX: &str = "objects.";

/// Wire request produced by [`RequestCodec::encode`].
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRequest {
    pub method: Method,
    /// Unescaped path segments, e.g. `["v1", "objects", "Todo"]`.
    pub path_segments: Vec<String>,
    /// Query string parameters, in order.
    pub query: Vec<(String, String)>,
    pub body: Option<JsonValue>,
}

impl EncodedRequest {
    /// Path for logging, e.g. `/v1/objects/Todo/51b0`.
    pub fn path(&self) -> String {
        format!("/{}", self.path_segments.join("/"))
    }
}

/// Response decoded by [`RequestCodec::decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResponse {
    pub status: u16,
    pub document: JsonValue,
    pub error: Option<ErrorKind>,
}

impl DecodedResponse {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Best-effort human-readable message for an error response.
    ///
    /// Looks at `message`, then `errors[0].message`, then falls back to the
    /// status code.
    pub fn error_message(&self) -> String {
        let direct = self.document.get("message").and_then(JsonValue::as_str);
        let nested = self
            .document
            .get("errors")
            .and_then(|e| e.get(0))
            .and_then(|e| e.get("message"))
            .and_then(JsonValue::as_str);

        direct
            .or(nested)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Backend returned status {}", self.status))
    }

    /// Convert an error response into a [`LinkError`].
    pub fn to_error(&self) -> Option<LinkError> {
        let kind = self.error?;
        let message = self.error_message();
        Some(match kind {
            ErrorKind::ClientError => LinkError::ClientError {
                status_code: self.status,
                message,
            },
            ErrorKind::ServerError => LinkError::ServerError {
                status_code: self.status,
                message,
            },
            ErrorKind::MalformedResponse => LinkError::MalformedResponse(message),
            ErrorKind::TransportError => LinkError::TransportError(message),
        })
    }
}

/// Pure request/response codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestCodec;

impl RequestCodec {
    /// Encode a descriptor into a wire request.
    ///
    /// Fails with [`LinkError::EncodingError`] when the object type is empty
    /// or unmappable, or when Read/Update/Delete lack an object id.
    pub fn encode(op: &OperationDescriptor) -> Result<EncodedRequest> {
        let mut path_segments = collection_segments(op.object_type())?;

        if op.kind().requires_id() {
            let id = op.object_id().map(str::trim).unwrap_or_default();
            if id.is_empty() {
                return Err(LinkError::EncodingError(format!(
                    "{} on '{}' requires an object id",
                    op.kind().as_str(),
                    op.object_type()
                )));
            }
            path_segments.push(id.to_string());
        }

        let (method, body, query) = match op.kind() {
            OperationKind::Create => (Method::POST, Some(payload_body(op)), Vec::new()),
            OperationKind::Read => (Method::GET, None, Vec::new()),
            OperationKind::Update => (Method::PUT, Some(payload_body(op)), Vec::new()),
            OperationKind::Delete => (Method::DELETE, None, Vec::new()),
            OperationKind::Query => (Method::GET, None, query_params(op.payload())?),
        };

        Ok(EncodedRequest {
            method,
            path_segments,
            query,
            body,
        })
    }

    /// Decode a raw response body and status code.
    pub fn decode(body: &[u8], status: u16) -> DecodedResponse {
        let success = (200..300).contains(&status);
        let status_error = if success {
            None
        } else if status >= 500 {
            Some(ErrorKind::ServerError)
        } else {
            Some(ErrorKind::ClientError)
        };

        let trimmed = body.trim_ascii();
        if trimmed.is_empty() {
            return DecodedResponse {
                status,
                document: JsonValue::Object(Map::new()),
                error: status_error,
            };
        }

        match serde_json::from_slice::<JsonValue>(trimmed) {
            Ok(document @ JsonValue::Object(_)) => DecodedResponse {
                status,
                document,
                error: status_error,
            },
            Ok(_) | Err(_) if success => DecodedResponse {
                status,
                document: json!({
                    "message": format!(
                        "Response body is not a JSON object: {}",
                        preview(trimmed)
                    )
                }),
                error: Some(ErrorKind::MalformedResponse),
            },
            Ok(_) | Err(_) => DecodedResponse {
                status,
                document: json!({ "message": String::from_utf8_lossy(trimmed) }),
                error: status_error,
            },
        }
    }
}

fn collection_segments(object_type: &str) -> Result<Vec<String>> {
    let object_type = object_type.trim();
    if object_type.is_empty() {
        return Err(LinkError::EncodingError("objectType must not be empty".to_string()));
    }
    if object_type.contains('/') {
        return Err(LinkError::EncodingError(format!(
            "objectType '{}' must not contain '/'",
            object_type
        )));
    }

    match object_type.strip_prefix(OBJECTS_PREFIX) {
        Some(name) if name.is_empty() => Err(LinkError::EncodingError(format!(
            "objectType '{}' is missing a type name",
            object_type
        ))),
        Some(name) => Ok(vec![API_VERSION.to_string(), "objects".to_string(), name.to_string()]),
        None => Ok(vec![API_VERSION.to_string(), object_type.to_string()]),
    }
}

fn payload_body(op: &OperationDescriptor) -> JsonValue {
    JsonValue::Object(op.payload().clone())
}

fn query_params(payload: &Map<String, JsonValue>) -> Result<Vec<(String, String)>> {
    let filter = payload.get("query").cloned().unwrap_or_else(|| json!({}));
    if !filter.is_object() {
        return Err(LinkError::EncodingError("query must be a JSON object".to_string()));
    }

    let mut params = vec![("q".to_string(), filter.to_string())];
    for key in ["limit", "offset"] {
        if let Some(value) = payload.get(key) {
            let n = value.as_u64().ok_or_else(|| {
                LinkError::EncodingError(format!("{} must be a non-negative integer", key))
            })?;
            params.push((key.to_string(), n.to_string()));
        }
    }
    for key in ["sort", "include"] {
        if let Some(value) = payload.get(key) {
            params.push((key.to_string(), value.to_string()));
        }
    }
    Ok(params)
}

fn preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() > 80 {
        let cut = (0..=80).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &text[..cut])
    } else {
        text.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(kind: OperationKind, value: JsonValue) -> OperationDescriptor {
        OperationDescriptor::from_document(kind, value).unwrap()
    }

    #[test]
    fn test_encode_create() {
        let op = doc(OperationKind::Create, json!({"objectType": "objects.Todo", "title": "x"}));
        let req = RequestCodec::encode(&op).unwrap();
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.path(), "/v1/objects/Todo");
        assert_eq!(req.body, Some(json!({"title": "x"})));
        assert!(req.query.is_empty());
    }

    #[test]
    fn test_encode_read_update_delete_paths() {
        let read = RequestCodec::encode(&OperationDescriptor::read("objects.Todo", "42")).unwrap();
        assert_eq!(read.method, Method::GET);
        assert_eq!(read.path(), "/v1/objects/Todo/42");
        assert!(read.body.is_none());

        let mut payload = Map::new();
        payload.insert("done".to_string(), json!(true));
        let update =
            RequestCodec::encode(&OperationDescriptor::update("objects.Todo", "42", payload)).unwrap();
        assert_eq!(update.method, Method::PUT);
        assert_eq!(update.body, Some(json!({"done": true})));

        let delete = RequestCodec::encode(&OperationDescriptor::delete("users", "u1")).unwrap();
        assert_eq!(delete.method, Method::DELETE);
        assert_eq!(delete.path(), "/v1/users/u1");
    }

    #[test]
    fn test_encode_query_params() {
        let op = doc(
            OperationKind::Query,
            json!({
                "objectType": "objects.Todo",
                "query": {"done": false},
                "limit": 10,
                "sort": [{"sortBy": "createdAt"}]
            }),
        );
        let req = RequestCodec::encode(&op).unwrap();
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.path(), "/v1/objects/Todo");
        assert_eq!(req.query[0], ("q".to_string(), r#"{"done":false}"#.to_string()));
        assert_eq!(req.query[1], ("limit".to_string(), "10".to_string()));
        assert_eq!(req.query[2].0, "sort");
        assert!(req.body.is_none());
    }

    #[test]
    fn test_encode_query_defaults_to_empty_filter() {
        let req = RequestCodec::encode(&OperationDescriptor::query("objects.Todo", Map::new())).unwrap();
        assert_eq!(req.query, vec![("q".to_string(), "{}".to_string())]);
    }

    #[test]
    fn test_encode_rejects_empty_object_type() {
        for kind in [
            OperationKind::Create,
            OperationKind::Read,
            OperationKind::Update,
            OperationKind::Delete,
            OperationKind::Query,
        ] {
            let op = OperationDescriptor::new(kind, "").with_id("1");
            assert!(matches!(RequestCodec::encode(&op), Err(LinkError::EncodingError(_))));
        }
    }

    #[test]
    fn test_encode_requires_id_for_single_object_ops() {
        for kind in [OperationKind::Read, OperationKind::Update, OperationKind::Delete] {
            let op = OperationDescriptor::new(kind, "objects.Todo");
            assert!(matches!(RequestCodec::encode(&op), Err(LinkError::EncodingError(_))));
        }
        let blank = OperationDescriptor::read("objects.Todo", "  ");
        assert!(RequestCodec::encode(&blank).is_err());
    }

    #[test]
    fn test_encode_rejects_bad_types() {
        assert!(RequestCodec::encode(&OperationDescriptor::query("objects.", Map::new())).is_err());
        assert!(RequestCodec::encode(&OperationDescriptor::query("a/b", Map::new())).is_err());

        let mut bad_limit = Map::new();
        bad_limit.insert("limit".to_string(), json!(-1));
        assert!(RequestCodec::encode(&OperationDescriptor::query("objects.Todo", bad_limit)).is_err());
    }

    #[test]
    fn test_encode_is_deterministic() {
        let op = doc(OperationKind::Create, json!({"objectType": "objects.Todo", "a": 1, "b": 2}));
        assert_eq!(RequestCodec::encode(&op).unwrap(), RequestCodec::encode(&op).unwrap());
    }

    #[test]
    fn test_decode_success() {
        let decoded = RequestCodec::decode(br#"{"results": []}"#, 200);
        assert!(!decoded.is_error());
        assert_eq!(decoded.document, json!({"results": []}));
    }

    #[test]
    fn test_decode_empty_body() {
        let decoded = RequestCodec::decode(b"", 204);
        assert!(decoded.error.is_none());
        assert_eq!(decoded.document, json!({}));
    }

    #[test]
    fn test_decode_status_classes() {
        assert_eq!(RequestCodec::decode(b"{}", 404).error, Some(ErrorKind::ClientError));
        assert_eq!(RequestCodec::decode(b"{}", 500).error, Some(ErrorKind::ServerError));
        assert_eq!(RequestCodec::decode(b"{}", 302).error, Some(ErrorKind::ClientError));
    }

    #[test]
    fn test_decode_malformed_success_body() {
        let decoded = RequestCodec::decode(b"<html>oops</html>", 200);
        assert_eq!(decoded.error, Some(ErrorKind::MalformedResponse));

        let array = RequestCodec::decode(b"[1,2,3]", 200);
        assert_eq!(array.error, Some(ErrorKind::MalformedResponse));
    }

    #[test]
    fn test_decode_error_message_extraction() {
        let nested = RequestCodec::decode(br#"{"errors":[{"message":"no such object"}]}"#, 404);
        assert_eq!(nested.error_message(), "no such object");

        let plain = RequestCodec::decode(b"gateway down", 502);
        assert_eq!(plain.error, Some(ErrorKind::ServerError));
        assert_eq!(plain.error_message(), "gateway down");

        let empty = RequestCodec::decode(b"", 500);
        assert_eq!(empty.error_message(), "Backend returned status 500");
        assert!(matches!(
            empty.to_error(),
            Some(LinkError::ServerError { status_code: 500, .. })
        ));
    }

    #[test]
    fn test_create_echo_is_superset_of_payload() {
        let op = doc(OperationKind::Create, json!({"objectType": "objects.Todo", "title": "x", "n": 3}));
        let req = RequestCodec::encode(&op).unwrap();

        let mut echoed = req.body.clone().unwrap();
        echoed["id"] = json!("generated");
        echoed["createdAt"] = json!("2024-01-01T00:00:00Z");
        let decoded = RequestCodec::decode(echoed.to_string().as_bytes(), 201);

        let result = decoded.document.as_object().unwrap();
        for (key, value) in op.payload() {
            assert_eq!(result.get(key), Some(value));
        }
    }
}
