//! Backend credentials.
//!
//! Every request and every notification handshake identifies the backend with
//! an id/secret pair. An optional session token (obtained out of band from an
//! identity provider) is attached as a bearer token.

use crate::error::{LinkError, Result};
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue, Request};

/// Header carrying the backend id on HTTP requests and WebSocket upgrades.
pub const BACKEND_ID_HEADER: &str = "x-backend-id";

/// Header carrying the backend secret on HTTP requests and WebSocket upgrades.
pub const BACKEND_SECRET_HEADER: &str = "x-backend-secret";

/// Backend identity attached to every outbound request.
///
/// # Examples
///
/// ```rust
/// use backend_link::Credentials;
///
/// let credentials = Credentials::new("5a1f...", "3c9e...");
/// assert!(credentials.is_complete());
///
/// let with_session = credentials.with_session_token("eyJhbGc...");
/// assert!(with_session.session_token().is_some());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    backend_id: String,
    backend_secret: String,
    session_token: Option<String>,
}

impl Credentials {
    pub fn new(backend_id: impl Into<String>, backend_secret: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            backend_secret: backend_secret.into(),
            session_token: None,
        }
    }

    /// Attach a session token, sent as `Authorization: Bearer <token>`.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    pub fn backend_secret(&self) -> &str {
        &self.backend_secret
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Both the backend id and secret are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.backend_id.trim().is_empty() && !self.backend_secret.trim().is_empty()
    }

    /// Attach identity headers to an HTTP request builder.
    pub fn apply_to_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header(BACKEND_ID_HEADER, &self.backend_id)
            .header(BACKEND_SECRET_HEADER, &self.backend_secret);
        match &self.session_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Attach identity headers to a WebSocket upgrade request.
    pub(crate) fn apply_to_ws_request(&self, request: &mut Request<()>) -> Result<()> {
        let headers = request.headers_mut();
        headers.insert(BACKEND_ID_HEADER, header_value(&self.backend_id, "backend id")?);
        headers.insert(
            BACKEND_SECRET_HEADER,
            header_value(&self.backend_secret, "backend secret")?,
        );
        if let Some(token) = &self.session_token {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token), "session token")?);
        }
        Ok(())
    }
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        LinkError::ConfigurationError(format!("Invalid {} for request header: {}", what, e))
    })
}

// Secrets stay out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("backend_id", &self.backend_id)
            .field("backend_secret", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    #[test]
    fn test_credentials_completeness() {
        assert!(Credentials::new("id", "secret").is_complete());
        assert!(!Credentials::new("", "secret").is_complete());
        assert!(!Credentials::new("id", "  ").is_complete());
    }

    #[test]
    fn test_ws_request_headers() {
        let credentials = Credentials::new("backend-1", "s3cr3t").with_session_token("tok");
        let mut request = "ws://localhost:8080/v1/stream".into_client_request().unwrap();
        credentials.apply_to_ws_request(&mut request).unwrap();

        let headers = request.headers();
        assert_eq!(headers.get(BACKEND_ID_HEADER).unwrap(), "backend-1");
        assert_eq!(headers.get(BACKEND_SECRET_HEADER).unwrap(), "s3cr3t");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok");
    }

    #[test]
    fn test_ws_request_rejects_invalid_header_value() {
        let credentials = Credentials::new("bad\nid", "secret");
        let mut request = "ws://localhost:8080/v1/stream".into_client_request().unwrap();
        assert!(matches!(
            credentials.apply_to_ws_request(&mut request),
            Err(LinkError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", Credentials::new("id", "top-secret"));
        assert!(!rendered.contains("top-secret"));
        assert!(rendered.contains("id"));
    }

    #[test]
    fn test_apply_to_request_does_not_panic() {
        let client = reqwest::Client::new();
        let request = client.get("http://localhost:8080/v1/objects/Todo");
        let _ = Credentials::new("id", "secret").apply_to_request(request);
    }
}
