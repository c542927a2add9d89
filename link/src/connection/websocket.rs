//! Low-level WebSocket helpers: URL resolution, upgrade with credentials and
//! the subscription handshake.

use futures_util::SinkExt;
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    error::Error as WsError,
    protocol::{frame::coding::CloseCode, CloseFrame, Message},
};

use crate::auth::Credentials;
use crate::error::{LinkError, Result};
use crate::event_handlers::ConnectionHandlers;
use crate::models::{ClientMessage, ConnectionOptions, FilterSpec};
use crate::timeouts::LinkTimeouts;

pub(crate) type WebSocketStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

/// Notification endpoint for `service_url`.
///
/// http → ws and https → wss; the stream path replaces any path on the
/// service URL. An explicit `ws_url` override wins but must be ws(s) and may
/// not downgrade an https service to plain ws.
pub(crate) fn resolve_ws_url(service_url: &str, options: &ConnectionOptions) -> Result<String> {
    let base = Url::parse(service_url.trim()).map_err(|e| {
        LinkError::ConfigurationError(format!("Invalid service URL '{}': {}", service_url, e))
    })?;
    validate_ws_url(&base, false, "service URL")?;

    if let Some(url) = options.ws_url.as_deref() {
        let override_parsed = Url::parse(url.trim()).map_err(|e| {
            LinkError::ConfigurationError(format!("Invalid WebSocket override URL '{}': {}", url, e))
        })?;
        validate_ws_url(&override_parsed, true, "WebSocket override URL")?;

        if base.scheme() == "https" && override_parsed.scheme() == "ws" {
            return Err(LinkError::ConfigurationError(
                "Refusing insecure ws:// override when the service URL uses https://".to_string(),
            ));
        }
        return Ok(override_parsed.to_string());
    }

    let ws_scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(LinkError::ConfigurationError(format!(
                "Unsupported service URL scheme '{}'; expected http(s) or ws(s)",
                other
            )));
        },
    };

    let mut ws_url = base;
    ws_url.set_scheme(ws_scheme).map_err(|_| {
        LinkError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;
    ws_url.set_fragment(None);
    ws_url.set_query(None);
    ws_url.set_path(&options.stream_path);

    Ok(ws_url.to_string())
}

fn validate_ws_url(url: &Url, require_ws_scheme: bool, context: &str) -> Result<()> {
    if url.host_str().is_none() {
        return Err(LinkError::ConfigurationError(format!("{} must include a host", context)));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(LinkError::ConfigurationError(format!(
            "{} must not include username/password credentials",
            context
        )));
    }

    if require_ws_scheme && !matches!(url.scheme(), "ws" | "wss") {
        return Err(LinkError::ConfigurationError(format!(
            "{} must use ws:// or wss:// (found '{}')",
            context,
            url.scheme()
        )));
    }

    Ok(())
}

/// Perform the WebSocket upgrade with the backend identity headers.
///
/// 401/403 on the upgrade map to [`LinkError::AuthenticationError`]; every
/// other failure is a transport or timeout error.
pub(crate) async fn open(
    ws_url: &str,
    credentials: &Credentials,
    timeouts: &LinkTimeouts,
) -> Result<WebSocketStream> {
    log::debug!("[backend-link] Establishing WebSocket connection to {}", ws_url);

    let mut request = ws_url.into_client_request().map_err(|e| {
        LinkError::ConfigurationError(format!("Failed to build WebSocket request: {}", e))
    })?;
    credentials.apply_to_ws_request(&mut request)?;

    let connect_result = if !LinkTimeouts::is_no_timeout(timeouts.connection_timeout) {
        tokio::time::timeout(timeouts.connection_timeout, tokio_tungstenite::connect_async(request))
            .await
    } else {
        Ok(tokio_tungstenite::connect_async(request).await)
    };

    match connect_result {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(WsError::Http(response))) => {
            let status = response.status();
            let body_text = response
                .into_body()
                .as_ref()
                .filter(|b| !b.is_empty())
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            match status.as_u16() {
                401 => Err(LinkError::AuthenticationError(
                    "Unauthorized: backend credentials were rejected".to_string(),
                )),
                403 => Err(LinkError::AuthenticationError(
                    "Forbidden: backend is not allowed to subscribe".to_string(),
                )),
                code if body_text.is_empty() => {
                    Err(LinkError::TransportError(format!("WebSocket HTTP error: {}", code)))
                },
                code => Err(LinkError::TransportError(format!(
                    "WebSocket HTTP error {}: {}",
                    code, body_text
                ))),
            }
        },
        Ok(Err(e)) => Err(LinkError::TransportError(format!("Connection failed: {}", e))),
        Err(_) => Err(LinkError::TimeoutError(format!(
            "Connection timeout ({:?})",
            timeouts.connection_timeout
        ))),
    }
}

/// Send the subscribe handshake as the first text frame.
pub(crate) async fn send_subscribe(
    ws: &mut WebSocketStream,
    credentials: &Credentials,
    filter: &FilterSpec,
    handlers: &ConnectionHandlers,
) -> Result<()> {
    let msg = ClientMessage::Subscribe {
        backend_id: credentials.backend_id().to_string(),
        backend_secret: credentials.backend_secret().to_string(),
        session_token: credentials.session_token().map(str::to_string),
        filter: filter.clone(),
    };
    let payload = serde_json::to_string(&msg).map_err(|e| {
        LinkError::TransportError(format!("Failed to serialize subscribe: {}", e))
    })?;
    handlers.emit_send(&payload);
    ws.send(Message::Text(payload.into()))
        .await
        .map_err(|e| LinkError::TransportError(format!("Failed to send subscribe: {}", e)))
}

/// Send a Close frame carrying `status`.
pub(crate) async fn send_close(ws: &mut WebSocketStream, status: u16) -> Result<()> {
    let frame = CloseFrame {
        code: CloseCode::from(status),
        reason: "".into(),
    };
    ws.close(Some(frame))
        .await
        .map_err(|e| LinkError::TransportError(format!("Failed to send close frame: {}", e)))
}
