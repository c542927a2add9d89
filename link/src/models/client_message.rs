use serde::{Deserialize, Serialize};

use super::filter_spec::FilterSpec;

/// Client-to-server messages on the notification channel.
///
/// # JSON Wire Format
///
/// ```json
/// {"messageType": "subscribe", "backendId": "...", "backendSecret": "...",
///  "filter": {"event": "create"}}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Handshake: identify the backend and register the subscription filter.
    ///
    /// Sent immediately after the WebSocket upgrade completes.
    Subscribe {
        #[serde(rename = "backendId")]
        backend_id: String,

        #[serde(rename = "backendSecret")]
        backend_secret: String,

        #[serde(rename = "sessionToken", default, skip_serializing_if = "Option::is_none")]
        session_token: Option<String>,

        filter: FilterSpec,
    },
}
