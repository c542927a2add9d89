use serde::{Deserialize, Serialize};

/// Connection-level options for the notification channel.
///
/// # Example
///
/// ```rust
/// use backend_link::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_stream_path("/v2/stream")
///     .with_max_message_bytes(1 << 20);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Full WebSocket URL overriding the one derived from the service URL.
    /// Must use ws:// or wss://.
    #[serde(default)]
    pub ws_url: Option<String>,

    /// Path of the notification endpoint on the service host.
    /// Default: `/v1/stream`
    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    /// Inbound text frames larger than this are dropped.
    /// Default: 16 MiB
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

fn default_stream_path() -> String {
    "/v1/stream".to_string()
}

fn default_max_message_bytes() -> usize {
    16 << 20
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            ws_url: None,
            stream_path: default_stream_path(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    pub fn with_stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = path.into();
        self
    }

    pub fn with_max_message_bytes(mut self, max: usize) -> Self {
        self.max_message_bytes = max;
        self
    }
}
