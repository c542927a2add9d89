//! Main backend client with builder pattern.
//!
//! Provides the primary interface for issuing object operations and opening
//! notification connections.

use std::sync::{Arc, OnceLock};

use reqwest::Url;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;

use crate::{
    auth::Credentials,
    connection::BackendConnection,
    dispatcher::OperationDispatcher,
    error::{LinkError, Result},
    event_handlers::{ConnectionHandlers, ReplyHandlers},
    models::{ConnectionOptions, FilterSpec, OperationDescriptor, OperationKind},
    reply::ReplyHandle,
    timeouts::LinkTimeouts,
    transport::{HttpTransport, Transport},
};

/// Environment variable holding the service URL.
pub const ENV_SERVICE_URL: &str = "BACKEND_LINK_SERVICE_URL";
/// Environment variable holding the backend id.
pub const ENV_BACKEND_ID: &str = "BACKEND_LINK_BACKEND_ID";
/// Environment variable holding the backend secret.
pub const ENV_BACKEND_SECRET: &str = "BACKEND_LINK_BACKEND_SECRET";

/// Main backend client.
///
/// Use [`BackendClientBuilder`] to construct instances. Operations return a
/// [`ReplyHandle`] immediately; the request runs in the background.
///
/// # Examples
///
/// ```rust,no_run
/// use backend_link::BackendClient;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = BackendClient::builder()
///     .service_url("https://api.example.com")
///     .backend_id("5a1f...")
///     .backend_secret("3c9e...")
///     .build()?;
///
/// let reply = client.create(json!({"objectType": "objects.Todo", "title": "Buy milk"}))?;
/// reply.wait().await;
/// println!("{}", reply.debug_info());
/// # Ok(())
/// # }
/// ```
pub struct BackendClient {
    service_url: String,
    credentials: Credentials,
    timeouts: LinkTimeouts,
    connection_options: ConnectionOptions,
    connection_handlers: ConnectionHandlers,
    reply_handlers: ReplyHandlers,
    transport: Arc<dyn Transport>,
    // Spawned on first use so the client can be built outside a runtime.
    dispatcher: OnceLock<OperationDispatcher>,
}

impl BackendClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> BackendClientBuilder {
        BackendClientBuilder::new()
    }

    fn dispatcher(&self) -> &OperationDispatcher {
        self.dispatcher.get_or_init(|| {
            OperationDispatcher::new(self.transport.clone(), self.reply_handlers.clone())
        })
    }

    /// Dispatch an explicit operation descriptor.
    ///
    /// Must be called inside a tokio runtime.
    pub fn dispatch(&self, op: OperationDescriptor) -> Result<ReplyHandle> {
        self.dispatcher().dispatch(op)
    }

    /// Create an object. `document` carries `objectType` and the new fields.
    pub fn create(&self, document: JsonValue) -> Result<ReplyHandle> {
        self.dispatch_document(OperationKind::Create, document)
    }

    /// Read one object by `objectType` and `id`.
    pub fn read(&self, document: JsonValue) -> Result<ReplyHandle> {
        self.dispatch_document(OperationKind::Read, document)
    }

    /// Update one object; fields other than `objectType` and `id` are sent.
    pub fn update(&self, document: JsonValue) -> Result<ReplyHandle> {
        self.dispatch_document(OperationKind::Update, document)
    }

    /// Delete one object by `objectType` and `id`.
    pub fn remove(&self, document: JsonValue) -> Result<ReplyHandle> {
        self.dispatch_document(OperationKind::Delete, document)
    }

    /// Query objects of `objectType`.
    ///
    /// Recognized fields: `query` (filter object), `limit`, `offset`, `sort`
    /// and `include`.
    ///
    /// # Example
    /// ```rust,no_run
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = backend_link::BackendClient::builder()
    /// #     .service_url("http://localhost:8080").backend_id("b").backend_secret("s").build()?;
    /// let reply = client.query(serde_json::json!({
    ///     "objectType": "objects.Todo",
    ///     "query": {"completed": false},
    ///     "limit": 20,
    ///     "sort": [{"sortBy": "createdAt", "direction": "desc"}]
    /// }))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn query(&self, document: JsonValue) -> Result<ReplyHandle> {
        self.dispatch_document(OperationKind::Query, document)
    }

    fn dispatch_document(&self, kind: OperationKind, document: JsonValue) -> Result<ReplyHandle> {
        self.dispatch(OperationDescriptor::from_document(kind, document)?)
    }

    /// Stream of every reply resolved from now on.
    pub fn completions(&self) -> broadcast::Receiver<ReplyHandle> {
        self.dispatcher().completions()
    }

    /// Open a notification connection subscribed with `filter`.
    ///
    /// Returns as soon as the connection task is started; see
    /// [`BackendConnection::wait_for_state`].
    pub fn connect(&self, filter: FilterSpec) -> Result<BackendConnection> {
        let connection = self.connection();
        connection.connect(self.credentials.clone(), filter)?;
        Ok(connection)
    }

    /// A fresh, disconnected notification connection using this client's
    /// configuration.
    pub fn connection(&self) -> BackendConnection {
        BackendConnection::new(
            self.service_url.clone(),
            self.connection_options.clone(),
            self.timeouts.clone(),
            self.connection_handlers.clone(),
        )
    }

    /// Resolve every pending reply as a transport error and refuse further
    /// dispatches.
    pub fn shutdown(&self) {
        if let Some(dispatcher) = self.dispatcher.get() {
            dispatcher.shutdown();
        }
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Get the configured timeouts
    pub fn timeouts(&self) -> &LinkTimeouts {
        &self.timeouts
    }
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("service_url", &self.service_url)
            .field("credentials", &self.credentials)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

/// Builder for configuring [`BackendClient`] instances.
#[derive(Default)]
pub struct BackendClientBuilder {
    service_url: Option<String>,
    backend_id: Option<String>,
    backend_secret: Option<String>,
    session_token: Option<String>,
    timeouts: LinkTimeouts,
    connection_options: ConnectionOptions,
    connection_handlers: ConnectionHandlers,
    reply_handlers: ReplyHandlers,
    transport: Option<Arc<dyn Transport>>,
}

impl BackendClientBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Builder pre-filled from `BACKEND_LINK_SERVICE_URL`,
    /// `BACKEND_LINK_BACKEND_ID` and `BACKEND_LINK_BACKEND_SECRET`.
    ///
    /// Unset variables leave the field empty; `build()` reports what is
    /// missing.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through
    /// `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            service_url: var(ENV_SERVICE_URL),
            backend_id: var(ENV_BACKEND_ID),
            backend_secret: var(ENV_BACKEND_SECRET),
            ..Self::default()
        }
    }

    /// Set the service URL (http:// or https://)
    pub fn service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = Some(url.into());
        self
    }

    pub fn backend_id(mut self, id: impl Into<String>) -> Self {
        self.backend_id = Some(id.into());
        self
    }

    pub fn backend_secret(mut self, secret: impl Into<String>) -> Self {
        self.backend_secret = Some(secret.into());
        self
    }

    /// Set the session token sent as a bearer token
    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Set id, secret and session token at once
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.backend_id = Some(credentials.backend_id().to_string());
        self.backend_secret = Some(credentials.backend_secret().to_string());
        self.session_token = credentials.session_token().map(str::to_string);
        self
    }

    /// Set comprehensive timeout configuration for all operations
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use backend_link::{BackendClient, LinkTimeouts};
    ///
    /// # fn example() -> backend_link::Result<()> {
    /// let client = BackendClient::builder()
    ///     .service_url("http://localhost:8080")
    ///     .backend_id("backend")
    ///     .backend_secret("secret")
    ///     .timeouts(LinkTimeouts::fast())
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn timeouts(mut self, timeouts: LinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set notification channel options
    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    pub fn reply_handlers(mut self, handlers: ReplyHandlers) -> Self {
        self.reply_handlers = handlers;
        self
    }

    /// Handlers shared by every connection opened from the client
    pub fn connection_handlers(mut self, handlers: ConnectionHandlers) -> Self {
        self.connection_handlers = handlers;
        self
    }

    /// Replace the HTTP transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<BackendClient> {
        let service_url = self.service_url.ok_or_else(|| {
            LinkError::ConfigurationError(format!("service URL is required (or set {})", ENV_SERVICE_URL))
        })?;
        Url::parse(service_url.trim()).map_err(|e| {
            LinkError::ConfigurationError(format!("Invalid service URL '{}': {}", service_url, e))
        })?;

        let mut credentials = Credentials::new(
            self.backend_id.unwrap_or_default(),
            self.backend_secret.unwrap_or_default(),
        );
        if let Some(token) = self.session_token {
            credentials = credentials.with_session_token(token);
        }
        if !credentials.is_complete() {
            return Err(LinkError::ConfigurationError(format!(
                "backend id and secret are required (or set {} and {})",
                ENV_BACKEND_ID, ENV_BACKEND_SECRET
            )));
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                log::debug!("[backend-link] Using HTTP transport for {}", service_url);
                Arc::new(HttpTransport::new(&service_url, credentials.clone(), &self.timeouts)?)
            },
        };

        Ok(BackendClient {
            service_url,
            credentials,
            timeouts: self.timeouts,
            connection_options: self.connection_options,
            connection_handlers: self.connection_handlers,
            reply_handlers: self.reply_handlers,
            transport,
            dispatcher: OnceLock::new(),
        })
    }
}
