//! # backend-link: Object Backend Client Library
//!
//! Client-side access layer for a remote object-storage backend. Issues
//! create/read/update/delete/query operations over HTTP, tracks each one
//! through a [`ReplyHandle`], and keeps filtered WebSocket notification
//! channels open for backend-side change events.
//!
//! ## Features
//!
//! - **Asynchronous replies**: every operation returns a handle immediately;
//!   responses are correlated by request id, in any order
//! - **Change notifications**: subscribe to create/update/delete events,
//!   optionally restricted to one object type
//! - **Acknowledged close**: close handshake with a status code and timeout
//! - **Configurable Timeouts**: connection, request, keepalive and close
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use backend_link::{BackendClient, ConnectionHandlers, EventKind, FilterSpec};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = BackendClient::builder()
//!         .service_url("https://api.example.com")
//!         .backend_id("5a1f...")
//!         .backend_secret("3c9e...")
//!         .connection_handlers(
//!             ConnectionHandlers::new()
//!                 .on_data_received(|message| println!("Change: {}", message.to_json())),
//!         )
//!         .build()?;
//!
//!     // Listen for new todos
//!     let connection = client.connect(FilterSpec::event(EventKind::Create))?;
//!
//!     // Create one
//!     let reply = client.create(json!({"objectType": "objects.Todo", "title": "Buy milk"}))?;
//!     reply.wait().await;
//!     println!("Created: {:?}", reply.data());
//!
//!     connection.close(1000);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod codec;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod reply;
pub mod router;
pub mod timeouts;
pub mod transport;

// Re-export main types for convenience
pub use auth::Credentials;
pub use client::{BackendClient, BackendClientBuilder};
pub use codec::{DecodedResponse, EncodedRequest, RequestCodec};
pub use connection::{BackendConnection, NORMAL_CLOSURE};
pub use dispatcher::OperationDispatcher;
pub use error::{ErrorKind, LinkError, Result};
pub use event_handlers::{ConnectionError, ConnectionHandlers, ReplyHandlers};
pub use models::{
    ConnectionOptions, ConnectionState, EventKind, FilterSpec, MessageType, NotificationMessage,
    OperationDescriptor, OperationKind,
};
pub use reply::{ReplyError, ReplyHandle, ReplyState, RequestId};
pub use router::{EventRouter, RouteOutcome};
pub use timeouts::{LinkTimeouts, LinkTimeoutsBuilder};
pub use transport::{HttpTransport, Transport, TransportRequest, TransportResponse};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
