//! Data models for backend-link.
//!
//! Operation descriptors, subscription filters and the notification channel's
//! wire messages.

pub mod client_message;
pub mod connection_options;
pub mod connection_state;
pub mod event_kind;
pub mod filter_spec;
pub mod notification_message;
pub mod operation;


pub use client_message::ClientMessage;
pub use connection_options::ConnectionOptions;
pub use connection_state::ConnectionState;
pub use event_kind::EventKind;
pub use filter_spec::FilterSpec;
pub use notification_message::{MessageType, NotificationMessage};
pub use operation::{OperationDescriptor, OperationKind, OBJECT_ID_KEY, OBJECT_TYPE_KEY};
