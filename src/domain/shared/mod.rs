//! Shared session primitives: errors, result type, events

pub mod error;
pub mod events;
pub mod result;

pub use error::{
    MediaError, NegotiationError, PeerConnectionError, SessionError, TransportError,
};
pub use events::{EventBroadcaster, SessionEvent, Severity};
pub use result::Result;
