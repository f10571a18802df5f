//! Peer connection lifecycle and negotiation

pub mod connection;
pub mod manager;
pub mod negotiation;
pub mod sdp;
pub mod transport;

pub use connection::PeerConnectionHandle;
pub use manager::{PeerConnectionManager, PeerEvent};
pub use negotiation::{NegotiationController, NegotiationOutcome, NegotiationState};
pub use transport::{MediaTransport, SdpEngine};
