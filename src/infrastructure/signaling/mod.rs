//! Signaling transport: wire format and WebSocket channel

pub mod channel;
pub mod message;

pub use channel::{ChannelEvent, SignalingChannel};
pub use message::{IceCandidateInit, SdpType, SessionDescription, SignalingMessage};
