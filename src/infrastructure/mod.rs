//! Infrastructure: signaling transport, media capture, peer connections

pub mod media;
pub mod peer;
pub mod signaling;
