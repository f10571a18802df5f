//! Parley - a WebRTC call-session engine
//!
//! Drives one multi-party call end to end: the signaling channel to the
//! rendezvous server, per-peer offer/answer/ICE negotiation with
//! deterministic glare resolution, the participant roster, local media
//! acquisition with fallback, and periodic connection-quality sampling.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{SessionController, SessionHandle};
pub use domain::shared::error::SessionError;
pub use domain::shared::result::Result;
