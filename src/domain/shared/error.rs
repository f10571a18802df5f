//! Session error taxonomy

use thiserror::Error;

/// Signaling-channel transport failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("signaling connect timed out")]
    Timeout,

    #[error("signaling connection dropped")]
    Dropped,

    #[error("signaling channel is not connected")]
    NotConnected,

    #[error("signaling handshake failed: {0}")]
    Handshake(String),
}

/// Local media acquisition failures, mapped to stable causes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("camera and microphone access denied")]
    PermissionDenied,

    #[error("no camera or microphone found on this device")]
    DeviceNotFound,

    #[error("camera or microphone is already in use by another application")]
    DeviceBusy,

    #[error("camera or microphone does not support the requested settings")]
    ConstraintsUnsatisfiable,

    #[error("media access was aborted")]
    Aborted,

    #[error("no capture device available after exhausting fallbacks")]
    NoDeviceAvailable,

    #[error("failed to access camera or microphone")]
    Unknown,
}

/// Offer/answer/ICE negotiation failures for a single remote participant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("malformed session descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("stale answer ignored")]
    StaleAnswer,

    #[error("failed to apply ICE candidate: {0}")]
    IceApply(String),

    #[error("transport rejected negotiation: {0}")]
    Rejected(String),
}

/// Operations against a peer connection handle in an invalid state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerConnectionError {
    #[error("peer connection is closed")]
    Closed,

    #[error("no peer connection for participant {0}")]
    NotFound(String),

    #[error("invalid connection state transition: {0} -> {1}")]
    InvalidTransition(String, String),
}

/// Umbrella error for session-level operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    PeerConnection(#[from] PeerConnectionError),

    #[error("signaling reconnect attempts exhausted")]
    ReconnectExhausted,

    #[error("invalid session state: {0}")]
    InvalidState(String),
}
