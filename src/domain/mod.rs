//! Domain model for the call-session engine

pub mod connection;
pub mod media;
pub mod participant;
pub mod quality;
pub mod session;
pub mod shared;

pub use connection::ConnectionState;
pub use media::{MediaConstraints, MediaState, MediaTrack, TrackKind};
pub use participant::{NegotiationRole, ParticipantId, ParticipantRegistry, RemoteParticipant};
pub use quality::{QualityLevel, QualityReport, TransportStats};
pub use session::{ConnectionPhase, Session};
pub use shared::{EventBroadcaster, Result, SessionError, SessionEvent, Severity};
