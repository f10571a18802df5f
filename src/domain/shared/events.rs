//! Session event infrastructure
//!
//! Observers (UI layers, dashboards, the quality monitor) subscribe to a
//! broadcast stream of [`SessionEvent`] instead of polling session state.

use crate::domain::connection::ConnectionState;
use crate::domain::media::{MediaState, MediaTrack};
use crate::domain::participant::ParticipantId;
use crate::domain::quality::QualityReport;
use crate::domain::session::ConnectionPhase;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

/// Events emitted by the session for observers to consume
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    /// Session phase transition
    PhaseChanged {
        old_phase: ConnectionPhase,
        new_phase: ConnectionPhase,
    },
    /// A remote participant joined the call
    ParticipantJoined { participant_id: ParticipantId },
    /// A remote participant left the call
    ParticipantLeft { participant_id: ParticipantId },
    /// A participant's media state changed (local or remote)
    MediaStateChanged {
        participant_id: ParticipantId,
        state: MediaState,
    },
    /// A remote media track arrived for a participant
    RemoteTrack {
        participant_id: ParticipantId,
        track: MediaTrack,
    },
    /// Per-participant transport connection state transition
    ConnectionStateChanged {
        participant_id: ParticipantId,
        state: ConnectionState,
    },
    /// Periodic connection quality sample
    QualityReport(QualityReport),
    /// Human-readable notification for the user
    Notification {
        severity: Severity,
        message: String,
    },
}

/// Session event broadcaster
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Create a new event broadcaster
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Publish an event
    pub fn publish(&self, event: SessionEvent) {
        // Ignore send errors (no receivers)
        let _ = self.tx.send(event);
    }

    /// Publish a user-facing notification
    pub fn notify(&self, severity: Severity, message: impl Into<String>) {
        self.publish(SessionEvent::Notification {
            severity,
            message: message.into(),
        });
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
