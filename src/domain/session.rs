//! Call session identity and lifecycle phase

use crate::domain::participant::ParticipantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session lifecycle phase.
///
/// `Reconnecting` is reachable only from `Active`, on signaling transport
/// loss. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    Idle,
    Joining,
    Active,
    Reconnecting,
    Leaving,
    Closed,
}

impl ConnectionPhase {
    pub fn as_str(&self) -> &str {
        match self {
            ConnectionPhase::Idle => "idle",
            ConnectionPhase::Joining => "joining",
            ConnectionPhase::Active => "active",
            ConnectionPhase::Reconnecting => "reconnecting",
            ConnectionPhase::Leaving => "leaving",
            ConnectionPhase::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionPhase::Closed)
    }

    pub fn can_transition_to(&self, next: ConnectionPhase) -> bool {
        use ConnectionPhase::*;
        match (self, next) {
            (Idle, Joining) => true,
            (Joining, Active) => true,
            (Active, Reconnecting) => true,
            (Reconnecting, Active) => true,
            (Active, Leaving) | (Reconnecting, Leaving) | (Joining, Leaving) => true,
            (Leaving, Closed) => true,
            // Fatal paths close directly
            (Joining, Closed) | (Active, Closed) | (Reconnecting, Closed) => true,
            _ => false,
        }
    }
}

/// One call session, owned exclusively by the session controller
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub room_id: String,
    pub local_participant_id: ParticipantId,
    pub phase: ConnectionPhase,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(room_id: impl Into<String>, local_participant_id: ParticipantId) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id: room_id.into(),
            local_participant_id,
            phase: ConnectionPhase::Idle,
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionPhase::*;

    #[test]
    fn join_and_leave_paths_are_legal() {
        assert!(Idle.can_transition_to(Joining));
        assert!(Joining.can_transition_to(Active));
        assert!(Active.can_transition_to(Leaving));
        assert!(Leaving.can_transition_to(Closed));
    }

    #[test]
    fn reconnecting_is_only_reachable_from_active() {
        assert!(Active.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Active));
        assert!(!Idle.can_transition_to(Reconnecting));
        assert!(!Joining.can_transition_to(Reconnecting));
    }

    #[test]
    fn closed_is_terminal() {
        for next in [Idle, Joining, Active, Reconnecting, Leaving, Closed] {
            assert!(!Closed.can_transition_to(next));
        }
    }
}
