//! Peer connection state machine

use serde::{Deserialize, Serialize};

/// Transport connection state for one remote participant.
///
/// Valid transitions:
/// `New -> {Connecting | Failed}`;
/// `Connecting -> {Connected | Failed}`;
/// `Connected -> {Disconnected | Failed | Closed}`;
/// `Disconnected -> {Connected | Failed | Closed}`.
/// `Closed` is terminal. A connection can fail before connectivity
/// starts when negotiation is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &str {
        match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (New, Connecting) | (New, Failed) => true,
            (Connecting, Connected) | (Connecting, Failed) => true,
            (Connected, Disconnected) | (Connected, Failed) => true,
            (Disconnected, Connected) | (Disconnected, Failed) => true,
            // Closing is allowed from any non-terminal state
            (state, Closed) if !state.is_terminal() => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn happy_path_transitions_are_legal() {
        assert!(New.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Disconnected));
        assert!(Disconnected.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Closed));
    }

    #[test]
    fn closed_is_terminal() {
        assert!(Closed.is_terminal());
        for next in [New, Connecting, Connected, Disconnected, Failed, Closed] {
            assert!(!Closed.can_transition_to(next));
        }
    }

    #[test]
    fn skipping_connecting_is_illegal() {
        assert!(!New.can_transition_to(Connected));
        assert!(!New.can_transition_to(Disconnected));
    }

    #[test]
    fn a_fresh_connection_can_fail() {
        assert!(New.can_transition_to(Failed));
    }
}
