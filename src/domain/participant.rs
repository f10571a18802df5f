//! Remote participant roster and negotiation role assignment

use crate::domain::media::MediaState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Participant identifier, unique within a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Role used to break simultaneous-offer ties (glare).
///
/// Both peers derive the same assignment independently from the identifier
/// pair, with no extra signaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationRole {
    /// Discards its own pending offer when offers collide
    Polite,
    /// Keeps its own pending offer and ignores the colliding one
    Impolite,
}

impl NegotiationRole {
    /// Deterministic role of `local` relative to `remote`: the
    /// lexicographically smaller identifier is the polite peer.
    pub fn for_pair(local: &ParticipantId, remote: &ParticipantId) -> Self {
        if local < remote {
            NegotiationRole::Polite
        } else {
            NegotiationRole::Impolite
        }
    }
}

/// A remote participant in the session roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteParticipant {
    pub id: ParticipantId,
    pub joined_at: DateTime<Utc>,
    pub media_state: MediaState,
    /// Role of the local peer relative to this participant
    pub local_role: NegotiationRole,
}

impl RemoteParticipant {
    pub fn new(id: ParticipantId, joined_at: DateTime<Utc>, local_role: NegotiationRole) -> Self {
        Self {
            id,
            joined_at,
            media_state: MediaState::default(),
            local_role,
        }
    }
}

/// Fields applied by [`ParticipantRegistry::upsert`].
///
/// `None` leaves the existing value untouched, so a partial update never
/// erases previously known state.
#[derive(Debug, Clone, Default)]
pub struct ParticipantUpdate {
    pub joined_at: Option<DateTime<Utc>>,
    pub media_state: Option<MediaState>,
}

/// Authoritative roster of remote participants.
///
/// Owned by the session event loop; all mutation is serialized there, so no
/// internal locking is required.
#[derive(Debug)]
pub struct ParticipantRegistry {
    local_id: ParticipantId,
    participants: HashMap<ParticipantId, RemoteParticipant>,
}

impl ParticipantRegistry {
    pub fn new(local_id: ParticipantId) -> Self {
        Self {
            local_id,
            participants: HashMap::new(),
        }
    }

    /// Insert a participant or merge `update` into the existing entry.
    ///
    /// Returns true when the participant was newly inserted. A repeated join
    /// for a known identifier keeps the original join time.
    pub fn upsert(&mut self, id: ParticipantId, update: ParticipantUpdate) -> bool {
        match self.participants.get_mut(&id) {
            Some(existing) => {
                if let Some(state) = update.media_state {
                    existing.media_state = state;
                }
                false
            }
            None => {
                let role = NegotiationRole::for_pair(&self.local_id, &id);
                let mut participant =
                    RemoteParticipant::new(id.clone(), update.joined_at.unwrap_or_else(Utc::now), role);
                if let Some(state) = update.media_state {
                    participant.media_state = state;
                }
                self.participants.insert(id, participant);
                true
            }
        }
    }

    /// Remove a participant. Removing an absent identifier is a no-op.
    pub fn remove(&mut self, id: &ParticipantId) -> Option<RemoteParticipant> {
        self.participants.remove(id)
    }

    /// Replace the media state for a known participant.
    ///
    /// Returns false when the participant is unknown.
    pub fn update_media_state(&mut self, id: &ParticipantId, state: MediaState) -> bool {
        match self.participants.get_mut(id) {
            Some(participant) => {
                participant.media_state = state;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&RemoteParticipant> {
        self.participants.get(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.contains_key(id)
    }

    /// Roster ordered by join time (identifier as tie-break)
    pub fn list(&self) -> Vec<RemoteParticipant> {
        let mut roster: Vec<RemoteParticipant> = self.participants.values().cloned().collect();
        roster.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
        roster
    }

    pub fn ids(&self) -> Vec<ParticipantId> {
        self.list().into_iter().map(|p| p.id).collect()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn clear(&mut self) {
        self.participants.clear();
    }
}
