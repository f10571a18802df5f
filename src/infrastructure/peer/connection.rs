//! Per-participant peer connection handle

use crate::domain::connection::ConnectionState;
use crate::domain::media::{MediaTrack, TrackKind};
use crate::domain::participant::ParticipantId;
use crate::domain::shared::error::PeerConnectionError;
use crate::infrastructure::signaling::message::{IceCandidateInit, SessionDescription};
use chrono::{DateTime, Utc};

/// Wraps one media-transport connection to a remote participant.
///
/// Owned exclusively by the peer connection manager; released once `Closed`.
#[derive(Debug, Clone)]
pub struct PeerConnectionHandle {
    pub participant_id: ParticipantId,
    pub state: ConnectionState,
    pub local_description: Option<SessionDescription>,
    pub remote_description: Option<SessionDescription>,
    /// Remote candidates received before the remote description was set,
    /// in arrival order
    pending_remote_candidates: Vec<IceCandidateInit>,
    pub local_tracks: Vec<TrackKind>,
    pub created_at: DateTime<Utc>,
}

impl PeerConnectionHandle {
    pub fn new(participant_id: ParticipantId) -> Self {
        Self {
            participant_id,
            state: ConnectionState::New,
            local_description: None,
            remote_description: None,
            pending_remote_candidates: Vec::new(),
            local_tracks: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn ensure_open(&self) -> Result<(), PeerConnectionError> {
        if self.state == ConnectionState::Closed {
            Err(PeerConnectionError::Closed)
        } else {
            Ok(())
        }
    }

    /// Validated state transition
    pub fn transition(&mut self, next: ConnectionState) -> Result<(), PeerConnectionError> {
        self.ensure_open()?;
        if !self.state.can_transition_to(next) {
            return Err(PeerConnectionError::InvalidTransition(
                self.state.as_str().to_string(),
                next.as_str().to_string(),
            ));
        }
        self.state = next;
        Ok(())
    }

    pub fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), PeerConnectionError> {
        self.ensure_open()?;
        self.local_description = Some(description);
        Ok(())
    }

    /// Discard the pending local offer (polite rollback during glare)
    pub fn clear_local_description(&mut self) {
        self.local_description = None;
    }

    /// Set the remote descriptor and drain queued candidates in arrival order
    pub fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<Vec<IceCandidateInit>, PeerConnectionError> {
        self.ensure_open()?;
        self.remote_description = Some(description);
        Ok(std::mem::take(&mut self.pending_remote_candidates))
    }

    pub fn has_remote_description(&self) -> bool {
        self.remote_description.is_some()
    }

    /// Queue a candidate that arrived before the remote descriptor
    pub fn queue_candidate(&mut self, candidate: IceCandidateInit) -> Result<(), PeerConnectionError> {
        self.ensure_open()?;
        self.pending_remote_candidates.push(candidate);
        Ok(())
    }

    pub fn pending_candidate_count(&self) -> usize {
        self.pending_remote_candidates.len()
    }

    pub fn add_local_tracks(&mut self, tracks: &[TrackKind]) -> Result<(), PeerConnectionError> {
        self.ensure_open()?;
        for kind in tracks {
            if !self.local_tracks.contains(kind) {
                self.local_tracks.push(*kind);
            }
        }
        Ok(())
    }

    /// Remote tracks advertised by the current remote description
    pub fn remote_tracks(&self) -> Vec<MediaTrack> {
        let Some(remote) = &self.remote_description else {
            return Vec::new();
        };
        super::sdp::media_kinds(&remote.sdp)
            .into_iter()
            .enumerate()
            .map(|(index, kind)| MediaTrack {
                id: format!("{}-{}-{}", self.participant_id, kind.as_str(), index),
                kind,
            })
            .collect()
    }

    /// Terminal close: releases tracks, descriptors, and queued candidates
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
        self.local_description = None;
        self.remote_description = None;
        self.pending_remote_candidates.clear();
        self.local_tracks.clear();
    }
}
